// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

/// Where the virtual clock starts when a run is configured.
#[derive(Clone, Default)]
pub enum Start {
    /// Continue from the prior reading of a reused scheduler (zero on a
    /// fresh one). This keeps time ever-increasing across sequential runs.
    #[default]
    Inherit,

    /// Force the clock to an explicit instant, in seconds. Forcing an
    /// instant below the current reading is accepted but breaks the strict
    /// monotonicity of the clock; a warning is logged.
    At(f64),

    /// Produce the starting instant from a generator, called once per
    /// configuration. Returning `None` falls back to [`Start::Inherit`]
    /// semantics.
    FromFn(Arc<dyn Fn() -> Option<f64> + Send + Sync>),
}

impl Start {
    pub(crate) fn resolve(&self) -> Option<f64> {
        match self {
            Self::Inherit => None,
            Self::At(seconds) => Some(*seconds),
            Self::FromFn(generate) => generate(),
        }
    }
}

impl fmt::Debug for Start {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::At(seconds) => f.debug_tuple("At").field(seconds).finish(),
            Self::FromFn(_) => f.write_str("FromFn(..)"),
        }
    }
}

/// Per-run settings for the engine, frozen at [`Governor::configure`][crate::Governor::configure].
///
/// The defaults give a run that starts where the previous one left off,
/// has no end-of-time, fails after one real second of idling, grants 42
/// no-op cycles before each forward jump, and counts microseconds.
///
/// # Examples
///
/// ```
/// use timewarp::Config;
///
/// let config = Config::new()
///     .start_at(100.0)
///     .end_at(160.0)
///     .idle_timeout(0.5)
///     .idle_step(0.01);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) start: Start,
    pub(crate) end: Option<f64>,
    pub(crate) resolution: f64,
    pub(crate) idle_step: Option<f64>,
    pub(crate) idle_timeout: Option<f64>,
    pub(crate) noop_cycles: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start: Start::Inherit,
            end: None,
            resolution: 1e-6,
            idle_step: None,
            idle_timeout: Some(1.0),
            noop_cycles: 42,
        }
    }
}

impl Config {
    /// Creates a configuration with the defaults described above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the run's clock at an explicit instant, in seconds.
    #[must_use]
    pub fn start_at(mut self, seconds: f64) -> Self {
        self.start = Start::At(seconds);
        self
    }

    /// Produces the starting instant from a generator, called once when the
    /// run is configured.
    #[must_use]
    pub fn start_with(
        mut self,
        generate: impl Fn() -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        self.start = Start::FromFn(Arc::new(generate));
        self
    }

    /// Bounds the run's virtual time: once the clock reaches this instant,
    /// every waiting unit of work fails with
    /// [`TerminalError::EndOfTime`][crate::TerminalError::EndOfTime].
    #[must_use]
    pub fn end_at(mut self, seconds: f64) -> Self {
        self.end = Some(seconds);
        self
    }

    /// Sets the smallest distinguishable unit of time, in seconds.
    #[must_use]
    pub fn resolution(mut self, seconds: f64) -> Self {
        self.resolution = seconds;
        self
    }

    /// Sets the real-time step used while waiting for external work or
    /// external input, in seconds. Unset, such waits are bounded only by
    /// the idle timeout or the end-of-time.
    #[must_use]
    pub fn idle_step(mut self, seconds: f64) -> Self {
        self.idle_step = Some(seconds);
        self
    }

    /// Sets the real-time patience for a loop with nothing scheduled: when
    /// no callback, external task, or input shows up within this many
    /// seconds, every waiting unit of work fails with
    /// [`TerminalError::IdleTimeout`][crate::TerminalError::IdleTimeout].
    #[must_use]
    pub fn idle_timeout(mut self, seconds: f64) -> Self {
        self.idle_timeout = Some(seconds);
        self
    }

    /// Disables the idle guard entirely: infinite real-time patience.
    #[must_use]
    pub fn no_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Sets the upper bound of zero-time scheduler turns granted before
    /// each forward jump of the clock, so that coroutine chains get a
    /// chance to register their own timers first. An empirical safety
    /// margin, not a precise bound.
    #[must_use]
    pub fn noop_cycles(mut self, cycles: u32) -> Self {
        self.noop_cycles = cycles;
        self
    }
}
