// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::external::{ExternalWork, WorkToken};
use crate::throttle::NoopThrottle;
use crate::ticks::{Resolution, Ticks};

/// Where the engine stands with respect to the scheduler it governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No configuration has ever been bound; real time passes normally.
    Unattached,
    /// A configuration is bound but the engine is not governing; real time
    /// passes normally while the clock keeps tracking it.
    Inactive,
    /// The engine governs the scheduler's waits.
    Active,
    /// The clock reached the configured end-of-time. Terminal for this run.
    EndReached,
    /// The real-time idle budget was exhausted. Terminal for this run.
    IdleExpired,
}

/// Proof that a configuration was bound; required to toggle the run.
///
/// A handle goes stale as soon as [`Governor::configure`] is called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub(crate) id: u64,
}

/// The time-virtualization engine.
///
/// A `Governor` owns the virtual clock of one single-threaded cooperative
/// scheduler and substitutes the scheduler's blocking wait with its own
/// decision function, [`Governor::wait`]. While governing, it fast-forwards
/// the clock over stretches where only timers are pending, steps real and
/// virtual time in lockstep while off-thread work is outstanding, and
/// terminates runs that never converge — all without the scheduler
/// noticing anything beyond "time passed".
///
/// The governor is a cheap cloneable handle; clones share state, exactly
/// like the read-only [`Clock`] handles it hands out.
///
/// # Lifecycle
///
/// One governor serves many sequential runs of the same scheduler. Each run
/// is bound by [`Governor::configure`], which freezes a [`Config`] and
/// returns a [`RunHandle`]; [`Governor::activate`] starts governing and
/// [`Governor::deactivate`] stops. Unless a run forces a start instant, the
/// clock continues from wherever the previous run left it, so time is
/// ever-increasing across runs sharing one scheduler.
///
/// # Examples
///
/// ```
/// use timewarp::runtime::MiniLoop;
/// use timewarp::{Chronometer, Config, Governor};
///
/// let governor = Governor::new();
/// let run = governor.configure(&Config::new())?;
/// governor.activate(&run)?;
///
/// let mut scheduler = MiniLoop::new(governor.clone());
/// let chronometer = Chronometer::start();
/// let waiter = scheduler.sleep(3600.0);
/// scheduler.run_until(&waiter)?;
///
/// // One virtual hour passed in (almost) no real time.
/// assert_eq!(governor.clock().now(), 3600.0);
/// assert!(chronometer.elapsed_secs() < 1.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Governor {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) run: RunState,
    pub(crate) run_id: u64,
    pub(crate) resolution: Resolution,
    pub(crate) now: Ticks,
    pub(crate) end: Option<Ticks>,
    pub(crate) idle_step: Option<Ticks>,
    pub(crate) idle_timeout: Option<Ticks>,
    pub(crate) idle_end: Option<Ticks>,
    pub(crate) noop_cycles: u32,
    pub(crate) throttle: NoopThrottle,
    pub(crate) sync_ts: Option<Instant>,
    pub(crate) external: ExternalWork,
}

impl Default for State {
    fn default() -> Self {
        Self {
            run: RunState::Unattached,
            run_id: 0,
            resolution: Resolution::default(),
            now: Ticks::ZERO,
            end: None,
            idle_step: None,
            idle_timeout: None,
            idle_end: None,
            noop_cycles: 0,
            throttle: NoopThrottle::default(),
            sync_ts: None,
            external: ExternalWork::default(),
        }
    }
}

impl Governor {
    /// Creates an engine with no configuration bound. Until the first
    /// [`Governor::configure`], waits pass through unchanged and the clock
    /// reads zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a frozen configuration to the next run.
    ///
    /// The starting instant is resolved here, once: an explicit or
    /// generated start force-sets the clock (even backwards — logged, since
    /// it breaks monotonicity on a reused scheduler); otherwise the clock
    /// continues from its prior reading, re-expressed in the new
    /// resolution. The engine transitions to [`RunState::Inactive`] and any
    /// previously issued handle goes stale.
    ///
    /// # Errors
    ///
    /// Fails when settings are invalid or mutually inconsistent: a
    /// non-positive resolution, negative idle durations, instants outside
    /// the resolution's integer range, or an end-of-time that precedes the
    /// resolved start.
    pub fn configure(&self, config: &Config) -> Result<RunHandle> {
        let resolution = Resolution::from_seconds(config.resolution)?;

        for (name, value) in [
            ("idle_step", config.idle_step),
            ("idle_timeout", config.idle_timeout),
        ] {
            if let Some(seconds) = value {
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(Error::config(format!(
                        "{name} must be a non-negative number of seconds, got {seconds}"
                    )));
                }
            }
        }

        let start = config.start.resolve();

        self.with_state(|state| {
            // The prior reading goes through the *old* reciprocal; the new
            // resolution may differ from the one it was recorded under.
            let prior = state.resolution.seconds(state.now);
            let now = match start {
                Some(seconds) => {
                    if state.run_id > 0 && seconds < prior {
                        warn!(
                            from = prior,
                            to = seconds,
                            "the loop time moves backwards, breaking monotonicity; \
                             likely a reused scheduler with a forced start"
                        );
                    }
                    resolution.ticks(seconds)?
                }
                None => resolution.ticks(prior)?,
            };

            let end = config.end.map(|seconds| resolution.ticks(seconds)).transpose()?;
            if let Some(end) = end {
                if end < now {
                    return Err(Error::config(format!(
                        "the end-of-time {} precedes the starting instant {}",
                        resolution.seconds(end),
                        resolution.seconds(now),
                    )));
                }
            }

            state.resolution = resolution;
            state.now = now;
            state.end = end;
            state.idle_step = config
                .idle_step
                .map(|seconds| resolution.ticks(seconds))
                .transpose()?;
            state.idle_timeout = config
                .idle_timeout
                .map(|seconds| resolution.ticks(seconds))
                .transpose()?;
            state.idle_end = None;
            state.noop_cycles = config.noop_cycles;
            state.throttle.clear();
            state.sync_ts = None;
            state.run_id = state.run_id.wrapping_add(1);
            state.run = RunState::Inactive;

            debug!(run = state.run_id, start = resolution.seconds(now), "run configured");
            Ok(RunHandle { id: state.run_id })
        })
    }

    /// Starts governing the scheduler's waits for the configured run.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, when the run is already active, or when the
    /// run has already terminated (reconfigure to start a fresh one).
    pub fn activate(&self, handle: &RunHandle) -> Result<()> {
        self.with_state(|state| {
            state.check_handle(handle)?;
            match state.run {
                RunState::Inactive => {
                    state.run = RunState::Active;
                    state.idle_end = None;
                    state.throttle.clear();
                    state.sync_ts = None;
                    debug!(run = state.run_id, "run activated");
                    Ok(())
                }
                RunState::Active => Err(Error::config("the run is already active")),
                RunState::EndReached | RunState::IdleExpired => Err(Error::config(
                    "the run has terminated; reconfigure before activating again",
                )),
                RunState::Unattached => {
                    Err(Error::config("no configuration is bound to this engine"))
                }
            }
        })
    }

    /// Stops governing: real time passes normally again, while the clock
    /// keeps tracking it. Also the way out of a terminal state when the
    /// same configuration should stay bound.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn deactivate(&self, handle: &RunHandle) -> Result<()> {
        self.with_state(|state| {
            state.check_handle(handle)?;
            if state.run != RunState::Inactive {
                debug!(run = state.run_id, from = ?state.run, "run deactivated");
            }
            state.run = RunState::Inactive;
            Ok(())
        })
    }

    /// A cheap read handle for the virtual clock.
    #[must_use]
    pub fn clock(&self) -> Clock {
        Clock::new(Arc::clone(&self.state))
    }

    /// The engine's current lifecycle state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.with_state(|state| state.run)
    }

    /// Records one outstanding piece of off-thread work. While any such
    /// work is pending, the wait policy steps real and virtual time in
    /// lockstep instead of fast-forwarding.
    pub fn register_external(&self) -> WorkToken {
        self.with_state(|state| state.external.register())
    }

    /// Marks off-thread work as completed. Returns `false` for unknown or
    /// already-completed tokens.
    pub fn complete_external(&self, token: WorkToken) -> bool {
        self.with_state(|state| state.external.complete(token))
    }

    /// The number of outstanding off-thread tasks.
    #[must_use]
    pub fn pending_external(&self) -> usize {
        self.with_state(|state| state.external.pending())
    }

    pub(crate) fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut State) -> R,
    {
        f(&mut self
            .state
            .lock()
            .expect("acquiring the state lock must always succeed"))
    }
}

impl State {
    fn check_handle(&self, handle: &RunHandle) -> Result<()> {
        if handle.id == self.run_id {
            Ok(())
        } else {
            Err(Error::stale_run(handle.id, self.run_id))
        }
    }
}
