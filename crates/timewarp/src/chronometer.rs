// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::ticks::Ticks;

/// Measures the time of a code block, against either the real clock or a
/// virtual [`Clock`].
///
/// Tests of time-compacted code typically use two of these side by side:
/// one on the loop clock to assert that the virtual delay happened, one on
/// the real clock to assert that it cost (almost) no real time.
///
/// # Examples
///
/// ```
/// use timewarp::Chronometer;
///
/// let mut chronometer = Chronometer::start();
/// // Perform some operations ...
/// chronometer.stop();
/// assert!(chronometer.elapsed_secs() < 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct Chronometer {
    source: Source,
    stopped: Option<Duration>,
}

#[derive(Debug, Clone)]
enum Source {
    Real(Instant),
    Loop(Clock, Ticks),
}

impl Chronometer {
    /// Starts measuring real time.
    #[must_use]
    pub fn start() -> Self {
        Self {
            source: Source::Real(Instant::now()),
            stopped: None,
        }
    }

    /// Starts measuring the virtual time of `clock`.
    #[must_use]
    pub fn with_clock(clock: &Clock) -> Self {
        Self {
            source: Source::Loop(clock.clone(), clock.now_ticks()),
            stopped: None,
        }
    }

    /// The time elapsed since the start, or between the start and the stop
    /// once [`Chronometer::stop`] was called.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self.stopped {
            Some(elapsed) => elapsed,
            None => self.running(),
        }
    }

    /// Same as [`Chronometer::elapsed`], in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Freezes the measurement. Further calls keep the frozen value.
    pub fn stop(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(self.running());
        }
    }

    fn running(&self) -> Duration {
        match &self.source {
            Source::Real(started) => started.elapsed(),
            // Tick subtraction keeps the span as exact as the readings.
            Source::Loop(clock, started) => {
                clock.resolution().duration(clock.now_ticks() - *started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;
    use crate::{Config, Governor};

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Chronometer: Send, Sync);
    }

    #[test]
    fn real_time_is_measured() {
        let chronometer = Chronometer::start();
        sleep(Duration::from_millis(1));
        assert!(chronometer.elapsed() >= Duration::from_millis(1));
    }

    #[test]
    fn stop_freezes_the_value() {
        let mut chronometer = Chronometer::start();
        sleep(Duration::from_millis(1));
        chronometer.stop();

        let frozen = chronometer.elapsed();
        sleep(Duration::from_millis(1));
        assert_eq!(chronometer.elapsed(), frozen);
    }

    #[test]
    fn loop_time_is_measured() {
        let governor = Governor::new();
        governor.configure(&Config::new().start_at(10.0)).unwrap();

        let chronometer = Chronometer::with_clock(&governor.clock());
        assert_eq!(chronometer.elapsed(), Duration::ZERO);

        governor.configure(&Config::new().start_at(12.5)).unwrap();
        assert_eq!(chronometer.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn loop_time_spans_are_drift_free() {
        // 0.29 - 0.2 is 0.08999999999999999 in plain f64 math.
        let governor = Governor::new();
        governor.configure(&Config::new().start_at(0.2)).unwrap();

        let chronometer = Chronometer::with_clock(&governor.clock());
        governor.configure(&Config::new().start_at(0.29)).unwrap();
        assert_eq!(chronometer.elapsed(), Duration::from_millis(90));
    }
}
