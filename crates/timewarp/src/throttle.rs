// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

/// Grants a bounded number of zero-time scheduler turns before each forward
/// jump of the clock.
///
/// Coroutine chains often register a delayed callback only on their next
/// scheduling turn — a timeout guard wrapped around an inner sleep, for
/// example. Jumping the clock the moment a single timer is pending would
/// fire the outer timeout before the inner sleep is even scheduled. The
/// throttle holds the clock still for up to `limit` consecutive turns; any
/// turn on which callbacks are already due restarts the countdown, and any
/// observed input clears the throttle entirely.
///
/// The counter spans wait invocations; the policy never loops internally.
#[derive(Debug, Default)]
pub(crate) struct NoopThrottle {
    cycle: Option<Cycle>,
}

#[derive(Debug)]
struct Cycle {
    limit: u32,
    count: u32,
}

impl NoopThrottle {
    /// One scheduler turn with a future deadline and nothing else to do.
    /// Returns `true` while the turn should stay a no-op; `false` once the
    /// budget is spent and the clock may jump.
    pub(crate) fn step(&mut self, limit: u32) -> bool {
        match &mut self.cycle {
            None => {
                self.cycle = Some(Cycle { limit, count: 1 });
                limit >= 1
            }
            Some(cycle) if cycle.count < cycle.limit => {
                cycle.count = cycle.count.saturating_add(1);
                true
            }
            Some(_) => false,
        }
    }

    /// A turn with already-due callbacks restarts the countdown: the due
    /// work may schedule new timers that must not be jumped over.
    pub(crate) fn restart(&mut self) {
        if let Some(cycle) = &mut self.cycle {
            cycle.count = 0;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cycle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_an_upper_bound() {
        let mut throttle = NoopThrottle::default();
        assert!(throttle.step(3));
        assert!(throttle.step(3));
        assert!(throttle.step(3));
        assert!(!throttle.step(3));
    }

    #[test]
    fn zero_budget_jumps_immediately() {
        let mut throttle = NoopThrottle::default();
        assert!(!throttle.step(0));
    }

    #[test]
    fn due_callbacks_restart_the_countdown() {
        let mut throttle = NoopThrottle::default();
        assert!(throttle.step(2));
        assert!(throttle.step(2));
        throttle.restart();
        assert!(throttle.step(2));
        assert!(throttle.step(2));
        assert!(!throttle.step(2));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut throttle = NoopThrottle::default();
        assert!(throttle.step(1));
        assert!(!throttle.step(1));
        throttle.clear();
        assert!(throttle.step(1));
    }
}
