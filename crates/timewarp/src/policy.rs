// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

//! The wait policy: the decision function substituted for the scheduler's
//! native blocking wait.
//!
//! Every call classifies the scheduler's situation into one of a few modes
//! and acts accordingly:
//!
//! * input already arrived, or callbacks are due right now: a zero-time
//!   turn, the clock holds still;
//! * off-thread work is outstanding: sleep a short real interval and move
//!   the clock by the same amount, so loop time tracks real time;
//! * nothing is scheduled at all: same stepping, bounded by the idle
//!   guard, since only external input can revive the loop;
//! * a timer is pending and nothing else can happen: grant a few zero-time
//!   turns, then jump the clock straight to the timer.
//!
//! The policy never loops internally. Each call makes one decision and
//! returns, so the scheduler stays in charge of its own run loop.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::engine::{Governor, RunState, State};
use crate::error::TerminalError;
use crate::scheduler::EventLoop;
use crate::ticks::Ticks;

/// The fraction of a synchronized sleep spent before the clock-advance
/// checkpoint. Input arriving in the first part cancels the loop-time
/// increment for this turn; input arriving in the tail does not, since by
/// then most of the interval's real time has actually passed.
const SLEEP_SPLIT: f64 = 0.8;

/// What one wait invocation decided to do, computed under the state lock
/// and executed outside it.
#[derive(Debug)]
enum Plan {
    /// A zero-time turn; the clock holds still.
    Return,
    /// The run already terminated; late waiters get the condition again.
    Reinject(TerminalError),
    /// Not governing; block for real and let the clock track real time.
    Passthrough { timeout: Option<Ticks> },
    /// Step real and virtual time in lockstep.
    Sleep {
        real_timeout: Option<Duration>,
        step: Ticks,
        overtime: bool,
    },
    /// Fast-forward the clock to the next deadline without sleeping.
    Jump { step: Ticks, overtime: bool },
}

impl Governor {
    /// Runs one wait turn on behalf of the scheduler; the replacement for
    /// its native blocking wait. Returns the number of externally-triggered
    /// events observed during the turn.
    ///
    /// The state lock is never held across the `event_loop` calls, so the
    /// scheduler may re-enter the engine (typically via
    /// [`Governor::complete_external`]) from inside
    /// [`EventLoop::poll_events`].
    pub fn wait<L>(&self, event_loop: &mut L) -> usize
    where
        L: EventLoop + ?Sized,
    {
        let deadline = event_loop.next_deadline();

        // Input first: whatever already arrived is processed before the
        // time-play starts.
        let events = event_loop.poll_events(Some(Duration::ZERO));

        let (plan, run_id) = self.with_state(|state| (state.plan(deadline, events), state.run_id));
        trace!(?plan, events, "wait turn");

        match plan {
            Plan::Return => events,

            Plan::Reinject(error) => {
                event_loop.inject_terminal(error);
                events
            }

            Plan::Passthrough { timeout } => {
                let real_timeout =
                    timeout.map(|t| self.with_state(|state| state.resolution.duration(t)));
                let started = Instant::now();
                let polled = event_loop.poll_events(real_timeout);
                let elapsed = started.elapsed();

                self.with_state(|state| {
                    if state.run_id != run_id {
                        return;
                    }
                    // An interrupted or unbounded wait advances the clock by
                    // the real time spent; a fully slept one by the exact
                    // requested amount, keeping the loop time drift-free.
                    let spent = match timeout {
                        Some(t) if polled == 0 => t,
                        _ => state.resolution.ticks_saturating(elapsed.as_secs_f64()),
                    };
                    state.now = state.now + spent.max(Ticks::ZERO);
                });
                events + polled
            }

            Plan::Sleep {
                real_timeout,
                step,
                overtime,
            } => {
                let (early, late) = match real_timeout {
                    Some(timeout) => (
                        event_loop.poll_events(Some(timeout.mul_f64(SLEEP_SPLIT))),
                        event_loop.poll_events(Some(timeout.mul_f64(1.0 - SLEEP_SPLIT))),
                    ),
                    // No real bound at all: only input can break the idle,
                    // so a single unbounded wait suffices.
                    None => (event_loop.poll_events(None), 0),
                };

                let terminal = self.with_state(|state| {
                    if state.run_id != run_id {
                        return None;
                    }
                    if early == 0 {
                        state.now = state.now + step;
                    }
                    if early + late > 0 {
                        state.idle_end = None;
                        state.throttle.clear();
                    }
                    state.check_guards(overtime)
                });
                if let Some(error) = terminal {
                    event_loop.inject_terminal(error);
                }
                events + early + late
            }

            Plan::Jump { step, overtime } => {
                let terminal = self.with_state(|state| {
                    if state.run_id != run_id {
                        return None;
                    }
                    state.now = state.now + step;
                    trace!(step = %step, now = %state.now, "clock fast-forwarded");
                    state.check_guards(overtime)
                });
                if let Some(error) = terminal {
                    event_loop.inject_terminal(error);
                }
                events
            }
        }
    }
}

impl State {
    /// One decision of the wait policy. `deadline` is the scheduler's next
    /// scheduled instant in loop-clock seconds; `events` is the outcome of
    /// the turn's initial zero-time poll.
    fn plan(&mut self, deadline: Option<f64>, events: usize) -> Plan {
        if let Some(error) = self.terminal() {
            return Plan::Reinject(error);
        }

        // Observed input restarts all idling countdowns.
        if events > 0 {
            self.idle_end = None;
            self.throttle.clear();
            return Plan::Return;
        }

        // The scheduler's own timeout: zero when callbacks are already due,
        // absent when nothing is scheduled at all.
        let timeout: Option<Ticks> = deadline
            .map(|seconds| (self.resolution.ticks_saturating(seconds) - self.now).max(Ticks::ZERO));

        match self.run {
            RunState::Unattached | RunState::Inactive => Plan::Passthrough { timeout },
            RunState::Active => self.plan_governed(timeout),
            // Unreachable: handled by the terminal() check above.
            RunState::EndReached => Plan::Reinject(TerminalError::EndOfTime),
            RunState::IdleExpired => Plan::Reinject(TerminalError::IdleTimeout),
        }
    }

    fn plan_governed(&mut self, timeout: Option<Ticks>) -> Plan {
        // Outstanding off-thread work takes real time we cannot hook into,
        // so real time must be spent; the loop time follows it in steps.
        // A pending timer may bound the step but never disables stepping.
        if self.external.pending() > 0 {
            self.throttle.clear();
            let (real_timeout, step, overtime) = self.sync(timeout, self.idle_step, None);
            return Plan::Sleep {
                real_timeout,
                step,
                overtime,
            };
        }

        match timeout {
            // Nothing is scheduled inside the loop; only external input can
            // revive it. Step until the idle guard expires, or forever when
            // the guard is disabled.
            None => {
                if self.idle_end.is_none() {
                    if let Some(patience) = self.idle_timeout {
                        self.idle_end = Some(self.now + patience);
                    }
                }
                let (real_timeout, step, overtime) =
                    self.sync(None, self.idle_step, self.idle_end);
                Plan::Sleep {
                    real_timeout,
                    step,
                    overtime,
                }
            }

            // Callbacks are due right now: a pure status check. A no-op
            // countdown must run strictly uninterrupted, so it restarts.
            Some(Ticks::ZERO) => {
                self.throttle.restart();
                Plan::Return
            }

            // A future timer and nothing else. Hold the clock for a few
            // zero-time turns first: consecutive suspension points often
            // register their inner deadlines only on their next turn, and
            // jumping immediately would fire an outer timeout before the
            // inner sleep even starts counting.
            Some(_) if self.throttle.step(self.noop_cycles) => Plan::Return,

            // The countdown is over; nothing can happen from the outside,
            // so move the time all at once.
            Some(_) => {
                let (_, step, overtime) = self.sync(timeout, None, None);
                self.throttle.clear();
                Plan::Jump { step, overtime }
            }
        }
    }

    /// Synchronizes the loop-time step with the real-clock sleep.
    ///
    /// The requested `timeout`, the configured `step`, the idle deadline
    /// and the end-of-time each bound the step from above; crossing the
    /// idle deadline or the end-of-time marks the turn as overtime, which
    /// arms the terminal guards.
    ///
    /// The real-clock timeout additionally compensates for code overhead:
    /// loop time moves in sharp steps, but the scheduler burns real time
    /// between them, so each sleep is shortened by the real time elapsed
    /// since the previous synchronization's projected wake-up. In a run of
    /// 0.01-second steps with ~0.0013 seconds of overhead apiece, the
    /// actual sleeps come out around 0.0087 seconds.
    #[mutants::skip]
    fn sync(
        &mut self,
        timeout: Option<Ticks>,
        step: Option<Ticks>,
        idle_end: Option<Ticks>,
    ) -> (Option<Duration>, Ticks, bool) {
        let mut overtime = false;

        let mut real_step: Option<Ticks> = step;
        if let Some(timeout) = timeout {
            real_step = Some(match real_step {
                Some(step) => step.min(timeout),
                None => timeout,
            });
        }
        // Overshoot accumulates across bounds: clamping the step to a nearer
        // bound must not unflag a crossing already detected for another one.
        for bound in [idle_end, self.end] {
            let Some(bound) = bound else { continue };
            let distance = bound - self.now;
            match real_step {
                Some(step) => {
                    overtime |= step >= distance;
                    real_step = Some(step.min(distance));
                }
                None => {
                    overtime = true;
                    real_step = Some(distance);
                }
            }
        }

        let mut real_timeout = real_step.map(|step| self.resolution.duration(step));

        // The overhead delta is absent when the previous turn was cut short
        // by input: the projected wake-up lies in the future then.
        let prev_ts = self.sync_ts;
        let curr_ts = Instant::now();
        self.sync_ts = Some(curr_ts);
        if let (Some(timeout), Some(prev_ts)) = (real_timeout.as_mut(), prev_ts) {
            if let Some(overhead) = curr_ts.checked_duration_since(prev_ts) {
                *timeout = timeout.saturating_sub(overhead);
            }
        }

        // Project the wake-up, assuming the timeout is fully slept.
        if let Some(timeout) = real_timeout {
            self.sync_ts = curr_ts.checked_add(timeout).or(self.sync_ts);
        }

        (
            real_timeout,
            real_step.unwrap_or(Ticks::ZERO).max(Ticks::ZERO),
            overtime,
        )
    }

    /// Fires the terminal guards once an overtime step lands on or beyond
    /// its bound. The end-of-time wins over the idle guard.
    fn check_guards(&mut self, overtime: bool) -> Option<TerminalError> {
        if !overtime {
            return None;
        }
        if let Some(end) = self.end {
            if self.now >= end {
                self.run = RunState::EndReached;
                debug!(run = self.run_id, now = %self.now, "the end-of-time is reached");
                return Some(TerminalError::EndOfTime);
            }
        }
        if let Some(idle_end) = self.idle_end {
            if self.now >= idle_end {
                self.run = RunState::IdleExpired;
                debug!(run = self.run_id, now = %self.now, "the idle patience is exhausted");
                return Some(TerminalError::IdleTimeout);
            }
        }
        None
    }

    fn terminal(&self) -> Option<TerminalError> {
        match self.run {
            RunState::EndReached => Some(TerminalError::EndOfTime),
            RunState::IdleExpired => Some(TerminalError::IdleTimeout),
            RunState::Unattached | RunState::Inactive | RunState::Active => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Governor};

    /// A bare-bones scheduler stub: a fixed next deadline, scripted event
    /// counts for consecutive polls, and a record of every call.
    struct StubLoop {
        deadline: Option<f64>,
        events: Vec<usize>,
        polls: Vec<Option<Duration>>,
        terminals: Vec<TerminalError>,
    }

    impl StubLoop {
        fn new(deadline: Option<f64>) -> Self {
            Self {
                deadline,
                events: Vec::new(),
                polls: Vec::new(),
                terminals: Vec::new(),
            }
        }

        fn with_events(mut self, events: &[usize]) -> Self {
            self.events = events.to_vec();
            self.events.reverse();
            self
        }
    }

    impl EventLoop for StubLoop {
        fn next_deadline(&self) -> Option<f64> {
            self.deadline
        }

        fn poll_events(&mut self, timeout: Option<Duration>) -> usize {
            self.polls.push(timeout);
            let events = self.events.pop().unwrap_or(0);
            // Sleep out the full timeout unless input is scripted to arrive.
            if let (0, Some(timeout)) = (events, timeout) {
                std::thread::sleep(timeout);
            }
            events
        }

        fn inject_terminal(&mut self, error: TerminalError) {
            self.terminals.push(error);
        }
    }

    fn active_governor(config: &Config) -> Governor {
        let governor = Governor::new();
        let run = governor.configure(config).unwrap();
        governor.activate(&run).unwrap();
        governor
    }

    #[test]
    fn due_callbacks_hold_the_clock() {
        let governor = active_governor(&Config::new().start_at(5.0));
        let mut stub = StubLoop::new(Some(5.0));

        assert_eq!(governor.wait(&mut stub), 0);
        assert_eq!(governor.clock().now(), 5.0);
        assert_eq!(stub.polls, vec![Some(Duration::ZERO)]);
    }

    #[test]
    fn observed_input_holds_the_clock() {
        let governor = active_governor(&Config::new());
        let mut stub = StubLoop::new(Some(10.0)).with_events(&[3]);

        assert_eq!(governor.wait(&mut stub), 3);
        assert_eq!(governor.clock().now(), 0.0);
    }

    #[test]
    fn pending_timer_jumps_after_the_noop_budget() {
        let governor = active_governor(&Config::new().noop_cycles(2));
        let mut stub = StubLoop::new(Some(10.0));

        // Two zero-time turns, then the jump.
        governor.wait(&mut stub);
        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.0);

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 10.0);
    }

    #[test]
    fn zero_noop_budget_jumps_at_once() {
        let governor = active_governor(&Config::new().noop_cycles(0));
        let mut stub = StubLoop::new(Some(2.5));

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 2.5);
    }

    #[test]
    fn jump_lands_exactly_on_the_deadline() {
        let governor = active_governor(&Config::new().noop_cycles(0).start_at(0.2));
        let mut stub = StubLoop::new(Some(0.41));

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.41);
    }

    #[test]
    fn external_work_steps_instead_of_jumping() {
        let governor = active_governor(&Config::new().noop_cycles(0).idle_step(0.01));
        let token = governor.register_external();
        let mut stub = StubLoop::new(Some(100.0));

        governor.wait(&mut stub);
        // A short real sleep happened; the clock moved by one step, not to
        // the deadline.
        assert_eq!(governor.clock().now(), 0.01);
        assert_eq!(stub.polls.len(), 3);

        governor.complete_external(token);
        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 100.0);
    }

    #[test]
    fn external_step_is_bounded_by_the_deadline() {
        let governor = active_governor(&Config::new().idle_step(10.0));
        governor.register_external();
        let mut stub = StubLoop::new(Some(0.05));

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.05);
    }

    #[test]
    fn idle_loop_expires_after_its_patience() {
        let governor =
            active_governor(&Config::new().idle_timeout(0.02).idle_step(0.01));
        let mut stub = StubLoop::new(None);

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.01);
        assert!(stub.terminals.is_empty());

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.02);
        assert_eq!(stub.terminals, vec![TerminalError::IdleTimeout]);
        assert_eq!(governor.run_state(), RunState::IdleExpired);
    }

    #[test]
    fn input_rearms_the_idle_guard() {
        let governor =
            active_governor(&Config::new().idle_timeout(0.02).idle_step(0.01));

        // The second turn sees input during the early sleep: the clock does
        // not advance and the idle countdown restarts from scratch.
        let mut stub = StubLoop::new(None).with_events(&[0, 0, 0, 0, 1]);
        governor.wait(&mut stub);
        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.01);
        assert!(stub.terminals.is_empty());
        assert_eq!(governor.run_state(), RunState::Active);
    }

    #[test]
    fn idle_guard_fires_with_an_end_of_time_configured() {
        // Both guards armed: the distant end must not mask the idle one.
        let governor = active_governor(&Config::new().end_at(10.0).idle_timeout(0.05));
        let mut stub = StubLoop::new(None);

        governor.wait(&mut stub);
        assert_eq!(stub.terminals, vec![TerminalError::IdleTimeout]);
        assert_eq!(governor.run_state(), RunState::IdleExpired);
        assert_eq!(governor.clock().now(), 0.05);
    }

    #[test]
    fn stepped_idle_guard_fires_with_an_end_of_time_configured() {
        let governor = active_governor(
            &Config::new().end_at(10.0).idle_timeout(0.02).idle_step(0.01),
        );
        let mut stub = StubLoop::new(None);

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.01);
        assert!(stub.terminals.is_empty());

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.02);
        assert_eq!(stub.terminals, vec![TerminalError::IdleTimeout]);
    }

    #[test]
    fn end_of_time_cuts_a_jump_short() {
        let governor = active_governor(&Config::new().noop_cycles(0).end_at(1.0));
        let mut stub = StubLoop::new(Some(10.0));

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 1.0);
        assert_eq!(stub.terminals, vec![TerminalError::EndOfTime]);
        assert_eq!(governor.run_state(), RunState::EndReached);
    }

    #[test]
    fn terminal_runs_reinject_to_late_waiters() {
        let governor = active_governor(&Config::new().noop_cycles(0).end_at(1.0));
        let mut stub = StubLoop::new(Some(10.0));
        governor.wait(&mut stub);

        governor.wait(&mut stub);
        assert_eq!(
            stub.terminals,
            vec![TerminalError::EndOfTime, TerminalError::EndOfTime]
        );
        // The clock never passes the end-of-time.
        assert_eq!(governor.clock().now(), 1.0);
    }

    #[test]
    fn deadline_beyond_the_end_still_stops_at_the_end() {
        let governor = active_governor(&Config::new().noop_cycles(0).end_at(0.15));
        let mut stub = StubLoop::new(Some(0.2));

        governor.wait(&mut stub);
        assert_eq!(governor.clock().now(), 0.15);
        assert_eq!(stub.terminals, vec![TerminalError::EndOfTime]);
    }

    #[test]
    fn deactivated_run_leaves_terminal_state() {
        let governor = Governor::new();
        let run = governor
            .configure(&Config::new().noop_cycles(0).end_at(1.0))
            .unwrap();
        governor.activate(&run).unwrap();

        let mut stub = StubLoop::new(Some(10.0));
        governor.wait(&mut stub);
        assert_eq!(governor.run_state(), RunState::EndReached);

        governor.deactivate(&run).unwrap();
        assert_eq!(governor.run_state(), RunState::Inactive);
    }

    #[test]
    fn inactive_run_sleeps_for_real() {
        let governor = Governor::new();
        governor.configure(&Config::new()).unwrap();

        let mut stub = StubLoop::new(Some(0.01));
        let started = Instant::now();
        governor.wait(&mut stub);

        assert!(started.elapsed() >= Duration::from_millis(5));
        assert_eq!(governor.clock().now(), 0.01);
    }

    #[test]
    fn unattached_engine_passes_waits_through() {
        let governor = Governor::new();
        let mut stub = StubLoop::new(Some(0.005));

        governor.wait(&mut stub);
        assert_eq!(stub.polls.len(), 2);
        assert_eq!(stub.polls[1], Some(Duration::from_millis(5)));
        assert_eq!(governor.clock().now(), 0.005);
        assert!(stub.terminals.is_empty());
    }
}
