// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::engine::Governor;
use crate::error::TerminalError;
use crate::external::WorkToken;
use crate::scheduler::EventLoop;
use crate::ticks::Ticks;

type Callback = Box<dyn FnOnce(&mut MiniLoop)>;

/// The outcome slot of one unit of work on a [`MiniLoop`].
///
/// A waiter is fulfilled exactly once: either with `Ok` when its unit
/// completes, or with the terminal condition that abandoned the run.
#[derive(Clone)]
pub struct Waiter {
    cell: Rc<RefCell<Option<Result<(), TerminalError>>>>,
}

impl Waiter {
    fn new() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }

    /// Whether the unit completed or was abandoned.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cell.borrow().is_some()
    }

    /// The outcome, once there is one.
    #[must_use]
    pub fn result(&self) -> Option<Result<(), TerminalError>> {
        *self.cell.borrow()
    }

    fn fulfill(&self, result: Result<(), TerminalError>) -> bool {
        let mut cell = self.cell.borrow_mut();
        if cell.is_none() {
            *cell = Some(result);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Waiter").field(&self.result()).finish()
    }
}

enum Wakeup {
    ExternalDone(WorkToken),
}

/// A bare-bones single-threaded cooperative scheduler governed by a
/// [`Governor`].
///
/// Callbacks are keyed by their loop-time deadline; off-thread work runs on
/// plain threads and reports back over a channel, which doubles as the
/// loop's only wait primitive. Just enough of a scheduler to exercise every
/// mode of the engine.
///
/// # Examples
///
/// ```
/// use timewarp::runtime::MiniLoop;
/// use timewarp::{Config, Governor};
///
/// let governor = Governor::new();
/// let run = governor.configure(&Config::new())?;
/// governor.activate(&run)?;
///
/// let mut scheduler = MiniLoop::new(governor.clone());
/// let waiter = scheduler.sleep(60.0);
/// scheduler.run_until(&waiter)?;
/// assert_eq!(governor.clock().now(), 60.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MiniLoop {
    governor: Governor,
    clock: Clock,
    seq: u64,
    timers: BTreeMap<(Ticks, u64), Callback>,
    tx: mpsc::Sender<Wakeup>,
    rx: mpsc::Receiver<Wakeup>,
    waiters: Vec<Waiter>,
    external: HashMap<WorkToken, Waiter>,
}

impl MiniLoop {
    /// Creates an empty loop governed by `governor`.
    #[must_use]
    pub fn new(governor: Governor) -> Self {
        let clock = governor.clock();
        let (tx, rx) = mpsc::channel();
        Self {
            governor,
            clock,
            seq: 0,
            timers: BTreeMap::new(),
            tx,
            rx,
            waiters: Vec::new(),
            external: HashMap::new(),
        }
    }

    /// The loop's clock; all deadlines are expressed on it.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    /// Schedules a callback at an absolute loop-time instant. Instants at
    /// or before the current reading run on the next turn without moving
    /// the clock.
    pub fn at(&mut self, deadline: f64, callback: impl FnOnce(&mut Self) + 'static) {
        let due = self.clock.resolution().ticks_saturating(deadline);
        self.seq += 1;
        self.timers.insert((due, self.seq), Box::new(callback));
    }

    /// Suspends a unit of work for `seconds` of loop time.
    pub fn sleep(&mut self, seconds: f64) -> Waiter {
        let waiter = Waiter::new();
        let deadline = self.clock.now() + seconds;
        let fulfilled = waiter.clone();
        self.at(deadline, move |_| {
            fulfilled.fulfill(Ok(()));
        });
        self.waiters.push(waiter.clone());
        waiter
    }

    /// A unit of work with no completion source inside the loop; only a
    /// terminal condition can ever fulfill it. This is what an idle loop
    /// waiting for input that never comes looks like.
    pub fn pending(&mut self) -> Waiter {
        let waiter = Waiter::new();
        self.waiters.push(waiter.clone());
        waiter
    }

    /// Runs `work` on a separate thread as registered off-thread work. The
    /// engine shares real time with it until it reports back.
    pub fn spawn_external(&mut self, work: impl FnOnce() + Send + 'static) -> Waiter {
        let waiter = Waiter::new();
        let token = self.governor.register_external();
        self.external.insert(token, waiter.clone());
        self.waiters.push(waiter.clone());

        let tx = self.tx.clone();
        thread::spawn(move || {
            work();
            // The loop may be gone already; nothing left to wake then.
            let _ = tx.send(Wakeup::ExternalDone(token));
        });
        waiter
    }

    /// Turns the loop until `waiter` is fulfilled.
    ///
    /// # Errors
    ///
    /// Returns the terminal condition when the run was abandoned before the
    /// unit completed.
    ///
    /// # Panics
    ///
    /// Panics after 30 seconds of real time as a safety net for stuck runs.
    pub fn run_until(&mut self, waiter: &Waiter) -> Result<(), TerminalError> {
        let started = Instant::now();
        loop {
            self.run_due();
            self.waiters.retain(|waiter| !waiter.is_done());
            if let Some(result) = waiter.result() {
                return result;
            }

            assert!(
                started.elapsed() <= Duration::from_secs(30),
                "the run took more than 30s of real time"
            );

            let governor = self.governor.clone();
            governor.wait(self);
        }
    }

    /// Runs every callback whose deadline is at or before the current
    /// reading, including the ones scheduled by the callbacks themselves.
    fn run_due(&mut self) {
        loop {
            let now = self.clock.now_ticks();
            let due = match self.timers.keys().next() {
                Some(&key) if key.0 <= now => key,
                _ => break,
            };
            if let Some(callback) = self.timers.remove(&due) {
                callback(self);
            }
        }
    }

    fn handle(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::ExternalDone(token) => {
                self.governor.complete_external(token);
                if let Some(waiter) = self.external.remove(&token) {
                    waiter.fulfill(Ok(()));
                }
            }
        }
    }

    fn drain(&mut self) -> usize {
        let mut events = 0;
        while let Ok(wakeup) = self.rx.try_recv() {
            self.handle(wakeup);
            events += 1;
        }
        events
    }
}

impl fmt::Debug for MiniLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniLoop")
            .field("now", &self.clock.now())
            .field("timers", &self.timers.len())
            .field("waiters", &self.waiters.len())
            .field("external", &self.external.len())
            .finish()
    }
}

impl EventLoop for MiniLoop {
    fn next_deadline(&self) -> Option<f64> {
        self.timers
            .keys()
            .next()
            .map(|&(due, _)| self.clock.resolution().seconds(due))
    }

    fn poll_events(&mut self, timeout: Option<Duration>) -> usize {
        let events = self.drain();
        if events > 0 {
            return events;
        }
        // The loop keeps a sender of its own, so the channel never
        // disconnects; a receive error can only be a timeout.
        match timeout {
            Some(timeout) if timeout.is_zero() => 0,
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(wakeup) => {
                    self.handle(wakeup);
                    1 + self.drain()
                }
                Err(_) => 0,
            },
            None => match self.rx.recv() {
                Ok(wakeup) => {
                    self.handle(wakeup);
                    1 + self.drain()
                }
                Err(_) => 0,
            },
        }
    }

    fn inject_terminal(&mut self, error: TerminalError) {
        for waiter in &self.waiters {
            waiter.fulfill(Err(error));
        }
        self.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn active(config: &Config) -> Governor {
        let governor = Governor::new();
        let run = governor.configure(config).unwrap();
        governor.activate(&run).unwrap();
        governor
    }

    #[test]
    fn sleeps_are_compacted() {
        let governor = active(&Config::new());
        let mut scheduler = MiniLoop::new(governor.clone());

        let waiter = scheduler.sleep(100.0);
        scheduler.run_until(&waiter).unwrap();
        assert_eq!(governor.clock().now(), 100.0);
    }

    #[test]
    fn callbacks_run_in_deadline_order() {
        let governor = active(&Config::new());
        let mut scheduler = MiniLoop::new(governor.clone());

        let order = Rc::new(RefCell::new(Vec::new()));
        for (deadline, label) in [(3.0, "c"), (1.0, "a"), (2.0, "b")] {
            let order = Rc::clone(&order);
            scheduler.at(deadline, move |_| order.borrow_mut().push(label));
        }

        let waiter = scheduler.sleep(5.0);
        scheduler.run_until(&waiter).unwrap();
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn due_callbacks_run_without_moving_the_clock() {
        let governor = active(&Config::new().start_at(7.0));
        let mut scheduler = MiniLoop::new(governor.clone());

        let waiter = Waiter::new();
        let fulfilled = waiter.clone();
        scheduler.at(7.0, move |_| {
            fulfilled.fulfill(Ok(()));
        });
        scheduler.run_until(&waiter).unwrap();
        assert_eq!(governor.clock().now(), 7.0);
    }

    #[test]
    fn external_work_completes() {
        let governor = active(&Config::new());
        let mut scheduler = MiniLoop::new(governor.clone());

        let waiter = scheduler.spawn_external(|| {
            thread::sleep(Duration::from_millis(20));
        });
        scheduler.run_until(&waiter).unwrap();
        assert_eq!(governor.pending_external(), 0);
    }

    #[test]
    fn abandoned_run_fails_the_waiters() {
        let governor = active(&Config::new().end_at(1.0));
        let mut scheduler = MiniLoop::new(governor.clone());

        let waiter = scheduler.sleep(10.0);
        assert_eq!(
            scheduler.run_until(&waiter),
            Err(TerminalError::EndOfTime)
        );
    }
}
