// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::time::Duration;

use crate::TerminalError;

/// The capability surface the engine consumes from a host scheduler.
///
/// A scheduler attaches the engine by composition: it implements this trait
/// and calls [`Governor::wait`][crate::Governor::wait] wherever it would
/// otherwise block on its native wait primitive. No part of the scheduler
/// is rewritten or wrapped at runtime; the seam is this trait alone.
///
/// The engine calls back into the scheduler only through these three
/// methods, and never while holding its own state lock, so implementations
/// are free to call [`Governor::complete_external`][crate::Governor::complete_external]
/// from inside [`EventLoop::poll_events`].
pub trait EventLoop {
    /// The earliest instant, in loop-clock seconds, at which a scheduled
    /// callback becomes due. `None` when nothing is scheduled.
    fn next_deadline(&self) -> Option<f64>;

    /// The scheduler's native wait primitive: block for up to `timeout`
    /// (forever when `None`, pure poll when zero) and return how many
    /// externally-triggered events were observed — I/O readiness,
    /// cross-thread completion wakeups, and the like.
    ///
    /// The engine calls this with a zero timeout on every decision, with
    /// short real timeouts while external work is outstanding, and with the
    /// scheduler's own timeout when it is not governing the run.
    fn poll_events(&mut self, timeout: Option<Duration>) -> usize;

    /// Delivers a terminal condition to every currently-suspended unit of
    /// work, at most once per unit. Units that already completed, or that
    /// already received a terminal condition, must not see it again.
    fn inject_terminal(&mut self, error: TerminalError);
}
