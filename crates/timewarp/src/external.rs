// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

/// Identifies one outstanding piece of off-thread work.
///
/// Issued by [`Governor::register_external`][crate::Governor::register_external]
/// and redeemed by [`Governor::complete_external`][crate::Governor::complete_external].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkToken(u64);

/// Tracks off-thread work the scheduler has initiated but not yet seen
/// complete: thread-pool submissions, raw I/O waits.
///
/// The wait policy reads [`ExternalWork::pending`] on every decision; a
/// non-zero count is the sole signal that the run must share real time
/// with the outside world instead of fast-forwarding. No ordering among
/// tasks is tracked — each either completes or the run is abandoned by a
/// guard.
#[derive(Debug, Default)]
pub(crate) struct ExternalWork {
    next_token: u64,
    tasks: HashMap<WorkToken, ExternalTask>,
}

#[derive(Debug)]
struct ExternalTask {
    real_start: Instant,
}

impl ExternalWork {
    pub(crate) fn register(&mut self) -> WorkToken {
        self.next_token = self.next_token.wrapping_add(1);
        let token = WorkToken(self.next_token);
        self.tasks.insert(
            token,
            ExternalTask {
                real_start: Instant::now(),
            },
        );
        token
    }

    /// Returns `false` for unknown or already-completed tokens.
    pub(crate) fn complete(&mut self, token: WorkToken) -> bool {
        match self.tasks.remove(&token) {
            Some(task) => {
                debug!(
                    token = token.0,
                    real_elapsed = ?task.real_start.elapsed(),
                    "external task completed"
                );
                true
            }
            None => false,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.tasks.len()
    }
}
