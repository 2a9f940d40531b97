// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};

use crate::engine::State;
use crate::ticks::{Resolution, Ticks};

/// A read-only handle to the engine's virtual clock.
///
/// Cheap to clone and to read; clones observe the same instant. The clock
/// never moves on its own — it advances only through the engine's wait
/// policy, so two reads with no intervening wait return the same value.
///
/// # Examples
///
/// ```
/// use timewarp::{Config, Governor};
///
/// let governor = Governor::new();
/// governor.configure(&Config::new().start_at(100.0))?;
///
/// let clock = governor.clock();
/// assert_eq!(clock.now(), 100.0);
/// # Ok::<(), timewarp::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    state: Arc<Mutex<State>>,
}

impl Clock {
    pub(crate) fn new(state: Arc<Mutex<State>>) -> Self {
        Self { state }
    }

    /// The current loop time, in seconds.
    ///
    /// Exact for every instant the clock can actually hold: the reading is
    /// a ratio of two integers, not a running float sum.
    #[must_use]
    pub fn now(&self) -> f64 {
        let state = self.lock();
        state.resolution.seconds(state.now)
    }

    /// The current loop time as a raw tick count.
    #[must_use]
    pub fn now_ticks(&self) -> Ticks {
        self.lock().now
    }

    /// The resolution the ticks are counted in.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.lock().resolution
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("acquiring the state lock must always succeed")
    }
}
