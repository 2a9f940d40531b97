// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::float_cmp,
        reason = "Allow these lints in tests to improve the readability of the tests"
    )
)]

//! Timewarp makes the time of a single-threaded cooperative scheduler fake
//! and fast: timer-only stretches are skipped instantly, while the clock
//! readings stay plausible, strictly ordered and exact.
//!
//! - [`Governor`]. The engine. It owns the virtual clock and substitutes
//!     the scheduler's blocking wait with its own decision function.
//! - [`Clock`]. A read-only handle to the virtual clock.
//! - [`Config`]. Per-run settings: the starting instant, the end-of-time,
//!     the resolution, the idle guards.
//! - [`EventLoop`]. The trait a host scheduler implements to be governed.
//! - [`Chronometer`]. Measures code blocks against the real or the virtual
//!     clock.
//! - [`Error`]. An error from configuring or driving the engine.
//!     Introspection is limited.
//! - [`TerminalError`]. The condition delivered to waiting units of work
//!     when a run is abandoned.
//!
//! # How the time moves
//!
//! The virtual clock never ticks on its own. On every wait the engine
//! looks at what the scheduler could possibly be waiting for:
//!
//! - nothing but a timer: the clock jumps straight to it, after a few
//!     zero-time grace turns that let nested suspension points register
//!     their own deadlines;
//! - outstanding off-thread work: the engine sleeps in small real steps
//!     and moves the clock by the same amount, so the loop time keeps
//!     tracking the real time it genuinely has to spend;
//! - nothing at all: same stepping, bounded by an idle guard that
//!     abandons a run which only external input could ever revive.
//!
//! All clock math is integer ticks at a configurable resolution, so
//! readings like `0.2 + 0.21` come out exactly `0.41` rather than
//! `0.41000000000000003`.
//!
//! # Abandoned runs
//!
//! Two guards bound every run in real terms: an optional end-of-time for
//! the virtual clock and an idle timeout for the real one. When either
//! fires, every suspended unit of work receives a [`TerminalError`], at
//! most once per unit, and the run is over until reconfigured.
//!
//! # Examples
//!
//! ```
//! use timewarp::runtime::MiniLoop;
//! use timewarp::{Chronometer, Config, Governor};
//!
//! let governor = Governor::new();
//! let run = governor.configure(&Config::new())?;
//! governor.activate(&run)?;
//!
//! let mut scheduler = MiniLoop::new(governor.clone());
//! let real = Chronometer::start();
//! let waiter = scheduler.sleep(900.0);
//! scheduler.run_until(&waiter)?;
//!
//! // Fifteen virtual minutes, (almost) no real time.
//! assert_eq!(governor.clock().now(), 900.0);
//! assert!(real.elapsed_secs() < 1.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod chronometer;
mod clock;
mod config;
mod engine;
mod error;
mod external;
mod policy;
mod scheduler;
mod throttle;
mod ticks;

pub mod runtime;

pub use chronometer::*;
pub use clock::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use external::WorkToken;
pub use scheduler::*;
pub use ticks::*;
