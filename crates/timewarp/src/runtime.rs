// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

//! A minimal cooperative scheduler wired to the engine, for tests, examples
//! and benchmarks. Real integrations implement [`EventLoop`][crate::EventLoop]
//! on their own loop instead.

mod mini_loop;

pub use mini_loop::{MiniLoop, Waiter};
