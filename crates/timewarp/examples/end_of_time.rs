// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

// This example demonstrates the run guards: a bounded virtual universe and
// the idle patience for loops waiting on input that never comes.

use std::error::Error;

use timewarp::runtime::MiniLoop;
use timewarp::{Config, Governor};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let governor = Governor::new();

    // A universe that ends at t=10: the one-hour sleep never makes it.
    let run = governor.configure(&Config::new().end_at(10.0))?;
    governor.activate(&run)?;

    let mut scheduler = MiniLoop::new(governor.clone());
    let waiter = scheduler.sleep(3600.0);
    match scheduler.run_until(&waiter) {
        Ok(()) => unreachable!("the sleep cannot outlive the end-of-time"),
        Err(error) => println!("at t={}s: {error}", governor.clock().now()),
    }

    // A fresh run with no end, but with little patience for silence. The
    // abandoned one-hour timer is discarded along with the old loop.
    let run = governor.configure(&Config::new().idle_timeout(0.25))?;
    governor.activate(&run)?;

    let mut scheduler = MiniLoop::new(governor.clone());
    let waiter = scheduler.pending();
    match scheduler.run_until(&waiter) {
        Ok(()) => unreachable!("nothing can fulfill this unit of work"),
        Err(error) => println!("at t={}s: {error}", governor.clock().now()),
    }

    Ok(())
}
