// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

// This example demonstrates the basic usage of the engine: an hour of
// virtual delays executed in milliseconds of real time.

use std::error::Error;

use timewarp::runtime::MiniLoop;
use timewarp::{Chronometer, Config, Governor};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let governor = Governor::new();
    let run = governor.configure(&Config::new())?;
    governor.activate(&run)?;

    let mut scheduler = MiniLoop::new(governor.clone());
    let clock = governor.clock();

    // A chain of delayed callbacks, one virtual minute apart.
    for minute in 1..=60 {
        let clock = clock.clone();
        scheduler.at(f64::from(minute) * 60.0, move |_| {
            println!("minute {minute:2}: the loop clock reads {}s", clock.now());
        });
    }

    let real = Chronometer::start();
    let waiter = scheduler.sleep(3600.0);
    scheduler.run_until(&waiter)?;

    println!(
        "one virtual hour took {:.3}ms of real time",
        real.elapsed_secs() * 1e3
    );
    Ok(())
}
