// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]
#![allow(clippy::float_cmp, reason = "clock readings are exact by design")]

//! End-to-end checks of the compacted time flow: fast-forwarding, exact
//! readings, continuity across runs, and the ungoverned passthrough mode.

use std::time::{Duration, Instant};

use timewarp::runtime::MiniLoop;
use timewarp::{Chronometer, Config, Governor};

fn activated(config: &Config) -> Governor {
    let governor = Governor::new();
    let run = governor.configure(config).unwrap();
    governor.activate(&run).unwrap();
    governor
}

#[test]
fn the_clock_starts_at_zero() {
    let governor = Governor::new();
    governor.configure(&Config::new()).unwrap();
    assert_eq!(governor.clock().now(), 0.0);
}

#[test]
fn a_long_sleep_costs_no_real_time() {
    let governor = activated(&Config::new());
    let mut scheduler = MiniLoop::new(governor.clone());

    let real = Chronometer::start();
    let waiter = scheduler.sleep(3600.0);
    scheduler.run_until(&waiter).unwrap();

    assert_eq!(governor.clock().now(), 3600.0);
    assert!(real.elapsed_secs() < 1.0);
}

#[test]
fn the_clock_starts_where_told() {
    let governor = activated(&Config::new().start_at(100.0));
    let mut scheduler = MiniLoop::new(governor.clone());

    let waiter = scheduler.sleep(5.0);
    scheduler.run_until(&waiter).unwrap();
    assert_eq!(governor.clock().now(), 105.0);
}

#[test]
fn readings_are_exact_despite_float_addition() {
    // 0.2 + 0.09 is 0.29000000000000004 in plain f64 math.
    let governor = activated(&Config::new().start_at(0.2));
    let mut scheduler = MiniLoop::new(governor.clone());

    let waiter = scheduler.sleep(0.09);
    scheduler.run_until(&waiter).unwrap();
    assert_eq!(governor.clock().now(), 0.29);
}

#[test]
fn time_continues_across_runs() {
    let governor = activated(&Config::new());
    let mut scheduler = MiniLoop::new(governor.clone());

    let waiter = scheduler.sleep(10.0);
    scheduler.run_until(&waiter).unwrap();
    assert_eq!(governor.clock().now(), 10.0);

    // A new run without a forced start picks up where the last one ended.
    let run = governor.configure(&Config::new()).unwrap();
    governor.activate(&run).unwrap();

    let waiter = scheduler.sleep(5.0);
    scheduler.run_until(&waiter).unwrap();
    assert_eq!(governor.clock().now(), 15.0);
}

#[test]
fn loop_time_measurement_spans_a_compacted_sleep() {
    let governor = activated(&Config::new().start_at(50.0));
    let mut scheduler = MiniLoop::new(governor.clone());

    let virtual_time = Chronometer::with_clock(&governor.clock());
    let waiter = scheduler.sleep(25.0);
    scheduler.run_until(&waiter).unwrap();

    assert_eq!(virtual_time.elapsed(), Duration::from_secs(25));
}

#[test]
fn an_ungoverned_run_sleeps_for_real() {
    // Configured but never activated: waits pass through to real time.
    let governor = Governor::new();
    governor.configure(&Config::new()).unwrap();
    let mut scheduler = MiniLoop::new(governor.clone());

    let started = Instant::now();
    let waiter = scheduler.sleep(0.05);
    scheduler.run_until(&waiter).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(governor.clock().now(), 0.05);
}

#[test]
fn deactivation_switches_back_to_real_time() {
    let governor = Governor::new();
    let run = governor.configure(&Config::new()).unwrap();
    governor.activate(&run).unwrap();
    let mut scheduler = MiniLoop::new(governor.clone());

    let waiter = scheduler.sleep(10.0);
    scheduler.run_until(&waiter).unwrap();

    governor.deactivate(&run).unwrap();
    let started = Instant::now();
    let waiter = scheduler.sleep(0.02);
    scheduler.run_until(&waiter).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(15));
    assert_eq!(governor.clock().now(), 10.02);
}
