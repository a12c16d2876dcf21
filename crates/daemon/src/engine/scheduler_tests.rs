// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tend_core::{Clock, FakeClock};

#[test]
fn scheduler_timer_lifecycle() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer(TimerId::kill("svc"), Duration::from_secs(10), clock.now());
    assert!(scheduler.has_timers());
    assert!(scheduler.next_deadline().is_some());

    // Timer hasn't fired yet
    clock.advance(Duration::from_secs(5));
    let fired = scheduler.fired_timers(clock.now());
    assert!(fired.is_empty());
    assert!(scheduler.has_timers());

    // Timer fires
    clock.advance(Duration::from_secs(10));
    let fired = scheduler.fired_timers(clock.now());
    assert_eq!(fired, vec![TimerId::kill("svc")]);
    assert!(!scheduler.has_timers());
}

#[test]
fn scheduler_cancel_timer() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer(TimerId::kill("svc"), Duration::from_secs(10), clock.now());
    scheduler.cancel_timer(&TimerId::kill("svc"));

    clock.advance(Duration::from_secs(15));
    assert!(scheduler.fired_timers(clock.now()).is_empty());
}

#[test]
fn fired_timers_come_back_earliest_first() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer(TimerId::kill("late"), Duration::from_secs(9), clock.now());
    scheduler.set_timer(TimerId::kill("early"), Duration::from_secs(1), clock.now());
    clock.advance(Duration::from_secs(10));

    let fired = scheduler.fired_timers(clock.now());
    assert_eq!(fired, vec![TimerId::kill("early"), TimerId::kill("late")]);
}

#[test]
fn rearming_replaces_the_deadline() {
    let clock = FakeClock::new();
    let mut scheduler = Scheduler::new();

    scheduler.set_timer(TimerId::pid("svc"), Duration::from_secs(1), clock.now());
    scheduler.set_timer(TimerId::pid("svc"), Duration::from_secs(30), clock.now());

    clock.advance(Duration::from_secs(5));
    assert!(scheduler.fired_timers(clock.now()).is_empty());
    assert!(scheduler.has_timers());
}
