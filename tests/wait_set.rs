mod util;

use mojo_core::{MojoError, Signals, WAIT_INDEFINITE};
use util::core_with_fake_clock;

#[test]
fn scenario_wait_set_wait_drains_a_ready_member() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    let event = core.create_event(8, 0).unwrap();
    core.wait_set_add(ws, event, Signals::SIGNAL0, 8, 0, 42).unwrap();

    core.signal(event, Signals::NONE, Signals::SIGNAL0).unwrap();
    let (results, total) = core.wait_set_wait(ws, WAIT_INDEFINITE, 4).unwrap();
    assert_eq!(total, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 42);
    assert!(results[0].1.is_ok());
}

#[test]
fn adding_the_same_cookie_twice_fails() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    let e1 = core.create_event(8, 0).unwrap();
    let e2 = core.create_event(8, 0).unwrap();
    core.wait_set_add(ws, e1, Signals::SIGNAL0, 8, 0, 1).unwrap();
    let err = core.wait_set_add(ws, e2, Signals::SIGNAL0, 8, 0, 1).unwrap_err();
    assert_eq!(err, MojoError::AlreadyExists);
}

#[test]
fn removing_an_unknown_cookie_is_not_found() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    assert_eq!(core.wait_set_remove(ws, 99).unwrap_err(), MojoError::NotFound);
}

#[test]
fn a_removed_member_no_longer_contributes_ready_results() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    let event = core.create_event(8, 0).unwrap();
    core.wait_set_add(ws, event, Signals::SIGNAL0, 8, 0, 5).unwrap();
    core.wait_set_remove(ws, 5).unwrap();
    core.signal(event, Signals::NONE, Signals::SIGNAL0).unwrap();

    let (results, total) = core.wait_set_wait(ws, 0, 4).unwrap();
    assert!(results.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn capacity_below_the_ready_count_still_reports_the_full_total() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    let e1 = core.create_event(8, 0).unwrap();
    let e2 = core.create_event(8, 0).unwrap();
    core.wait_set_add(ws, e1, Signals::SIGNAL0, 8, 0, 1).unwrap();
    core.wait_set_add(ws, e2, Signals::SIGNAL0, 8, 0, 2).unwrap();
    core.signal(e1, Signals::NONE, Signals::SIGNAL0).unwrap();
    core.signal(e2, Signals::NONE, Signals::SIGNAL0).unwrap();

    let (results, total) = core.wait_set_wait(ws, WAIT_INDEFINITE, 1).unwrap();
    assert_eq!(total, 2);
    assert_eq!(results.len(), 1);
}

#[test]
fn a_member_already_satisfied_when_added_is_ready_immediately() {
    let (core, _clock) = core_with_fake_clock();
    let event = core.create_event(8, 0).unwrap();
    core.signal(event, Signals::NONE, Signals::SIGNAL0).unwrap();

    let ws = core.create_wait_set(8, 0).unwrap();
    core.wait_set_add(ws, event, Signals::SIGNAL0, 8, 0, 1).unwrap();
    let (results, total) = core.wait_set_wait(ws, WAIT_INDEFINITE, 4).unwrap();
    assert_eq!(total, 1);
    assert_eq!(results[0].0, 1);
}

#[test]
fn closing_the_wait_set_releases_its_member_registrations() {
    let (core, _clock) = core_with_fake_clock();
    let ws = core.create_wait_set(8, 0).unwrap();
    let event = core.create_event(8, 0).unwrap();
    core.wait_set_add(ws, event, Signals::SIGNAL0, 8, 0, 1).unwrap();
    core.close(ws).unwrap();

    // The event itself is unaffected by the wait set's closure.
    core.signal(event, Signals::NONE, Signals::SIGNAL0).unwrap();
    assert!(core.get_rights(event).is_ok());
}
