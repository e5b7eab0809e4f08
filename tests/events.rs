mod util;

use mojo_core::{MojoError, Signals, WAIT_INDEFINITE};
use util::core_with_fake_clock;

#[test]
fn a_fresh_event_carries_no_user_signals() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    let report = core.wait(handle, Signals::SIGNAL0, 0).unwrap();
    assert_eq!(report.outcome.unwrap_err(), MojoError::DeadlineExceeded);
}

#[test]
fn signal_sets_and_clears_in_one_call() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    core.signal(handle, Signals::NONE, Signals::SIGNAL0 | Signals::SIGNAL1).unwrap();
    core.signal(handle, Signals::SIGNAL0, Signals::SIGNAL2).unwrap();

    let report = core.wait(handle, Signals::SIGNAL1 | Signals::SIGNAL2, WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());
    assert!(!report.state.satisfied().contains(Signals::SIGNAL0));
}

#[test]
fn signal_rejects_any_bit_outside_the_user_signal_range() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    assert_eq!(
        core.signal(handle, Signals::NONE, Signals::READABLE).unwrap_err(),
        MojoError::InvalidArgument
    );
}

#[test]
fn a_fresh_event_pair_has_no_signals_on_either_side() {
    let (core, _clock) = core_with_fake_clock();
    let (h0, h1) = core.create_event_pair(8, 0).unwrap();
    assert_eq!(core.wait(h0, Signals::SIGNAL0, 0).unwrap().outcome.unwrap_err(), MojoError::DeadlineExceeded);
    assert_eq!(core.wait(h1, Signals::SIGNAL0, 0).unwrap().outcome.unwrap_err(), MojoError::DeadlineExceeded);
}

#[test]
fn signalling_one_half_is_not_observed_on_the_other_half() {
    let (core, _clock) = core_with_fake_clock();
    let (h0, h1) = core.create_event_pair(8, 0).unwrap();
    core.signal(h0, Signals::NONE, Signals::SIGNAL0).unwrap();
    assert!(core.wait(h0, Signals::SIGNAL0, 0).unwrap().outcome.is_ok());
    assert_eq!(core.wait(h1, Signals::SIGNAL0, 0).unwrap().outcome.unwrap_err(), MojoError::DeadlineExceeded);
}

#[test]
fn closing_a_half_marks_the_other_peer_closed() {
    let (core, _clock) = core_with_fake_clock();
    let (h0, h1) = core.create_event_pair(8, 0).unwrap();
    core.close(h0).unwrap();
    let report = core.wait(h1, Signals::PEER_CLOSED, WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());
}

#[test]
fn a_signal_observed_before_peer_close_stays_observable_after() {
    let (core, _clock) = core_with_fake_clock();
    let (h0, h1) = core.create_event_pair(8, 0).unwrap();
    core.signal(h1, Signals::NONE, Signals::SIGNAL3).unwrap();
    core.close(h0).unwrap();

    let report = core.wait(h1, Signals::SIGNAL3, 0).unwrap();
    assert!(report.outcome.is_ok());
    assert!(report.state.satisfiable().contains(Signals::SIGNAL3));
    // A bit that was never set can no longer become satisfiable.
    assert!(!report.state.satisfiable().contains(Signals::SIGNAL4));
}

#[test]
fn blocked_wait_wakes_on_another_thread_signalling_the_handle() {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    let core = Arc::new(mojo_core::Core::new());
    let handle = core.create_event(8, 0).unwrap();
    let signaller = core.clone();

    let joined = thread::spawn(move || core.wait(handle, Signals::SIGNAL0, WAIT_INDEFINITE));
    thread::sleep(Duration::from_millis(20));
    signaller.signal(handle, Signals::NONE, Signals::SIGNAL0).unwrap();

    let report = joined.join().unwrap().unwrap();
    assert!(report.outcome.is_ok());
}
