mod util;

use mojo_core::{MojoError, ReadMessageResult, Rights, Signals, WAIT_INDEFINITE};
use util::core_with_fake_clock;

#[test]
fn scenario_message_hello() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();

    core.write_message(a, b"hello".to_vec(), &[]).unwrap();
    let report = core.wait(b, Signals::READABLE, WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());

    match core.read_message(b, 64, 0, false).unwrap() {
        ReadMessageResult::Read(msg) => {
            assert_eq!(msg.bytes, b"hello");
            assert!(msg.handles.is_empty());
        }
        ReadMessageResult::TooSmall { .. } => panic!("expected a message"),
    }
}

#[test]
fn reading_an_empty_pipe_with_an_open_peer_reports_should_wait() {
    let (core, _clock) = core_with_fake_clock();
    let (_a, b) = core.create_message_pipe(8, 0).unwrap();
    assert_eq!(core.read_message(b, 64, 0, false).unwrap_err(), MojoError::ShouldWait);
}

#[test]
fn reading_an_empty_pipe_after_the_peer_closed_reports_failed_precondition() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();
    core.close(a).unwrap();
    assert_eq!(core.read_message(b, 64, 0, false).unwrap_err(), MojoError::FailedPrecondition);
}

#[test]
fn messages_are_delivered_in_fifo_order() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();
    core.write_message(a, b"one".to_vec(), &[]).unwrap();
    core.write_message(a, b"two".to_vec(), &[]).unwrap();
    core.write_message(a, b"three".to_vec(), &[]).unwrap();

    for expected in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        match core.read_message(b, 64, 0, false).unwrap() {
            ReadMessageResult::Read(msg) => assert_eq!(msg.bytes, expected),
            ReadMessageResult::TooSmall { .. } => panic!("expected a message"),
        }
    }
}

#[test]
fn a_pipe_is_bidirectional() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();
    core.write_message(b, b"from b".to_vec(), &[]).unwrap();
    match core.read_message(a, 64, 0, false).unwrap() {
        ReadMessageResult::Read(msg) => assert_eq!(msg.bytes, b"from b"),
        ReadMessageResult::TooSmall { .. } => panic!("expected a message"),
    }
}

#[test]
fn closing_one_end_marks_the_other_peer_closed_and_not_writable() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();
    core.close(a).unwrap();

    let report = core.wait(b, Signals::PEER_CLOSED, WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());
    assert!(!report.state.satisfiable().contains(Signals::WRITABLE));
}

#[test]
fn a_transferred_handle_is_usable_only_after_being_read_out() {
    let (core, _clock) = core_with_fake_clock();
    let (a, b) = core.create_message_pipe(8, 0).unwrap();
    let passenger = core.create_event(8, 0).unwrap();

    core.write_message(a, Vec::new(), &[passenger]).unwrap();
    assert_eq!(core.get_rights(passenger).unwrap_err(), MojoError::InvalidArgument);

    let received = match core.read_message(b, 0, 4, false).unwrap() {
        ReadMessageResult::Read(msg) => msg.handles[0],
        ReadMessageResult::TooSmall { .. } => panic!("expected a message"),
    };
    core.signal(received, Signals::NONE, Signals::SIGNAL2).unwrap();
    let report = core.wait(received, Signals::SIGNAL2, WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());
}

#[test]
fn reading_through_a_handle_missing_the_read_right_is_denied() {
    let (core, _clock) = core_with_fake_clock();
    let (a, _b) = core.create_message_pipe(8, 0).unwrap();
    let write_only = core.duplicate_handle_with_reduced_rights(a, Rights::READ).unwrap();
    core.write_message(write_only, b"ok".to_vec(), &[]).unwrap();
    assert_eq!(core.read_message(write_only, 64, 0, false).unwrap_err(), MojoError::PermissionDenied);
}

#[test]
fn creating_a_pipe_with_an_unknown_flag_bit_is_unimplemented() {
    let (core, _clock) = core_with_fake_clock();
    let err = core.create_message_pipe(8, 1).unwrap_err();
    assert_eq!(err, MojoError::Unimplemented);
}

#[test]
fn oversized_message_is_resource_exhausted() {
    use mojo_core::Limits;
    let (core, _clock) = util::core_with_limits(Limits {
        max_message_bytes: 8,
        ..Limits::production()
    });
    let (a, _b) = core.create_message_pipe(8, 0).unwrap();
    let err = core.write_message(a, vec![0u8; 9], &[]).unwrap_err();
    assert_eq!(err, MojoError::ResourceExhausted);
}
