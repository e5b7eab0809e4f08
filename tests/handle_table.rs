mod util;

use mojo_core::{Core, Handle, MojoError, Rights};
use util::{assert_send, assert_sync, core_with_fake_clock};

#[test]
fn core_is_send_and_sync() {
    assert_send::<Core>();
    assert_sync::<Core>();
}

#[test]
fn invalid_handle_is_never_valid() {
    assert!(!Handle::INVALID.is_valid());
}

#[test]
fn close_on_an_unknown_handle_fails() {
    let (core, _clock) = core_with_fake_clock();
    let err = core.close(Handle(12345)).unwrap_err();
    assert_eq!(err, MojoError::InvalidArgument);
}

#[test]
fn close_is_not_reentrant() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    core.close(handle).unwrap();
    assert_eq!(core.close(handle).unwrap_err(), MojoError::InvalidArgument);
}

#[test]
fn duplicate_without_duplicate_right_is_denied() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    let reduced = core.duplicate_handle_with_reduced_rights(handle, Rights::DUPLICATE).unwrap();
    assert_eq!(core.duplicate_handle(reduced).unwrap_err(), MojoError::PermissionDenied);
}

#[test]
fn duplicate_shares_the_underlying_object_not_just_the_rights() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    let dup = core.duplicate_handle(handle).unwrap();

    core.signal(handle, mojo_core::Signals::NONE, mojo_core::Signals::SIGNAL0).unwrap();
    let report = core.wait(dup, mojo_core::Signals::SIGNAL0, mojo_core::WAIT_INDEFINITE).unwrap();
    assert!(report.outcome.is_ok());
}

#[test]
fn closing_one_duplicate_does_not_invalidate_the_other() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_event(8, 0).unwrap();
    let dup = core.duplicate_handle(handle).unwrap();

    core.close(handle).unwrap();
    assert!(core.get_rights(dup).is_ok());
    core.signal(dup, mojo_core::Signals::NONE, mojo_core::Signals::SIGNAL1).unwrap();
}

#[test]
fn replace_with_reduced_rights_invalidates_the_original_handle_value() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_shared_buffer(8, 0, 16).unwrap();
    let reduced = core.replace_handle_with_reduced_rights(handle, Rights::WRITE).unwrap();

    assert_eq!(core.get_rights(handle).unwrap_err(), MojoError::InvalidArgument);
    assert!(!core.get_rights(reduced).unwrap().contains(Rights::WRITE));
    assert!(core.get_rights(reduced).unwrap().contains(Rights::READ));
}

#[test]
fn rights_reduction_cannot_be_clawed_back() {
    let (core, _clock) = core_with_fake_clock();
    let handle = core.create_shared_buffer(8, 0, 16).unwrap();
    let reduced = core.duplicate_handle_with_reduced_rights(handle, Rights::WRITE | Rights::DUPLICATE).unwrap();

    // No right to duplicate a handle into a wider set than it already has.
    assert_eq!(core.duplicate_handle(reduced).unwrap_err(), MojoError::PermissionDenied);
    assert!(!core.get_rights(reduced).unwrap().contains(Rights::WRITE));
}

#[test]
fn a_freed_slot_is_never_handed_out_while_another_handle_still_occupies_it() {
    let (core, _clock) = core_with_fake_clock();
    let a = core.create_event(8, 0).unwrap();
    let b = core.create_event(8, 0).unwrap();
    core.close(a).unwrap();
    let c = core.create_event(8, 0).unwrap();
    assert_ne!(c, b);
    assert!(core.get_rights(b).is_ok());
}
