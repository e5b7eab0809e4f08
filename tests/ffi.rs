#![cfg(feature = "ffi")]

mod util;

use mojo_core::ffi::*;

#[test]
fn message_pipe_hello_round_trips_through_the_abi() {
    util::init();
    let mut h0 = 0u32;
    let mut h1 = 0u32;
    unsafe {
        assert_eq!(MojoCreateMessagePipe(8, 0, &mut h0, &mut h1), 0);
        let payload = b"hello";
        assert_eq!(
            MojoWriteMessage(h0, payload.as_ptr(), payload.len() as u32, std::ptr::null(), 0),
            0
        );

        let mut satisfied = 0u32;
        let mut satisfiable = 0u32;
        let readable = 1u32 << 0;
        assert_eq!(MojoWait(h1, readable, u64::MAX, &mut satisfied, &mut satisfiable), 0);
        assert_eq!(satisfied & readable, readable);

        let mut buf = [0u8; 16];
        let mut num_bytes = buf.len() as u32;
        let mut num_handles = 0u32;
        let result = MojoReadMessage(h1, buf.as_mut_ptr(), buf.len() as u32, &mut num_bytes, std::ptr::null_mut(), 0, &mut num_handles, false);
        assert_eq!(result, 0);
        assert_eq!(num_bytes, 5);
        assert_eq!(&buf[..5], payload);

        assert_eq!(MojoClose(h0), 0);
        assert_eq!(MojoClose(h1), 0);
    }
}

#[test]
fn data_pipe_write_then_read_round_trips_through_the_abi() {
    util::init();
    let mut producer = 0u32;
    let mut consumer = 0u32;
    unsafe {
        assert_eq!(MojoCreateDataPipe(16, 0, 1, 64, &mut producer, &mut consumer), 0);

        let payload = [1u8, 2, 3, 4, 5];
        let mut num_bytes = payload.len() as u32;
        assert_eq!(MojoWriteData(producer, payload.as_ptr(), &mut num_bytes, 0), 0);
        assert_eq!(num_bytes, 5);

        let mut out = [0u8; 5];
        let mut out_len = out.len() as u32;
        assert_eq!(MojoReadData(consumer, out.as_mut_ptr(), &mut out_len, 0), 0);
        assert_eq!(out_len, 5);
        assert_eq!(out, payload);

        assert_eq!(MojoClose(producer), 0);
        assert_eq!(MojoClose(consumer), 0);
    }
}

#[test]
fn shared_buffer_map_and_unmap_round_trip_through_the_abi() {
    util::init();
    let mut handle = 0u32;
    unsafe {
        assert_eq!(MojoCreateSharedBuffer(8, 0, 16, &mut handle), 0);

        let mut num_bytes = 0u64;
        assert_eq!(MojoGetBufferInformation(handle, &mut num_bytes), 0);
        assert_eq!(num_bytes, 4096);

        let mut map_id = 0u64;
        assert_eq!(MojoMapBuffer(handle, 0, 16, 1, &mut map_id), 0);
        assert_eq!(MojoUnmapBuffer(handle, map_id), 0);
        // Unmapping the same id twice is rejected.
        assert_ne!(MojoUnmapBuffer(handle, map_id), 0);

        assert_eq!(MojoClose(handle), 0);
    }
}

#[test]
fn event_signal_and_wait_round_trip_through_the_abi() {
    util::init();
    let mut handle = 0u32;
    unsafe {
        assert_eq!(MojoCreateEvent(8, 0, &mut handle), 0);
        let signal0 = 1u32 << 5;
        assert_eq!(MojoEventSignal(handle, 0, signal0), 0);

        let mut satisfied = 0u32;
        let mut satisfiable = 0u32;
        assert_eq!(MojoWait(handle, signal0, u64::MAX, &mut satisfied, &mut satisfiable), 0);
        assert_eq!(satisfied & signal0, signal0);

        assert_eq!(MojoClose(handle), 0);
    }
}

#[test]
fn wait_set_add_and_wait_round_trip_through_the_abi() {
    util::init();
    let mut wait_set = 0u32;
    let mut event = 0u32;
    unsafe {
        assert_eq!(MojoCreateWaitSet(8, 0, &mut wait_set), 0);
        assert_eq!(MojoCreateEvent(8, 0, &mut event), 0);

        let signal0 = 1u32 << 5;
        assert_eq!(MojoWaitSetAdd(wait_set, event, signal0, 8, 0, 99), 0);
        assert_eq!(MojoEventSignal(event, 0, signal0), 0);

        let mut results = [MojoWaitSetResult { cookie: 0, result: 0 }];
        let mut capacity = results.len() as u32;
        let mut max_results = 0u32;
        let outcome = MojoWaitSetWait(wait_set, u64::MAX, results.as_mut_ptr(), &mut capacity, &mut max_results);
        assert_eq!(outcome, 0);
        assert_eq!(capacity, 1);
        assert_eq!(max_results, 1);
        assert_eq!(results[0].cookie, 99);
        assert_eq!(results[0].result, 0);

        assert_eq!(MojoClose(wait_set), 0);
        assert_eq!(MojoClose(event), 0);
    }
}

#[test]
fn unknown_handle_reports_a_nonzero_code_in_the_invalid_argument_range() {
    unsafe {
        let code = MojoClose(0xFFFF_FFFF);
        assert_ne!(code, 0);
        // INVALID_ARGUMENT == 0x3 in the low byte.
        assert_eq!(code & 0xFF, 0x3);
    }
}

#[test]
fn thunk_table_exposes_every_entry_point_at_a_stable_size() {
    let table = thunk_table();
    assert_eq!(table.size, std::mem::size_of::<MojoCoreThunks>());

    let mut h0 = 0u32;
    let mut h1 = 0u32;
    unsafe {
        assert_eq!((table.create_message_pipe)(8, 0, &mut h0, &mut h1), 0);
        assert_eq!((table.close)(h0), 0);
        assert_eq!((table.close)(h1), 0);
    }
}
