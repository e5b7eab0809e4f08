// Not all functions are used by every test file.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use mojo_core::{Core, FakeClock, Limits};

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    })
}

/// A `Core` over a `FakeClock`, for tests that assert on timeout
/// behavior without actually sleeping.
pub fn core_with_fake_clock() -> (Core, Arc<FakeClock>) {
    init();
    let clock = Arc::new(FakeClock::new());
    let core = Core::with_clock_and_limits(clock.clone(), Limits::production());
    (core, clock)
}

/// A `Core` with limits small enough to hit `RESOURCE_EXHAUSTED`
/// deliberately, still on a fake clock.
pub fn core_with_limits(limits: Limits) -> (Core, Arc<FakeClock>) {
    init();
    let clock = Arc::new(FakeClock::new());
    let core = Core::with_clock_and_limits(clock.clone(), limits);
    (core, clock)
}

pub fn assert_sync<T: Sync>() {}
pub fn assert_send<T: Send>() {}
