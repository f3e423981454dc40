//! SIGINT/SIGTERM handling for the foreground `up` command.
//!
//! The handler only sets an atomic flag; teardown runs on the main thread
//! once the wait loop observes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static STOP: AtomicBool = AtomicBool::new(false);

/// Install handlers for SIGINT and SIGTERM. Idempotent; later calls are
/// no-ops.
pub fn install() {
    #[cfg(unix)]
    {
        use std::sync::Once;

        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            install_unix_handlers();
        });
    }
}

/// True once a stop signal has arrived.
pub fn stop_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Block the calling thread until SIGINT or SIGTERM.
pub fn wait_for_stop() {
    while !stop_requested() {
        std::thread::sleep(Duration::from_millis(200));
    }
}

#[cfg(unix)]
unsafe fn install_unix_handlers() {
    extern "C" fn handler(_signum: libc::c_int) {
        STOP.store(true, Ordering::SeqCst);
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        // SA_RESTART keeps interrupted sleeps from surfacing as errors.
        action.sa_flags = libc::SA_RESTART;
        action.sa_sigaction = handler as usize;

        let mut empty_set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut empty_set as *mut libc::sigset_t);
        action.sa_mask = empty_set;

        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}
