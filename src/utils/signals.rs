//! Process signal handling
//!
//! SIGTERM (systemd stop), SIGINT (Ctrl+C) and SIGHUP only raise a flag;
//! the hotplug loop checks it between ticks.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set from the signal handler
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown was requested (SIGTERM, SIGINT, or SIGHUP)
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Set up signal handlers for graceful shutdown (call once at startup)
pub fn setup_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGHUP,
            shutdown_signal_handler as *const () as libc::sighandler_t,
        );
    }
}

extern "C" fn shutdown_signal_handler(_signo: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}
