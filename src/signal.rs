//! OS signal handling.
//!
//! Signals fall into four classes, installed by [`install`]:
//!
//! - **ignored**: `SIGCHLD`, so exited children never linger as zombies
//! - **graceful shutdown**: `SIGINT`, `SIGTERM`, `SIGHUP`, `SIGQUIT` request
//!   termination; the host notices through `is_terminating`
//! - **fatal**: `SIGILL`, `SIGABRT`, `SIGFPE`, `SIGSEGV` log a backtrace and
//!   end the process
//! - **user-defined**: `SIGUSR1` and `SIGUSR2` run a host handler set with
//!   [`set_signal_handler`]
//!
//! Handlers only bump atomics and log. Whether the installed logger is safe
//! to call from a signal context is the logger's business.

use crate::error::{ReactorError, Result};

use libc::{
    SA_NODEFER, SA_ONSTACK, SA_RESETHAND, SA_RESTART, SIG_DFL, SIG_IGN, SIGABRT, SIGCHLD, SIGFPE,
    SIGHUP, SIGILL, SIGINT, SIGQUIT, SIGSEGV, SIGTERM, SIGUSR1, SIGUSR2, c_int, sigaction,
    sigemptyset, sighandler_t,
};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Host callback for `SIGUSR1` / `SIGUSR2`. Receives the signal number.
pub type UserSignalHandler = fn(i32);

const IGNORED: [c_int; 1] = [SIGCHLD];
const GRACEFUL: [c_int; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];
const FATAL: [c_int; 4] = [SIGILL, SIGABRT, SIGFPE, SIGSEGV];

// Bumped by every graceful-shutdown signal. Applications compare it against
// the value they saw at init.
static SHUTDOWN_REQUESTS: AtomicUsize = AtomicUsize::new(0);

// `UserSignalHandler` pointers for SIGUSR1 and SIGUSR2, 0 when unset.
static USER_HANDLERS: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

/// Installs the ignored, graceful-shutdown and fatal handlers.
pub(crate) fn install() -> Result<()> {
    for signal in IGNORED {
        install_action(signal, SIG_IGN, 0)?;
    }

    for signal in GRACEFUL {
        install_action(signal, on_shutdown_signal as sighandler_t, SA_RESTART)?;
    }

    for signal in FATAL {
        // Reset to the default action on entry so re-raising ends the process.
        install_action(
            signal,
            on_fatal_signal as sighandler_t,
            SA_RESETHAND | SA_NODEFER | SA_ONSTACK,
        )?;
    }

    log::debug!("Signal handlers installed");
    Ok(())
}

/// Installs `handler` for a user-defined signal. Only `SIGUSR1` and `SIGUSR2`
/// are accepted; anything else fails with [`ReactorError::InvalidArgument`].
pub fn set_signal_handler(signal: i32, handler: UserSignalHandler) -> Result<()> {
    let Some(slot) = user_slot(signal) else {
        log::error!("Refusing user handler for signal {}", signal);
        return Err(ReactorError::InvalidArgument(
            "only SIGUSR1 and SIGUSR2 accept user handlers",
        ));
    };

    USER_HANDLERS[slot].store(handler as usize, Ordering::SeqCst);
    install_action(signal, on_user_signal as sighandler_t, SA_RESTART)
}

pub(crate) fn shutdown_requests() -> usize {
    SHUTDOWN_REQUESTS.load(Ordering::SeqCst)
}

pub(crate) fn signal_name(signal: c_int) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        SIGQUIT => "SIGQUIT",
        SIGILL => "SIGILL",
        SIGABRT => "SIGABRT",
        SIGFPE => "SIGFPE",
        SIGSEGV => "SIGSEGV",
        SIGCHLD => "SIGCHLD",
        SIGUSR1 => "SIGUSR1",
        SIGUSR2 => "SIGUSR2",
        _ => "unknown signal",
    }
}

fn user_slot(signal: c_int) -> Option<usize> {
    match signal {
        SIGUSR1 => Some(0),
        SIGUSR2 => Some(1),
        _ => None,
    }
}

fn install_action(signal: c_int, handler: sighandler_t, flags: c_int) -> Result<()> {
    let mut action: sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler;
    action.sa_flags = flags;

    let res = unsafe {
        sigemptyset(&mut action.sa_mask);
        sigaction(signal, &action, ptr::null_mut())
    };

    if res < 0 {
        let source = io::Error::last_os_error();
        log::error!(
            "Failed to install handler for {}: {}",
            signal_name(signal),
            source
        );
        return Err(ReactorError::SignalRegistrationFailed { signal, source });
    }

    Ok(())
}

extern "C" fn on_shutdown_signal(signal: c_int) {
    log::logger().flush();
    log::warn!("Received {}, terminating", signal_name(signal));

    SHUTDOWN_REQUESTS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn on_fatal_signal(signal: c_int) {
    log::logger().flush();
    log::error!("Received fatal signal {}", signal_name(signal));

    let backtrace = Backtrace::force_capture();
    match backtrace.status() {
        BacktraceStatus::Captured => log::error!("Stack trace:\n{}", backtrace),
        _ => log::error!("No backtrace available"),
    }
    log::logger().flush();

    unsafe {
        libc::signal(signal, SIG_DFL);
        libc::raise(signal);
        libc::_exit(128 + signal);
    }
}

extern "C" fn on_user_signal(signal: c_int) {
    let Some(slot) = user_slot(signal) else {
        return;
    };

    let raw = USER_HANDLERS[slot].load(Ordering::SeqCst);
    if raw != 0 {
        let handler: UserSignalHandler = unsafe { mem::transmute::<usize, UserSignalHandler>(raw) };
        handler(signal);
    }
}
