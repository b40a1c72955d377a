//! Error taxonomy shared by every subsystem of the loop.
//!
//! OS-level failures keep the originating [`std::io::Error`] as their source so
//! the host can log the exact `errno` that caused them.

use std::io;
use thiserror::Error;

/// Errors produced by the application core, the event registry, the timer
/// subsystem and the signal subsystem.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReactorError {
    /// Bad input from the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Allocation failed while building an event or timer.
    #[error("out of memory while {0}")]
    OutOfMemory(&'static str),

    /// The readiness facility rejected a descriptor.
    #[error("failed to register descriptor {fd}")]
    RegistrationFailed {
        fd: i32,
        #[source]
        source: io::Error,
    },

    /// The kernel refused to create a timer descriptor.
    #[error("failed to create timer")]
    TimerCreateFailed(#[source] io::Error),

    /// The kernel refused to arm or disarm a timer.
    #[error("failed to arm timer")]
    TimerArmFailed(#[source] io::Error),

    /// Waiting on the readiness facility failed and was not recovered.
    #[error("failed to poll for events")]
    PollFailed(#[source] io::Error),

    /// An OS signal handler could not be installed.
    #[error("failed to install handler for signal {signal}")]
    SignalRegistrationFailed {
        signal: i32,
        #[source]
        source: io::Error,
    },

    /// The application was released, or its readiness facility never came up.
    #[error("application is not initialized")]
    Uninitialized,

    /// A registered descriptor reported an error condition.
    #[error("event on descriptor {fd} reported an error condition")]
    EventFailed { fd: i32 },
}

impl ReactorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReactorError::InvalidArgument(_) => "invalid_argument",
            ReactorError::OutOfMemory(_) => "out_of_memory",
            ReactorError::RegistrationFailed { .. } => "registration_failed",
            ReactorError::TimerCreateFailed(_) => "timer_create_failed",
            ReactorError::TimerArmFailed(_) => "timer_arm_failed",
            ReactorError::PollFailed(_) => "poll_failed",
            ReactorError::SignalRegistrationFailed { .. } => "signal_registration_failed",
            ReactorError::Uninitialized => "uninitialized",
            ReactorError::EventFailed { .. } => "event_failed",
        }
    }

    /// Returns true for a poll that failed only because a signal interrupted it.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ReactorError::PollFailed(err) if err.kind() == io::ErrorKind::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, ReactorError>;
