//! Single-threaded event loop for Linux hosts.
//!
//! This crate multiplexes readable descriptors, kernel timers and OS signals
//! into one dispatch step that the host calls repeatedly.
//!
//! # Architecture
//!
//! - **Application**: owns the readiness facility, timing and the terminate flag
//! - **ApplicationBuilder**: fluent configuration of the application
//! - **Registry**: registers events and dispatches their callbacks
//! - **Event**: a descriptor with trigger/error callbacks and a payload
//! - **timer**: `timerfd`-backed one-shot and repeating timers
//! - **signal**: shutdown, fatal, ignored and user-defined signal handling
//! - **time**: wall-clock source and per-update delta time

#[cfg(not(target_os = "linux"))]
compile_error!("tickloop relies on epoll and timerfd and only builds on Linux");

mod app;
mod builder;
mod error;
mod reactor;
pub mod signal;
pub mod time;
pub mod timer;
mod utils;

pub use app::{Application, LoopErrorHandler, TerminateHandle, UpdateStatus, Version, version};
pub use builder::ApplicationBuilder;
pub use error::{ReactorError, Result};
pub use reactor::core::{EventFailure, Registry};
pub use reactor::event::{Callback, Event, EventId, Extension, Flow};
pub use signal::{UserSignalHandler, set_signal_handler};
pub use timer::{TimerProperties, TimerState};
