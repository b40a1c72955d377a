//! Event registry built on the kernel readiness facility.
//!
//! - [`core`]: the registry and the dispatcher
//! - [`event`]: the event record and its callbacks
//! - [`poller`]: the epoll backend

pub mod core;
pub mod event;
pub(crate) mod poller;
