//! Kernel readiness facility backends. Only epoll is implemented.

mod epoll;

pub(crate) use epoll::{EpollPoller as Poller, Readiness};
