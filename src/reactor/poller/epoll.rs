use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLHUP, EPOLLIN, epoll_create1,
    epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

/// One readiness notification copied out of the kernel buffer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Readiness {
    pub(crate) token: u64,
    pub(crate) readable: bool,
    /// Peer closed. Buffered data may still be readable.
    pub(crate) hangup: bool,
    pub(crate) error: bool,
}

pub(crate) struct EpollPoller {
    epoll: OwnedFd,
    events: Vec<epoll_event>,
}

impl EpollPoller {
    pub(crate) fn new(max_events: usize) -> io::Result<Self> {
        let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };
        let events = vec![epoll_event { events: 0, u64: 0 }; max_events.max(1)];

        Ok(EpollPoller { epoll, events })
    }

    pub(crate) fn register(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: token,
        };

        let res = unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_ADD, fd, &mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Removes `fd` from the interest list. Unknown descriptors are ignored.
    pub(crate) fn deregister(&self, fd: RawFd) {
        let res = unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, ptr::null_mut()) };

        if res < 0 {
            log::trace!(
                "epoll deregister of fd {} ignored: {}",
                fd,
                io::Error::last_os_error()
            );
        }
    }

    /// Waits up to `timeout` and appends what became ready to `ready`.
    pub(crate) fn wait(
        &mut self,
        ready: &mut Vec<Readiness>,
        timeout: Duration,
    ) -> io::Result<usize> {
        // Rounded up so a sub-millisecond timeout still blocks.
        let timeout_ms = timeout.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32;

        let n_events = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };

        if n_events < 0 {
            return Err(io::Error::last_os_error());
        }

        for event in self.events.iter().take(n_events as usize) {
            let flags = event.events;
            ready.push(Readiness {
                token: event.u64,
                readable: flags & EPOLLIN as u32 != 0,
                hangup: flags & EPOLLHUP as u32 != 0,
                error: flags & EPOLLERR as u32 != 0,
            });
        }

        Ok(n_events as usize)
    }
}
