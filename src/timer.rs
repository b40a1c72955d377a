//! Kernel-backed timers registered as ordinary events.
//!
//! A timer is an [`Event`] whose descriptor is a `timerfd` and whose extension
//! is a [`TimerProperties`] block. Expiry makes the descriptor readable; the
//! dispatcher then runs the timer's expiry logic:
//!
//! - the `on_expire` callback runs first,
//! - a timer the callback marked [`TimerState::Expired`], or a one-shot timer,
//!   is released,
//! - a repeating timer the callback stopped stays allocated but disarmed,
//! - a repeating timer is rearmed with its original duration.
//!
//! Rearming restarts the countdown from the moment of rearm, so repeating
//! timers drift by however long dispatch took.
//!
//! # Example
//! ```ignore
//! use tickloop::{Application, TimerProperties, timer};
//! use std::time::Duration;
//!
//! let mut app = Application::new()?;
//! let properties = TimerProperties::new(Duration::from_millis(100))
//!     .repeat(true)
//!     .on_expire(|_, _| {
//!         log::info!("tick");
//!         Ok(())
//!     });
//! let id = timer::init(app.registry()?, properties)?;
//! ```

use crate::error::{ReactorError, Result};
use crate::reactor::core::Registry;
use crate::reactor::event::{Event, EventId, Flow};

use libc::{
    CLOCK_MONOTONIC, TFD_CLOEXEC, TFD_NONBLOCK, itimerspec, read, timerfd_create, timerfd_gettime,
    timerfd_settime, timespec,
};
use std::fmt;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Callback run on every expiry, before rearm or release.
pub type ExpireFn = Box<dyn FnMut(&mut Event, &mut Registry) -> Result<()>>;

/// Callback run once, right before the timer is dropped.
pub type ReleasedFn = Box<dyn FnOnce()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
    /// Set by an expiry callback to have the timer released once it returns.
    Expired,
}

pub struct TimerProperties {
    duration: Duration,
    repeat: bool,
    state: TimerState,
    on_expire: Option<ExpireFn>,
    on_released: Option<ReleasedFn>,
}

impl TimerProperties {
    /// One-shot timer template that starts as soon as it is initialized.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            repeat: false,
            state: TimerState::Running,
            on_expire: None,
            on_released: None,
        }
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Keeps the timer disarmed after [`init`] until [`start`] is called.
    pub fn stopped(mut self) -> Self {
        self.state = TimerState::Stopped;
        self
    }

    pub fn on_expire<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Event, &mut Registry) -> Result<()> + 'static,
    {
        self.on_expire = Some(Box::new(callback));
        self
    }

    pub fn on_released<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.on_released = Some(Box::new(callback));
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// New duration, used from the next [`start`] or rearm on.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Requests release of the timer once the running expiry callback returns.
    pub fn expire(&mut self) {
        self.state = TimerState::Expired;
    }

    pub(crate) fn released(&mut self) {
        if let Some(callback) = self.on_released.take() {
            callback();
        }
    }
}

impl fmt::Debug for TimerProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerProperties")
            .field("duration", &self.duration)
            .field("repeat", &self.repeat)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Creates a kernel timer from `properties`, registers it and, unless the
/// template is [`TimerProperties::stopped`], starts it.
///
/// Nothing is leaked on failure: a timer that was registered but could not
/// be armed is released before the error is returned.
pub fn init(registry: &mut Registry, properties: TimerProperties) -> Result<EventId> {
    let fd = unsafe { timerfd_create(CLOCK_MONOTONIC, TFD_NONBLOCK | TFD_CLOEXEC) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        log::error!("Failed to create timer. Error: {}", err);
        return Err(ReactorError::TimerCreateFailed(err));
    }

    let descriptor = unsafe { OwnedFd::from_raw_fd(fd) };
    let start_now = properties.state != TimerState::Stopped;

    let mut event = Event::new(descriptor)
        .with_timer(properties)
        .on_trigger(on_timer_ready)
        .on_error(on_timer_error);

    if let Some(timer) = event.timer_mut() {
        timer.state = TimerState::Stopped;
    }

    let id = registry.register(event)?;

    if start_now {
        if let Err(err) = registry.start_timer(id) {
            registry.release(id);
            return Err(err);
        }
    }

    Ok(id)
}

/// Arms the timer with its stored duration. Restarts the countdown of a
/// timer that is already running.
pub fn start(event: &mut Event) -> Result<()> {
    let fd = event.fd();
    let timer = event
        .timer_mut()
        .ok_or(ReactorError::InvalidArgument("event is not a timer"))?;

    // A zero it_value disarms a timerfd, so a zero duration fires on the next tick.
    let duration = if timer.duration.is_zero() {
        Duration::from_nanos(1)
    } else {
        timer.duration
    };

    set_time(fd, duration).map_err(|err| {
        log::error!("Failed to arm timer (fd {}): {}", fd, err);
        ReactorError::TimerArmFailed(err)
    })?;

    timer.state = TimerState::Running;
    Ok(())
}

/// Disarms the timer and marks it stopped. Calling it again is harmless.
pub fn stop(event: &mut Event) {
    let fd = event.fd();
    let Some(timer) = event.timer_mut() else {
        log::warn!("Ignoring stop of fd {}: not a timer", fd);
        return;
    };

    if let Err(err) = set_time(fd, Duration::ZERO) {
        log::warn!("Failed to disarm timer (fd {}): {}", fd, err);
    }

    timer.state = TimerState::Stopped;
}

/// Unregisters the timer, closes its descriptor, runs `on_released` and
/// frees it. Unknown or already released ids are ignored.
pub fn release(registry: &mut Registry, id: EventId) {
    registry.release(id);
}

/// Reads the kernel timer back and reports whether it is armed.
pub fn is_armed(event: &Event) -> Result<bool> {
    if event.timer().is_none() {
        return Err(ReactorError::InvalidArgument("event is not a timer"));
    }

    let mut spec = disarmed();
    let res = unsafe { timerfd_gettime(event.fd(), &mut spec) };
    if res < 0 {
        return Err(ReactorError::TimerArmFailed(io::Error::last_os_error()));
    }

    Ok(spec.it_value.tv_sec != 0 || spec.it_value.tv_nsec != 0)
}

impl Registry {
    /// [`start`] for a registered timer.
    pub fn start_timer(&mut self, id: EventId) -> Result<()> {
        let event = self
            .get_mut(id)
            .ok_or(ReactorError::InvalidArgument("unknown timer"))?;

        start(event)
    }

    /// [`stop`] for a registered timer. Unknown ids are ignored.
    pub fn stop_timer(&mut self, id: EventId) {
        if let Some(event) = self.get_mut(id) {
            stop(event);
        }
    }

    pub fn timer_state(&self, id: EventId) -> Option<TimerState> {
        self.get(id)?.timer().map(TimerProperties::state)
    }
}

fn on_timer_ready(event: &mut Event, registry: &mut Registry) -> Result<Flow> {
    drain(event.fd());

    let Some(timer) = event.timer_mut() else {
        return Err(ReactorError::InvalidArgument("event is not a timer"));
    };

    match timer.state {
        TimerState::Running => {}
        TimerState::Expired => return Ok(Flow::Release),
        // Stale readiness from before a stop.
        TimerState::Stopped => return Ok(Flow::Keep),
    }

    if let Some(mut callback) = timer.on_expire.take() {
        let result = callback(event, registry);

        if let Some(timer) = event.timer_mut() {
            if timer.on_expire.is_none() {
                timer.on_expire = Some(callback);
            }
        }

        result?;
    }

    let Some(timer) = event.timer_mut() else {
        return Err(ReactorError::InvalidArgument("event is not a timer"));
    };

    if !timer.repeat {
        timer.state = TimerState::Stopped;
        return Ok(Flow::Release);
    }

    let state = timer.state;
    match state {
        TimerState::Expired => Ok(Flow::Release),
        // Paused by the callback; stays allocated until started again.
        TimerState::Stopped => Ok(Flow::Keep),
        TimerState::Running => {
            // Rearm failure releases the timer and reports through dispatch.
            start(event)?;
            Ok(Flow::Keep)
        }
    }
}

fn on_timer_error(event: &mut Event, _registry: &mut Registry) -> Result<Flow> {
    log::error!("Timer error (fd {})", event.fd());
    Ok(Flow::Release)
}

// Clears the expiration counter so the descriptor stops polling readable.
fn drain(fd: RawFd) {
    let mut expirations = 0u64;
    let res = unsafe {
        read(
            fd,
            &mut expirations as *mut u64 as *mut libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };

    if res < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock {
            log::warn!("Failed to read timer (fd {}): {}", fd, err);
        }
    }
}

fn set_time(fd: RawFd, duration: Duration) -> io::Result<()> {
    let mut spec = disarmed();
    spec.it_value = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    let res = unsafe { timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn disarmed() -> itimerspec {
    itimerspec {
        it_interval: timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
        it_value: timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
    }
}
