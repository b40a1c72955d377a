//! The event record: a descriptor paired with its callbacks and payload.

use crate::error::Result;
use crate::reactor::core::Registry;
use crate::timer::TimerProperties;

use std::any::Any;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Identifies a registered event. Ids are never reused for a different event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) u64);

/// What the dispatcher should do with an event after its callback returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Leave the event registered.
    Keep,
    /// Unregister the event, close its descriptor and drop it.
    Release,
}

/// Trigger and error callback.
///
/// Receives the event being dispatched and the registry it belongs to, so it
/// may register new events or release other ones while it runs.
pub type Callback = Box<dyn FnMut(&mut Event, &mut Registry) -> Result<Flow>>;

/// Payload carried by an event. Exactly one variant is active.
pub enum Extension {
    /// Opaque host data.
    Data(Box<dyn Any>),
    /// Timer state, owned by the timer subsystem.
    Timer(TimerProperties),
}

pub struct Event {
    pub(crate) id: Option<EventId>,
    // `None` only while the event is being dropped.
    descriptor: Option<OwnedFd>,
    pub(crate) on_trigger: Option<Callback>,
    pub(crate) on_error: Option<Callback>,
    pub(crate) extension: Extension,
}

impl Event {
    /// Creates an event watching `descriptor` for readability. The event owns
    /// the descriptor and closes it when dropped.
    pub fn new(descriptor: OwnedFd) -> Self {
        Self {
            id: None,
            descriptor: Some(descriptor),
            on_trigger: None,
            on_error: None,
            extension: Extension::Data(Box::new(())),
        }
    }

    pub fn on_trigger<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Event, &mut Registry) -> Result<Flow> + 'static,
    {
        self.on_trigger = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Event, &mut Registry) -> Result<Flow> + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn with_data<T: Any>(mut self, data: T) -> Self {
        self.extension = Extension::Data(Box::new(data));
        self
    }

    pub(crate) fn with_timer(mut self, properties: TimerProperties) -> Self {
        self.extension = Extension::Timer(properties);
        self
    }

    /// Id assigned by [`Registry::register`], `None` before registration.
    pub fn id(&self) -> Option<EventId> {
        self.id
    }

    pub fn fd(&self) -> RawFd {
        self.descriptor.as_ref().map_or(-1, |fd| fd.as_raw_fd())
    }

    pub fn extension(&self) -> &Extension {
        &self.extension
    }

    pub fn data<T: Any>(&self) -> Option<&T> {
        match &self.extension {
            Extension::Data(data) => data.downcast_ref(),
            Extension::Timer(_) => None,
        }
    }

    pub fn data_mut<T: Any>(&mut self) -> Option<&mut T> {
        match &mut self.extension {
            Extension::Data(data) => data.downcast_mut(),
            Extension::Timer(_) => None,
        }
    }

    pub fn timer(&self) -> Option<&TimerProperties> {
        match &self.extension {
            Extension::Timer(timer) => Some(timer),
            Extension::Data(_) => None,
        }
    }

    pub fn timer_mut(&mut self) -> Option<&mut TimerProperties> {
        match &mut self.extension {
            Extension::Timer(timer) => Some(timer),
            Extension::Data(_) => None,
        }
    }

    pub(crate) fn trigger(&mut self, registry: &mut Registry) -> Result<Flow> {
        let Some(mut callback) = self.on_trigger.take() else {
            return Ok(Flow::Keep);
        };

        let flow = callback(self, registry);
        if self.on_trigger.is_none() {
            self.on_trigger = Some(callback);
        }

        flow
    }

    /// Runs the error callback. Without one the event is released.
    pub(crate) fn fail(&mut self, registry: &mut Registry) -> Result<Flow> {
        let Some(mut callback) = self.on_error.take() else {
            return Ok(Flow::Release);
        };

        let flow = callback(self, registry);
        if self.on_error.is_none() {
            self.on_error = Some(callback);
        }

        flow
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // Descriptor goes first, then the timer's release hook.
        drop(self.descriptor.take());

        if let Extension::Timer(timer) = &mut self.extension {
            timer.released();
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("fd", &self.fd())
            .field("timer", &self.timer().map(|timer| timer.state()))
            .finish()
    }
}
