use crate::error::{ReactorError, Result};
use crate::reactor::event::{Event, EventId, Flow};
use crate::reactor::poller::{Poller, Readiness};
use crate::utils::slab::{Key, Removed, Slab};

use std::io;
use std::time::Duration;

/// A per-event failure reported by dispatch. The loop keeps running.
#[derive(Debug)]
pub struct EventFailure {
    pub id: EventId,
    pub error: ReactorError,
}

/// Owns the readiness facility and every event registered with it.
pub struct Registry {
    poller: Poller,
    events: Slab<Event>,
    ready: Vec<Readiness>,
    failures: Vec<EventFailure>,
}

impl Registry {
    pub(crate) fn new(max_events: usize) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new(max_events)?,
            events: Slab::new(max_events),
            ready: Vec::with_capacity(max_events),
            failures: Vec::new(),
        })
    }

    /// Adds the event's descriptor to the readiness facility for readable
    /// interest. The registry owns the event until it is released.
    ///
    /// On failure the event is dropped, which closes its descriptor, and the
    /// registry is left as it was.
    pub fn register(&mut self, event: Event) -> Result<EventId> {
        let fd = event.fd();
        if fd < 0 {
            return Err(ReactorError::InvalidArgument("event has no descriptor"));
        }

        // The token handed to the kernel is the slot key, so the slot comes first.
        let key = self
            .events
            .insert(event)
            .map_err(|_| ReactorError::OutOfMemory("registering event"))?;
        let id = EventId(key.to_token());

        if let Err(source) = self.poller.register(fd, key.to_token()) {
            drop(self.events.remove(key));
            log::error!("Failed to register fd {}: {}", fd, source);
            return Err(ReactorError::RegistrationFailed { fd, source });
        }

        if let Some(event) = self.events.get_mut(key) {
            event.id = Some(id);
        }

        log::debug!("Registered fd {} as {:?}", fd, id);
        Ok(id)
    }

    /// Removes the event from the readiness facility and hands it back to the
    /// caller. Unknown ids are ignored.
    ///
    /// An event whose own callback is running cannot be handed back; it is
    /// released as soon as the callback returns and `None` is returned.
    pub fn unregister(&mut self, id: EventId) -> Option<Event> {
        match self.events.remove(Key::from_token(id.0)) {
            Removed::Value(mut event) => {
                self.poller.deregister(event.fd());
                event.id = None;
                Some(event)
            }
            Removed::Taken | Removed::Missing => None,
        }
    }

    /// Unregisters the event, closes its descriptor and drops it.
    pub fn release(&mut self, id: EventId) {
        drop(self.unregister(id));
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.events.get(Key::from_token(id.0)).is_some()
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(Key::from_token(id.0))
    }

    /// Borrows a registered event. The event whose callback is running is
    /// not reachable here; it is passed to the callback directly.
    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(Key::from_token(id.0))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.len() == 0
    }

    pub(crate) fn take_failures(&mut self) -> Vec<EventFailure> {
        std::mem::take(&mut self.failures)
    }

    pub(crate) fn poll(&mut self, timeout: Duration) -> io::Result<usize> {
        self.ready.clear();
        self.poller.wait(&mut self.ready, timeout)
    }

    /// Runs the callbacks of everything the last `poll` reported ready.
    /// Returns the number of events dispatched.
    pub(crate) fn dispatch(&mut self) -> usize {
        let mut ready = std::mem::take(&mut self.ready);
        let mut dispatched = 0;

        for readiness in ready.iter() {
            let key = Key::from_token(readiness.token);

            // Released by an earlier callback in this batch.
            let Some(mut event) = self.events.take(key) else {
                continue;
            };

            let id = EventId(readiness.token);
            let fd = event.fd();
            dispatched += 1;

            // Readable data wins over a hangup so the callback can read to EOF;
            // the hangup alone is reported on the next poll.
            let outcome = if readiness.error || (readiness.hangup && !readiness.readable) {
                log::warn!("Event {:?} (fd {}) reported an error condition", id, fd);
                self.failures.push(EventFailure {
                    id,
                    error: ReactorError::EventFailed { fd },
                });
                event.fail(self)
            } else if readiness.readable {
                event.trigger(self)
            } else {
                Ok(Flow::Keep)
            };

            let flow = match outcome {
                Ok(flow) => flow,
                Err(error) => {
                    log::warn!("Event {:?} (fd {}) failed: {}", id, fd, error);
                    self.failures.push(EventFailure { id, error });
                    Flow::Release
                }
            };

            match flow {
                Flow::Keep => {
                    if let Err(event) = self.events.restore(key, event) {
                        self.retire(event);
                    }
                }
                Flow::Release => {
                    let _ = self.events.remove(key);
                    self.retire(event);
                }
            }
        }

        ready.clear();
        self.ready = ready;

        dispatched
    }

    fn retire(&self, event: Event) {
        self.poller.deregister(event.fd());
        log::debug!("Released event {:?} (fd {})", event.id(), event.fd());
        drop(event);
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for event in self.events.drain() {
            self.retire(event);
        }
    }
}
