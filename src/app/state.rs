//! State shared between the update thread, foreign threads and signal handlers.

use crate::signal;
use crate::time::Clock;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub(crate) struct Fields {
    pub(crate) clock: Clock,
    pub(crate) terminating: bool,
}

#[derive(Debug)]
pub(crate) struct Shared {
    fields: Mutex<Fields>,
    // Shutdown-signal count observed at init; any later signal means terminate.
    signals_seen: usize,
}

impl Shared {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            fields: Mutex::new(Fields {
                clock,
                terminating: false,
            }),
            signals_seen: signal::shutdown_requests(),
        }
    }

    // Fields are plain scalars, a panic mid-update cannot leave them torn.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Fields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn terminate(&self) {
        self.lock().terminating = true;
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.lock().terminating || signal::shutdown_requests() != self.signals_seen
    }
}

/// Cloneable handle for requesting termination from other threads or from
/// event callbacks.
#[derive(Clone, Debug)]
pub struct TerminateHandle {
    pub(crate) shared: Arc<Shared>,
}

impl TerminateHandle {
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    pub fn is_terminating(&self) -> bool {
        self.shared.is_terminating()
    }
}
