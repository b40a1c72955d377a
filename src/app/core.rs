//! The application object: owns the readiness facility, the timing state and
//! the termination flag, and advances everything one step per [`update`].
//!
//! The host drives the loop:
//!
//! ```ignore
//! let mut app = Application::new()?;
//! while !app.is_terminating() {
//!     app.update()?;
//! }
//! app.release();
//! ```
//!
//! [`update`]: Application::update

use crate::app::state::{Shared, TerminateHandle};
use crate::builder::ApplicationBuilder;
use crate::error::{ReactorError, Result};
use crate::reactor::core::{EventFailure, Registry};
use crate::signal;
use crate::time::{self, Clock};

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Hook consulted when a poll is interrupted by a signal. `Ok` keeps the loop
/// going, an error turns the interruption into a poll failure.
pub type LoopErrorHandler = Box<dyn FnMut() -> Result<()>>;

/// Outcome of a successful [`Application::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Ready events were dispatched.
    Ok,
    /// Nothing was ready, or an interrupted poll was recovered. Call again.
    Waiting,
}

pub(crate) struct Config {
    pub(crate) poll_timeout: Duration,
    pub(crate) max_events: usize,
    pub(crate) install_signals: bool,
    pub(crate) loop_error_handler: Option<LoopErrorHandler>,
    pub(crate) extension: Option<Box<dyn Any>>,
}

pub struct Application {
    shared: Arc<Shared>,
    registry: Option<Registry>,
    loop_error_handler: Option<LoopErrorHandler>,
    poll_timeout: Duration,
    extension: Option<Box<dyn Any>>,
}

impl Application {
    /// Builds an application with the default configuration.
    ///
    /// An error means the host should exit right away; no partially built
    /// application is ever returned.
    pub fn new() -> Result<Self> {
        ApplicationBuilder::new().build()
    }

    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub(crate) fn with_config(config: Config) -> Result<Self> {
        let clock = Clock::starting_at(time::system_time());

        if config.install_signals {
            signal::install()?;
        }

        let shared = Arc::new(Shared::new(clock));

        let registry = Registry::new(config.max_events).map_err(|err| {
            log::error!("Failed to create epoll instance: {}", err);
            ReactorError::PollFailed(err)
        })?;

        log::debug!(
            "Application initialized (poll timeout {:?}, {} events per update)",
            config.poll_timeout,
            config.max_events
        );

        Ok(Self {
            shared,
            registry: Some(registry),
            loop_error_handler: config.loop_error_handler,
            poll_timeout: config.poll_timeout,
            extension: config.extension,
        })
    }

    /// Advances time, waits up to the poll timeout for ready descriptors and
    /// dispatches them.
    ///
    /// An interrupted poll is reported as [`UpdateStatus::Waiting`] unless the
    /// loop error handler rejects it. Any other poll failure is an error.
    pub fn update(&mut self) -> Result<UpdateStatus> {
        self.shared.lock().clock.advance(time::system_time());

        let registry = self.registry.as_mut().ok_or(ReactorError::Uninitialized)?;

        match registry.poll(self.poll_timeout) {
            Ok(0) => Ok(UpdateStatus::Waiting),
            Ok(_) => {
                let dispatched = registry.dispatch();
                log::trace!("Dispatched {} events", dispatched);
                Ok(UpdateStatus::Ok)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => self.recover(err),
            Err(err) => {
                log::error!("Failed to wait for events: {}", err);
                Err(ReactorError::PollFailed(err))
            }
        }
    }

    fn recover(&mut self, err: io::Error) -> Result<UpdateStatus> {
        let Some(handler) = self.loop_error_handler.as_mut() else {
            log::warn!("Waiting for events interrupted: {}", err);
            return Ok(UpdateStatus::Waiting);
        };

        match handler() {
            Ok(()) => Ok(UpdateStatus::Waiting),
            Err(reason) => {
                log::error!("Loop error handler rejected interrupted poll: {}", reason);
                Err(ReactorError::PollFailed(err))
            }
        }
    }

    /// The registry events and timers are registered with.
    pub fn registry(&mut self) -> Result<&mut Registry> {
        self.registry.as_mut().ok_or(ReactorError::Uninitialized)
    }

    /// Installs or removes the interrupted-poll hook.
    pub fn set_loop_error_handler<F>(&mut self, handler: Option<F>)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.loop_error_handler = handler.map(|handler| Box::new(handler) as LoopErrorHandler);
    }

    /// Seconds accumulated since init.
    pub fn app_time(&self) -> f64 {
        self.shared.lock().clock.time_app
    }

    /// Seconds between the two most recent updates.
    pub fn dt(&self) -> f64 {
        self.shared.lock().clock.dt
    }

    /// Wall-clock time observed by the last update.
    pub fn system_time(&self) -> f64 {
        self.shared.lock().clock.time_system
    }

    /// Requests termination. The host stops calling [`update`](Self::update)
    /// once [`is_terminating`](Self::is_terminating) turns true.
    pub fn terminate(&self) {
        log::info!("Termination requested");
        self.shared.terminate();
    }

    /// True after [`terminate`](Self::terminate) or a graceful-shutdown signal.
    pub fn is_terminating(&self) -> bool {
        self.shared.is_terminating()
    }

    pub fn terminate_handle(&self) -> TerminateHandle {
        TerminateHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extension.as_ref()?.downcast_ref()
    }

    pub fn extension_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.extension.as_mut()?.downcast_mut()
    }

    /// Drains the per-event failures collected by dispatch.
    pub fn take_event_failures(&mut self) -> Vec<EventFailure> {
        self.registry
            .as_mut()
            .map(Registry::take_failures)
            .unwrap_or_default()
    }

    /// Releases every registered event and closes the readiness facility.
    /// Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(registry) = self.registry.take() {
            log::debug!("Releasing application ({} events left)", registry.len());
            drop(registry);
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.release();
    }
}
