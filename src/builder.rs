//! Fluent builder for Application construction.
//!
//! Collects the loop configuration before the application installs its
//! signal handlers and opens the readiness facility.

use crate::app::{Application, Config, LoopErrorHandler};
use crate::error::Result;

use std::any::Any;
use std::time::Duration;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);
const DEFAULT_MAX_EVENTS: usize = 64;

/// Builder for constructing Application instances with fluent API.
///
/// # Example
/// ```ignore
/// let app = ApplicationBuilder::new()
///     .poll_timeout(Duration::from_millis(20))
///     .build()?;
/// ```
pub struct ApplicationBuilder {
    poll_timeout: Duration,
    max_events: usize,
    install_signals: bool,
    loop_error_handler: Option<LoopErrorHandler>,
    extension: Option<Box<dyn Any>>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Creates a builder with a 10 ms poll timeout, 64 events per update and
    /// signal handling enabled.
    pub fn new() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_events: DEFAULT_MAX_EVENTS,
            install_signals: true,
            loop_error_handler: None,
            extension: None,
        }
    }

    /// Upper bound on how long a single update waits for readiness.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Number of readiness notifications drained per update. Clamped to 1.
    pub fn max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Whether to install the process signal handlers at build time.
    pub fn install_signals(mut self, install: bool) -> Self {
        self.install_signals = install;
        self
    }

    /// Hook consulted when a poll is interrupted by a signal.
    pub fn loop_error_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.loop_error_handler = Some(Box::new(handler));
        self
    }

    /// Opaque host data carried by the application.
    pub fn extension<T: Any>(mut self, extension: T) -> Self {
        self.extension = Some(Box::new(extension));
        self
    }

    /// Builds the application.
    ///
    /// # Errors
    /// Fails if a signal handler cannot be installed or the readiness
    /// facility cannot be created. The host should exit in that case.
    pub fn build(self) -> Result<Application> {
        Application::with_config(Config {
            poll_timeout: self.poll_timeout,
            max_events: self.max_events,
            install_signals: self.install_signals,
            loop_error_handler: self.loop_error_handler,
            extension: self.extension,
        })
    }
}
