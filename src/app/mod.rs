//! Application subsystem modules.

mod core;
mod state;

pub use self::core::{Application, LoopErrorHandler, UpdateStatus};
pub(crate) use self::core::Config;
pub use state::TerminateHandle;

/// Library version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// `major << 16 | minor << 8 | patch`
    pub packed: u32,
}

pub fn version() -> Version {
    let major = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    let patch = env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0);

    Version {
        major,
        minor,
        patch,
        packed: u32::from(major) << 16 | u32::from(minor) << 8 | u32::from(patch),
    }
}
