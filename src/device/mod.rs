mod ithc;
mod mei;

use std::path::Path;

pub use ithc::ITHC;
pub use mei::MEI;

use crate::ipts::Protocol;

/// Interface-specific parameters of the touch controller.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub name: &'static str,

    /// Default character device node.
    pub device: &'static str,

    /// Frame grammar this interface speaks.
    pub protocol: Protocol,

    /// Size of one report buffer.
    pub buffer_size: usize,
}

impl DeviceProfile {
    /// Pick a profile for this machine by probing the known device nodes.
    /// Newer controllers expose the ITHC node; everything else falls back
    /// to the doorbell interface.
    pub fn detect() -> &'static Self {
        if Path::new(ITHC.device).exists() {
            &ITHC
        } else {
            &MEI
        }
    }
}
