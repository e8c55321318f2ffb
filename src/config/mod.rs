mod cli;
mod file;

pub use cli::{Cli, Command};

use crate::device::DeviceProfile;
use crate::ipts::Protocol;

// Surface-class panels are roughly 12"; used when neither CLI nor file
// provide a display size.
const DEFAULT_WIDTH: u32 = 260;
const DEFAULT_HEIGHT: u32 = 195;

/// Merged configuration from CLI args and TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub device: String,
    pub protocol: Protocol,
    pub invert_x: bool,
    pub invert_y: bool,
    /// Display size in millimetres.
    pub width: u32,
    pub height: u32,
}

impl Config {
    /// Load configuration by merging the TOML file with CLI overrides; the
    /// device profile fills whatever is left.
    pub fn load(cli: &Cli, profile: &DeviceProfile) -> Self {
        let file_config = cli
            .config
            .as_ref()
            .and_then(|p| file::load_from_path(p))
            .or_else(file::load_from_default_paths)
            .unwrap_or_default();

        Self {
            device: cli
                .device
                .clone()
                .unwrap_or_else(|| file_config.device.unwrap_or(profile.device.into())),
            protocol: cli.protocol.or(file_config.protocol).unwrap_or(profile.protocol),
            invert_x: cli.invert_x || file_config.invert_x,
            invert_y: cli.invert_y || file_config.invert_y,
            width: cli.width.or(file_config.width).unwrap_or(DEFAULT_WIDTH),
            height: cli.height.or(file_config.height).unwrap_or(DEFAULT_HEIGHT),
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.width == 0 || self.height == 0 {
            return Err("Display size must not be zero");
        }
        Ok(())
    }
}
