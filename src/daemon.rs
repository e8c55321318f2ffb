//! Main daemon loop: stream reports from the controller into the parser and
//! feed the decoded input to virtual devices.

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use crate::config::Config;
use crate::device::DeviceProfile;
use crate::ipts::{ParseError, Parser};
use crate::output::{StylusDevice, TouchDevice};

/// Give up after this many parse failures in a row; a healthy stream
/// recovers immediately.
const MAX_ERROR_STREAK: u32 = 50;

pub fn run(
    config: &Config,
    profile: &DeviceProfile,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    log::info!("Opening {}", config.device);
    let mut file = File::open(&config.device)?;

    let mut stylus = StylusDevice::create(config)?;
    let mut touch = TouchDevice::create(config)?;

    let mut parser = Parser::new(config.protocol, config.invert_x, config.invert_y);
    parser.on_stylus = Some(Box::new(move |data| stylus.emit(data)));
    parser.on_singletouch = Some(Box::new(move |data| touch.emit(data)));
    parser.on_metadata = Some(Box::new(|meta| {
        log::info!(
            "Device metadata: {}x{} cells, {}x{} units",
            meta.columns,
            meta.rows,
            meta.width,
            meta.height
        );
        Ok(())
    }));
    // Heatmap contact extraction lives in a downstream consumer; nothing is
    // wired to on_heatmap here.

    let mut buf = vec![0u8; profile.buffer_size];
    let mut streak: u32 = 0;
    let mut reports: u64 = 0;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }

        match parser.parse(&buf[..n]) {
            Ok(()) => {
                streak = 0;
                if reports == 0 {
                    log::info!("Reports flowing");
                }
                reports += 1;
                if reports.is_multiple_of(5000) {
                    log::debug!("Reports parsed: {}", reports);
                }
            }
            Err(err @ ParseError::Truncated { .. }) => {
                streak += 1;
                log::warn!("Failed to parse report: {}", err);
                if streak >= MAX_ERROR_STREAK {
                    return Err(
                        format!("{} consecutive parse failures, giving up", streak).into()
                    );
                }
            }
            Err(ParseError::Observer(err)) => return Err(err),
        }
    }
}
