//! Virtual single-contact touchscreen fed by legacy singletouch reports.

use evdevil::event::{Abs, InputEvent, Key};
use evdevil::uinput::{AbsSetup, UinputDevice};
use evdevil::{AbsInfo, Bus, InputId, InputProp};

use crate::config::Config;
use crate::ipts::{ObserverResult, SingletouchData, MAX_X, MAX_Y, SINGLETOUCH_MAX_VALUE};

use super::{abs_event, key_event, resolution, syn_event};

pub struct TouchDevice {
    device: UinputDevice,
    touching: bool,
}

impl TouchDevice {
    pub fn create(config: &Config) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let axes = [
            AbsSetup::new(
                Abs::X,
                AbsInfo::new(0, MAX_X).with_resolution(resolution(MAX_X, config.width)),
            ),
            AbsSetup::new(
                Abs::Y,
                AbsInfo::new(0, MAX_Y).with_resolution(resolution(MAX_Y, config.height)),
            ),
        ];

        let device = UinputDevice::builder()?
            .with_input_id(InputId::new(Bus::VIRTUAL, 0x045e, 0x0002, 0))?
            .with_props([InputProp::DIRECT])?
            .with_abs_axes(axes)?
            .with_keys([Key::BTN_TOUCH])?
            .build("IPTS Touch")?;

        if let Ok(name) = device.sysname() {
            log::info!(
                "Touch device ready: /sys/devices/virtual/input/{}",
                name.to_string_lossy()
            );
        }

        Ok(Self { device, touching: false })
    }

    pub fn emit(&mut self, data: &SingletouchData) -> ObserverResult {
        let mut batch: Vec<InputEvent> = Vec::with_capacity(4);

        if data.touch {
            batch.push(abs_event(Abs::X, scale(data.x, MAX_X)));
            batch.push(abs_event(Abs::Y, scale(data.y, MAX_Y)));
        }
        if data.touch != self.touching {
            batch.push(key_event(Key::BTN_TOUCH, data.touch));
            self.touching = data.touch;
        }

        batch.push(syn_event());
        self.device.write(&batch)?;
        Ok(())
    }
}

/// Map a 15-bit device coordinate into the shared coordinate space.
fn scale(value: u16, max: i32) -> i32 {
    i32::from(value) * max / SINGLETOUCH_MAX_VALUE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_maps_device_range_onto_shared_space() {
        assert_eq!(scale(0, MAX_X), 0);
        assert_eq!(scale(1 << 14, MAX_X), MAX_X / 2);
        assert_eq!(scale(1 << 14, MAX_Y), MAX_Y / 2);
    }

    #[test]
    fn scale_never_leaves_the_axis_range() {
        for value in [0u16, 1, 1 << 10, 1 << 14, (1 << 15) - 1] {
            let x = scale(value, MAX_X);
            let y = scale(value, MAX_Y);
            assert!((0..=MAX_X).contains(&x), "value={} x={}", value, x);
            assert!((0..=MAX_Y).contains(&y), "value={} y={}", value, y);
        }
    }
}
