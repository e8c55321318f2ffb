//! Virtual pen tablet fed by decoded stylus samples.

use std::f64::consts::FRAC_PI_4;

use evdevil::event::{Abs, InputEvent, Key};
use evdevil::uinput::{AbsSetup, UinputDevice};
use evdevil::{AbsInfo, Bus, InputId, InputProp};

use crate::config::Config;
use crate::ipts::{ObserverResult, StylusData, MAX_PRESSURE, MAX_X, MAX_Y};

use super::{abs_event, key_event, resolution, syn_event};

/// Tilt range in hundredths of a degree.
const TILT_RANGE: i32 = 9000;
/// Tilt resolution is units per radian: 18000 / pi.
const TILT_RESOLUTION: i32 = 5730;

pub struct StylusDevice {
    device: UinputDevice,
    proximity_pen: bool,
    proximity_rubber: bool,
    contact: bool,
    button: bool,
}

impl StylusDevice {
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
            AbsSetup::new(Abs::PRESSURE, AbsInfo::new(0, MAX_PRESSURE)),
            AbsSetup::new(
                Abs::TILT_X,
                AbsInfo::new(-TILT_RANGE, TILT_RANGE).with_resolution(TILT_RESOLUTION),
            ),
            AbsSetup::new(
                Abs::TILT_Y,
                AbsInfo::new(-TILT_RANGE, TILT_RANGE).with_resolution(TILT_RESOLUTION),
            ),
            // Stylus serial, for tools that track individual pens.
            AbsSetup::new(Abs::MISC, AbsInfo::new(0, i32::from(u16::MAX))),
        ];

        let device = UinputDevice::builder()?
            .with_input_id(InputId::new(Bus::VIRTUAL, 0x045e, 0x0001, 0))?
            .with_props([InputProp::DIRECT])?
            .with_abs_axes(axes)?
            .with_keys([Key::BTN_TOUCH, Key::BTN_STYLUS, Key::BTN_TOOL_PEN, Key::BTN_TOOL_RUBBER])?
            .build("IPTS Stylus")?;

        if let Ok(name) = device.sysname() {
            log::info!(
                "Stylus device ready: /sys/devices/virtual/input/{}",
                name.to_string_lossy()
            );
        }

        Ok(Self {
            device,
            proximity_pen: false,
            proximity_rubber: false,
            contact: false,
            button: false,
        })
    }

    pub fn emit(&mut self, data: &StylusData) -> ObserverResult {
        let mut batch: Vec<InputEvent> = Vec::with_capacity(12);

        // Only one tool may be active at a time; eraser flips arrive with
        // proximity already dropped, so pen and rubber never overlap here.
        let pen = data.proximity && !data.rubber;
        let rubber = data.proximity && data.rubber;
        if pen != self.proximity_pen {
            batch.push(key_event(Key::BTN_TOOL_PEN, pen));
            self.proximity_pen = pen;
        }
        if rubber != self.proximity_rubber {
            batch.push(key_event(Key::BTN_TOOL_RUBBER, rubber));
            self.proximity_rubber = rubber;
        }
        if data.contact != self.contact {
            batch.push(key_event(Key::BTN_TOUCH, data.contact));
            self.contact = data.contact;
        }
        if data.button != self.button {
            batch.push(key_event(Key::BTN_STYLUS, data.button));
            self.button = data.button;
        }

        if data.proximity {
            let x = (data.x * f64::from(MAX_X)).round() as i32;
            let y = (data.y * f64::from(MAX_Y)).round() as i32;
            let pressure = (data.pressure * f64::from(MAX_PRESSURE)).round() as i32;
            let (tilt_x, tilt_y) = tilt(data.altitude, data.azimuth);

            batch.push(abs_event(Abs::X, x.clamp(0, MAX_X)));
            batch.push(abs_event(Abs::Y, y.clamp(0, MAX_Y)));
            batch.push(abs_event(Abs::PRESSURE, pressure.clamp(0, MAX_PRESSURE)));
            batch.push(abs_event(Abs::TILT_X, tilt_x));
            batch.push(abs_event(Abs::TILT_Y, tilt_y));
            batch.push(abs_event(Abs::MISC, (data.serial & 0xffff) as i32));
        }

        batch.push(syn_event());
        self.device.write(&batch)?;
        Ok(())
    }
}

/// Project spherical altitude/azimuth (radians) onto the two tilt axes, in
/// hundredths of a degree.
fn tilt(altitude: f64, azimuth: f64) -> (i32, i32) {
    if altitude <= 0.0 {
        return (0, 0);
    }

    let sin_alt = altitude.sin();
    let cos_alt = altitude.cos();

    let atan_x = f64::atan2(cos_alt, sin_alt * azimuth.cos());
    let atan_y = f64::atan2(cos_alt, sin_alt * azimuth.sin());

    let tilt_x = TILT_RANGE - (atan_x * 4500.0 / FRAC_PI_4).round() as i32;
    let tilt_y = (atan_y * 4500.0 / FRAC_PI_4).round() as i32 - TILT_RANGE;
    (tilt_x, tilt_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_4, PI};

    #[test]
    fn axes_share_one_resolution_on_the_default_display() {
        // 9600x7200 units on 260x195 mm is the same density both ways.
        assert_eq!(resolution(MAX_X, 260), 369);
        assert_eq!(resolution(MAX_Y, 195), 369);
    }

    // Altitude is the polar angle: 0 is a pen standing straight up, pi/2 is
    // one lying flat on the screen.

    #[test]
    fn unknown_altitude_has_no_tilt() {
        assert_eq!(tilt(0.0, 0.0), (0, 0));
        assert_eq!(tilt(-1.0, PI), (0, 0));
    }

    #[test]
    fn near_vertical_pen_barely_tilts() {
        let (tx, ty) = tilt(0.01, 0.0);
        assert!(tx.abs() < 100, "tilt_x = {}", tx);
        assert!(ty.abs() < 100, "tilt_y = {}", ty);
    }

    #[test]
    fn leaning_45_degrees_along_x() {
        let (tx, ty) = tilt(FRAC_PI_4, 0.0);
        assert_eq!(tx, 4500);
        assert_eq!(ty, 0);
    }

    #[test]
    fn tilt_stays_in_range() {
        for alt_deg in [1, 15, 30, 45, 60, 89] {
            for az_deg in [0, 45, 90, 180, 270, 359] {
                let alt = f64::from(alt_deg) * PI / 180.0;
                let az = f64::from(az_deg) * PI / 180.0;
                let (tx, ty) = tilt(alt, az);
                assert!(tx.abs() <= TILT_RANGE, "alt={} az={} tx={}", alt_deg, az_deg, tx);
                assert!(ty.abs() <= TILT_RANGE, "alt={} az={} ty={}", alt_deg, az_deg, ty);
            }
        }
    }
}
