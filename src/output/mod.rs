//! Virtual input devices created over uinput.

mod stylus;
mod touch;

pub use stylus::StylusDevice;
pub use touch::TouchDevice;

use evdevil::event::{Abs, AbsEvent, EventType, InputEvent, Key, KeyEvent, KeyState};

const EV_SYN: u16 = 0x00;
const SYN_REPORT: u16 = 0;

fn key_event(key: Key, pressed: bool) -> InputEvent {
    let state = if pressed { KeyState::PRESSED } else { KeyState::RELEASED };
    KeyEvent::new(key, state).into()
}

fn abs_event(axis: Abs, value: i32) -> InputEvent {
    AbsEvent::new(axis, value).into()
}

fn syn_event() -> InputEvent {
    InputEvent::new(EventType::from_raw(EV_SYN), SYN_REPORT, 0)
}

/// Axis resolution reported to userspace, from the virtual range and the
/// physical size in millimetres.
fn resolution(virt: i32, phys_mm: u32) -> i32 {
    ((f64::from(virt) * 10.0) / f64::from(phys_mm)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::resolution;

    #[test]
    fn resolution_scales_virtual_units_by_physical_size() {
        // 9600 units over a 260 mm panel.
        assert_eq!(resolution(9600, 260), 369);
        assert_eq!(resolution(7200, 195), 369);
        assert_eq!(resolution(12000, 325), 369);
    }
}
