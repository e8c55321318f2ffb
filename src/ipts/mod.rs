//! Decoding of IPTS (Intel Precise Touch & Stylus) report streams.
//!
//! The controller delivers opaque binary frames over a character device. The
//! [`Parser`] walks the nested frame tree, extracts capacitive heatmaps and
//! stylus telemetry, and hands finished values to observer callbacks. Raw
//! antenna spectra from the pen are localized into sub-cell positions,
//! button state and pressure by the DFT stage.

mod dft;
mod parser;
mod protocol;
mod reader;

use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use parser::Parser;
pub use protocol::Record;
pub use protocol::{DFT_MAX_ROWS, DFT_NUM_COMPONENTS, MAX_PRESSURE, MAX_X, MAX_Y, SINGLETOUCH_MAX_VALUE};

/// Which frame grammar the controller speaks.
///
/// Older controllers stream 64-byte container headers with payload groups;
/// newer ones wrap everything in nested HID frames. The grammars share their
/// report-level encoding but not their outer framing, so the parser needs to
/// be told which one to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Nested HID frames (ITHC class devices).
    Hid,
    /// Legacy container stream (IPTS doorbell class devices).
    Container,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Hid => write!(f, "hid"),
            Protocol::Container => write!(f, "container"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hid" => Ok(Protocol::Hid),
            "container" => Ok(Protocol::Container),
            _ => Err(format!("Invalid protocol '{}'. Valid values: hid, container", s)),
        }
    }
}

/// Error raised while parsing one report.
#[derive(Debug)]
pub enum ParseError {
    /// A read would have crossed the end of the current frame or buffer.
    /// The rest of the report is discarded; cached parser context is left in
    /// its previous consistent state.
    Truncated { needed: usize, available: usize },
    /// An observer callback failed. Surfaced unmodified.
    Observer(Box<dyn StdError + Send + Sync>),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Truncated { needed, available } => write!(
                f,
                "report data ended early (needed {} bytes, {} available)",
                needed, available
            ),
            ParseError::Observer(err) => write!(f, "observer failed: {}", err),
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ParseError::Observer(err) => Some(err.as_ref()),
            ParseError::Truncated { .. } => None,
        }
    }
}

/// What observer callbacks return; any error aborts the parse.
pub type ObserverResult = Result<(), Box<dyn StdError + Send + Sync>>;

pub type SingletouchHandler = Box<dyn FnMut(&SingletouchData) -> ObserverResult>;
pub type StylusHandler = Box<dyn FnMut(&StylusData) -> ObserverResult>;
pub type HeatmapHandler = Box<dyn FnMut(&Heatmap<'_>) -> ObserverResult>;
pub type DftHandler = Box<dyn FnMut(&DftWindow) -> ObserverResult>;
pub type MetadataHandler = Box<dyn FnMut(&Metadata) -> ObserverResult>;

/// Legacy single-contact touch sample, in device-native units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingletouchData {
    pub touch: bool,
    pub x: u16,
    pub y: u16,
}

/// One stylus sample.
///
/// Coordinates and pressure are normalized to `[0, 1]`; altitude and azimuth
/// are radians. `contact` is derived from pressure because the firmware
/// reports a false contact bit while the eraser is pressed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StylusData {
    pub proximity: bool,
    pub contact: bool,
    pub button: bool,
    pub rubber: bool,

    pub x: f64,
    pub y: f64,
    pub pressure: f64,
    pub altitude: f64,
    pub azimuth: f64,

    pub timestamp: u16,
    pub serial: u32,
}

/// Capacitive grid readout. One byte per cell, inverted (low = contact).
///
/// `data` borrows the input buffer and is only valid until the caller reuses
/// it; consumers must copy what they want to keep.
#[derive(Debug, Clone, Copy)]
pub struct Heatmap<'a> {
    pub width: u8,
    pub height: u8,

    pub y_min: u8,
    pub y_max: u8,
    pub x_min: u8,
    pub x_max: u8,
    pub z_min: u8,
    pub z_max: u8,

    pub timestamp: u32,
    pub data: &'a [u8],
}

/// One antenna's spectrum: complex components centered on the stylus
/// carrier, plus the antenna-cell indices the window covers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DftWindowRow {
    pub frequency: u32,
    pub magnitude: u32,
    pub real: [i16; DFT_NUM_COMPONENTS],
    pub imag: [i16; DFT_NUM_COMPONENTS],
    pub first: i8,
    pub last: i8,
    pub mid: i8,
    pub zero: i8,
}

/// A pen DFT measurement: parallel per-row spectra for the X and Y antenna
/// axes. Only the first `rows` entries of `x` and `y` are meaningful.
#[derive(Debug, Clone, Copy, Default)]
pub struct DftWindow {
    /// Device clock at capture time, counting at roughly 8 MHz.
    pub timestamp: u32,
    pub rows: usize,
    pub data_type: u8,
    /// Input group this window belongs to, when the preceding pen metadata
    /// matched on sequence number and data type.
    pub group: Option<u32>,

    /// Heatmap dimensions in effect when the window was captured.
    pub width: u8,
    pub height: u8,

    pub x: [DftWindowRow; DFT_MAX_ROWS],
    pub y: [DftWindowRow; DFT_MAX_ROWS],
}

/// Affine transform reported by the device alongside its dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub xx: f32,
    pub yx: f32,
    pub tx: f32,
    pub xy: f32,
    pub yy: f32,
    pub ty: f32,
}

/// Device-reported dimensions, populated once at startup on HID-class
/// devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    /// Heatmap grid size in cells.
    pub rows: u32,
    pub columns: u32,
    /// Physical size in device units.
    pub width: u32,
    pub height: u32,

    pub transform: Transform,
    pub unknown_byte: u8,
    #[allow(dead_code)]
    pub unknown: [u8; 64],
}
