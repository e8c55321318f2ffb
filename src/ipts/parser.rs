//! Recursive descent over the IPTS frame tree.
//!
//! Each `parse()` call handles one whole report and is independent of the
//! next; the only state kept across calls is the cached heatmap dimensions,
//! timestamp and pen metadata, plus the persistent DFT stylus sample.
//! Unknown frame and report types are skipped without error so that newer
//! firmware does not break older daemons.

use std::f64::consts::PI;

use super::dft::DftStylus;
use super::protocol::*;
use super::reader::Reader;
use super::{
    DftHandler, DftWindow, Heatmap, HeatmapHandler, Metadata, MetadataHandler, ParseError,
    Protocol, SingletouchData, SingletouchHandler, StylusData, StylusHandler,
};

pub struct Parser {
    protocol: Protocol,

    // Cross-report context, updated while parsing and consumed by later
    // reports in the same or a subsequent call.
    dim: Option<HeatmapDim>,
    timestamp: Option<TimestampReport>,
    pen_meta: Option<PenMetadata>,

    dft: DftStylus,

    pub on_singletouch: Option<SingletouchHandler>,
    pub on_stylus: Option<StylusHandler>,
    pub on_heatmap: Option<HeatmapHandler>,
    pub on_dft: Option<DftHandler>,
    pub on_metadata: Option<MetadataHandler>,
}

impl Parser {
    pub fn new(protocol: Protocol, invert_x: bool, invert_y: bool) -> Self {
        Self {
            protocol,
            dim: None,
            timestamp: None,
            pen_meta: None,
            dft: DftStylus::new(invert_x, invert_y),
            on_singletouch: None,
            on_stylus: None,
            on_heatmap: None,
            on_dft: None,
            on_metadata: None,
        }
    }

    /// Parse one report. Observer callbacks fire inline, in document order,
    /// before this returns.
    pub fn parse(&mut self, data: &[u8]) -> Result<(), ParseError> {
        match self.protocol {
            Protocol::Hid => self.parse_with_header::<HidReportHeader>(data),
            Protocol::Container => self.parse_containers(data),
        }
    }

    /// Parse one HID-grammar report whose frame is prefixed by a header of
    /// type `H`, for transports that wrap reports in their own framing.
    pub fn parse_with_header<H: Record>(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = Reader::new(data);
        r.skip(H::SIZE)?;
        self.parse_hid_frame(&mut r)
    }

    // ===== Nested HID frame grammar =====

    fn parse_hid_frame(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let frame: HidFrame = r.read()?;

        let payload = (frame.size as usize).checked_sub(HidFrame::SIZE).ok_or(
            ParseError::Truncated { needed: HidFrame::SIZE, available: frame.size as usize },
        )?;
        let mut sub = r.sub(payload)?;

        match frame.ty {
            HID_FRAME_TYPE_HID => self.parse_hid_frames(&mut sub),
            HID_FRAME_TYPE_HEATMAP => self.parse_heatmap_frame(&mut sub),
            HID_FRAME_TYPE_METADATA => self.parse_metadata(&mut sub),
            HID_FRAME_TYPE_LEGACY => self.parse_payload(&mut sub),
            HID_FRAME_TYPE_REPORTS => self.parse_reports_frame(&mut sub),
            _ => Ok(()),
        }
    }

    fn parse_hid_frames(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        while r.remaining() > 0 {
            self.parse_hid_frame(r)?;
        }
        Ok(())
    }

    fn parse_heatmap_frame(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let header: HidHeatmapHeader = r.read()?;
        let mut sub = r.sub(header.size as usize)?;
        self.parse_heatmap_data(&mut sub)
    }

    fn parse_reports_frame(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        // Some devices emit a single malformed 4-byte reports frame; drop it.
        if r.remaining() == 4 {
            return Ok(());
        }
        self.parse_reports(r)
    }

    fn parse_metadata(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let size: MetadataSize = r.read()?;
        let unknown_byte: u8 = r.read()?;
        let transform: super::Transform = r.read()?;
        let unknown: [u8; 64] = r.read()?;

        // Metadata doubles as the dimension source on devices that never
        // send a dimensions report.
        self.dim = Some(HeatmapDim {
            height: size.rows.min(255) as u8,
            width: size.columns.min(255) as u8,
            y_min: 0,
            y_max: size.rows.saturating_sub(1).min(255) as u8,
            x_min: 0,
            x_max: size.columns.saturating_sub(1).min(255) as u8,
            z_min: 0,
            z_max: 255,
        });

        let metadata = Metadata {
            rows: size.rows,
            columns: size.columns,
            width: size.width,
            height: size.height,
            transform,
            unknown_byte,
            unknown,
        };

        if let Some(cb) = self.on_metadata.as_mut() {
            cb(&metadata).map_err(ParseError::Observer)?;
        }
        Ok(())
    }

    // ===== Legacy container grammar =====

    fn parse_containers(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut r = Reader::new(data);
        while r.remaining() > 0 {
            let header: ContainerHeader = r.read()?;
            let mut sub = r.sub(header.size as usize)?;

            match header.ty {
                CONTAINER_TYPE_PAYLOAD => self.parse_payload(&mut sub)?,
                CONTAINER_TYPE_HID_REPORT => self.parse_hid_report(&mut sub)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_payload(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        // Doorbell buffers are padded with zeros; a padded-out payload
        // decodes as empty instead of truncated.
        if r.remaining() == 0 {
            return Ok(());
        }

        let payload: PayloadHeader = r.read()?;

        for _ in 0..payload.groups {
            let group: PayloadGroup = r.read()?;
            let mut sub = r.sub(group.size as usize)?;

            match group.ty {
                GROUP_TYPE_STYLUS | GROUP_TYPE_TOUCH => self.parse_reports(&mut sub)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_hid_report(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let report_id: u8 = r.read()?;

        match report_id {
            HID_REPORT_SINGLETOUCH => self.parse_singletouch(r),
            id if is_hid_container(id) => self.parse_hid_containers(r),
            _ => Ok(()),
        }
    }

    fn parse_singletouch(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let touch: SingletouchRecord = r.read()?;

        let data = SingletouchData {
            touch: touch.touch != 0,
            x: touch.x,
            y: touch.y,
        };

        if let Some(cb) = self.on_singletouch.as_mut() {
            cb(&data).map_err(ParseError::Observer)?;
        }
        Ok(())
    }

    fn parse_hid_containers(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        while r.remaining() > 0 {
            let container: HidContainer = r.read()?;

            let payload = (container.size as usize).checked_sub(HidContainer::SIZE).ok_or(
                ParseError::Truncated {
                    needed: HidContainer::SIZE,
                    available: container.size as usize,
                },
            )?;
            let mut sub = r.sub(payload)?;

            match container.ty {
                HID_CONTAINER_TYPE_ROOT => self.parse_hid_containers(&mut sub)?,
                HID_CONTAINER_TYPE_HEATMAP => self.parse_heatmap_frame(&mut sub)?,
                HID_CONTAINER_TYPE_REPORTS => self.parse_reports_frame(&mut sub)?,
                _ => {}
            }
        }
        Ok(())
    }

    // ===== Report level (shared by both grammars) =====

    fn parse_reports(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        while r.remaining() > 0 {
            let report: ReportHeader = r.read()?;
            let mut sub = r.sub(report.size as usize)?;

            match report.ty {
                REPORT_TYPE_STYLUS_V1 => self.parse_stylus_v1(&mut sub)?,
                REPORT_TYPE_STYLUS_V2 => self.parse_stylus_v2(&mut sub)?,
                REPORT_TYPE_DIMENSIONS => {
                    let mut dim: HeatmapDim = sub.read()?;
                    // The firmware reports a zero contrast ceiling; use the
                    // full byte range instead.
                    if dim.z_max == 0 {
                        dim.z_max = 255;
                    }
                    self.dim = Some(dim);
                }
                REPORT_TYPE_TIMESTAMP => self.timestamp = Some(sub.read()?),
                REPORT_TYPE_HEATMAP => self.parse_heatmap_data(&mut sub)?,
                REPORT_TYPE_PEN_METADATA => self.pen_meta = Some(sub.read()?),
                REPORT_TYPE_PEN_DFT_WINDOW => self.parse_dft_window(&mut sub)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_stylus_v1(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let report: StylusReport = r.read()?;
        if report.elements == 0 {
            return Ok(());
        }

        // Samples span a 5 ms window; only the last one is surfaced to keep
        // jitter down.
        r.skip((report.elements as usize - 1) * StylusSampleV1::SIZE)?;
        let sample: StylusSampleV1 = r.read()?;

        let mode = u16::from(sample.mode);
        let pressure = f64::from(sample.pressure) / f64::from(MAX_PRESSURE_V1);
        let data = StylusData {
            proximity: mode & MODE_BIT_PROXIMITY != 0,
            contact: pressure > 0.0,
            button: mode & MODE_BIT_BUTTON != 0,
            rubber: mode & MODE_BIT_RUBBER != 0,
            x: f64::from(sample.x) / f64::from(MAX_X),
            y: f64::from(sample.y) / f64::from(MAX_Y),
            pressure,
            altitude: 0.0,
            azimuth: 0.0,
            timestamp: 0,
            serial: report.serial,
        };

        self.emit_stylus(&data)
    }

    fn parse_stylus_v2(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let report: StylusReport = r.read()?;
        if report.elements == 0 {
            return Ok(());
        }

        r.skip((report.elements as usize - 1) * StylusSampleV2::SIZE)?;
        let sample: StylusSampleV2 = r.read()?;

        let pressure = f64::from(sample.pressure) / f64::from(MAX_PRESSURE);
        let data = StylusData {
            proximity: sample.mode & MODE_BIT_PROXIMITY != 0,
            contact: pressure > 0.0,
            button: sample.mode & MODE_BIT_BUTTON != 0,
            rubber: sample.mode & MODE_BIT_RUBBER != 0,
            x: f64::from(sample.x) / f64::from(MAX_X),
            y: f64::from(sample.y) / f64::from(MAX_Y),
            pressure,
            // Hundredths of a degree on the wire.
            altitude: f64::from(sample.altitude) * PI / 18000.0,
            azimuth: f64::from(sample.azimuth) * PI / 18000.0,
            timestamp: sample.timestamp,
            serial: report.serial,
        };

        self.emit_stylus(&data)
    }

    fn parse_heatmap_data(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        // Without dimensions the payload length is unknown; drop the data.
        let Some(dim) = self.dim else {
            return Ok(());
        };

        let len = usize::from(dim.width) * usize::from(dim.height);
        let data = r.subspan(len)?;

        let heatmap = Heatmap {
            width: dim.width,
            height: dim.height,
            y_min: dim.y_min,
            y_max: dim.y_max,
            x_min: dim.x_min,
            x_max: dim.x_max,
            z_min: dim.z_min,
            z_max: dim.z_max,
            timestamp: self.timestamp.map(|t| t.timestamp).unwrap_or(0),
            data,
        };

        if let Some(cb) = self.on_heatmap.as_mut() {
            cb(&heatmap).map_err(ParseError::Observer)?;
        }
        Ok(())
    }

    fn parse_dft_window(&mut self, r: &mut Reader) -> Result<(), ParseError> {
        let header: DftWindowHeader = r.read()?;
        if usize::from(header.num_rows) > DFT_MAX_ROWS {
            return Ok(());
        }

        let mut window = DftWindow {
            timestamp: header.timestamp,
            rows: usize::from(header.num_rows),
            data_type: header.data_type,
            ..Default::default()
        };

        for i in 0..window.rows {
            window.x[i] = r.read()?;
        }
        for i in 0..window.rows {
            window.y[i] = r.read()?;
        }

        if let Some(meta) = self.pen_meta {
            if meta.seq_num == header.seq_num && meta.data_type == header.data_type {
                window.group = Some(meta.group);
            }
        }

        if let Some(dim) = self.dim {
            window.width = dim.width;
            window.height = dim.height;
        }

        if let Some(cb) = self.on_dft.as_mut() {
            cb(&window).map_err(ParseError::Observer)?;
        }

        let cb = &mut self.on_stylus;
        self.dft.process(&window, |data| match cb.as_mut() {
            Some(cb) => cb(data).map_err(ParseError::Observer),
            None => Ok(()),
        })
    }

    fn emit_stylus(&mut self, data: &StylusData) -> Result<(), ParseError> {
        if let Some(cb) = self.on_stylus.as_mut() {
            cb(data).map_err(ParseError::Observer)?;
        }
        Ok(())
    }
}
