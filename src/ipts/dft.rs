//! Stylus localization from pen DFT windows.
//!
//! The controller measures the stylus carrier on every antenna and reports
//! short complex spectra per row. Position windows are interpolated to
//! sub-cell precision, button windows are classified by their phase
//! relative to the position carrier, and pressure windows are interpolated
//! across rows in the frequency domain.

use super::protocol::{
    DFT_ID_BUTTON, DFT_ID_POSITION, DFT_ID_PRESSURE, DFT_NUM_COMPONENTS, DFT_PRESSURE_ROWS,
    MAX_PRESSURE,
};
use super::{DftWindow, DftWindowRow, ParseError, StylusData};

// Calibration.
const POSITION_MIN_AMP: f64 = 50.0;
const POSITION_MIN_MAG: u32 = 2000;
const BUTTON_MIN_MAG: u32 = 1000;
const FREQ_MIN_MAG: u64 = 10000;
// Tuned to minimize jagginess of diagonal strokes.
const POSITION_EXP: f64 = -0.7;

/// Persistent stylus state across the three DFT packet classes.
///
/// Position windows arm proximity and update coordinates; button and
/// pressure windows refine the same sample. `stop` is the only transition
/// that clears the sample, and every clearing transition emits exactly one
/// event.
pub(super) struct DftStylus {
    stylus: StylusData,
    // Center components of the last position window, kept for the phase
    // comparison in button windows.
    real: i32,
    imag: i32,
    invert_x: bool,
    invert_y: bool,
}

impl DftStylus {
    pub fn new(invert_x: bool, invert_y: bool) -> Self {
        Self {
            stylus: StylusData::default(),
            real: 0,
            imag: 0,
            invert_x,
            invert_y,
        }
    }

    pub fn process<F>(&mut self, window: &DftWindow, mut emit: F) -> Result<(), ParseError>
    where
        F: FnMut(&StylusData) -> Result<(), ParseError>,
    {
        match window.data_type {
            DFT_ID_POSITION => self.position(window, &mut emit),
            DFT_ID_BUTTON => self.button(window, &mut emit),
            DFT_ID_PRESSURE => self.pressure(window, &mut emit),
            _ => Ok(()),
        }
    }

    fn position<F>(&mut self, window: &DftWindow, emit: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&StylusData) -> Result<(), ParseError>,
    {
        if window.rows == 0
            || window.width == 0
            || window.height == 0
            || window.x[0].magnitude < POSITION_MIN_MAG
            || window.y[0].magnitude < POSITION_MIN_MAG
        {
            return self.stop(emit);
        }

        let c = DFT_NUM_COMPONENTS / 2;
        self.real = i32::from(window.x[0].real[c]) + i32::from(window.y[0].real[c]);
        self.imag = i32::from(window.x[0].imag[c]) + i32::from(window.y[0].imag[c]);

        let x = interpolate_position(&window.x[0]);
        let y = interpolate_position(&window.y[0]);
        if x.is_nan() || y.is_nan() {
            return self.stop(emit);
        }

        let mut x = x / f64::from(window.width - 1);
        let mut y = y / f64::from(window.height - 1);
        if self.invert_x {
            x = 1.0 - x;
        }
        if self.invert_y {
            y = 1.0 - y;
        }

        self.stylus.proximity = true;
        self.stylus.x = x.clamp(0.0, 1.0);
        self.stylus.y = y.clamp(0.0, 1.0);

        emit(&self.stylus)
    }

    fn button<F>(&mut self, window: &DftWindow, emit: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&StylusData) -> Result<(), ParseError>,
    {
        if window.rows == 0 {
            return Ok(());
        }

        // Without a solid carrier there is nothing to compare phases
        // against; keep the current state.
        if window.x[0].magnitude < BUTTON_MIN_MAG || window.y[0].magnitude < BUTTON_MIN_MAG {
            return Ok(());
        }

        let c = DFT_NUM_COMPONENTS / 2;
        let real = i64::from(window.x[0].real[c]) + i64::from(window.y[0].real[c]);
        let imag = i64::from(window.x[0].imag[c]) + i64::from(window.y[0].imag[c]);

        // In phase with the position carrier = eraser, anti-phase = barrel
        // button.
        let sign = i64::from(self.real) * real + i64::from(self.imag) * imag;
        self.stylus.button = sign < 0;
        let rubber = sign > 0;

        if rubber != self.stylus.rubber {
            // Toggling the eraser while proximity is set confuses
            // downstream consumers; drop proximity first, then announce the
            // new mode.
            let was_proximate = self.stylus.proximity;
            self.stop(emit)?;
            self.stylus.rubber = rubber;
            if was_proximate {
                emit(&self.stylus)?;
            }
        } else if self.stylus.proximity {
            emit(&self.stylus)?;
        }
        Ok(())
    }

    fn pressure<F>(&mut self, window: &DftWindow, emit: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&StylusData) -> Result<(), ParseError>,
    {
        let f = if window.rows < DFT_PRESSURE_ROWS {
            f64::NAN
        } else {
            interpolate_frequency(&window.x, &window.y, DFT_PRESSURE_ROWS)
        };

        let p = (1.0 - f) * f64::from(MAX_PRESSURE);
        if p > 1.0 {
            self.stylus.contact = true;
            self.stylus.pressure = p.min(f64::from(MAX_PRESSURE)) / f64::from(MAX_PRESSURE);
        } else {
            self.stylus.contact = false;
            self.stylus.pressure = 0.0;
        }

        if self.stylus.proximity {
            emit(&self.stylus)?;
        }
        Ok(())
    }

    fn stop<F>(&mut self, emit: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(&StylusData) -> Result<(), ParseError>,
    {
        if !self.stylus.proximity {
            return Ok(());
        }

        self.stylus.proximity = false;
        self.stylus.contact = false;
        self.stylus.button = false;
        self.stylus.rubber = false;
        self.stylus.pressure = 0.0;
        emit(&self.stylus)
    }
}

/// Interpolate the sub-cell peak of one antenna row.
///
/// Returns the fractional cell index, or NaN when the row has no usable
/// peak (weak amplitude, or a parabola of the wrong orientation after the
/// exponent remap).
fn interpolate_position(row: &DftWindowRow) -> f64 {
    let mut maxi = DFT_NUM_COMPONENTS / 2;
    let mut mind = -0.5;
    let mut maxd = 0.5;

    // Off-screen components are always zero; shift the window away from
    // them and widen the offset bound on that side.
    if row.real[maxi - 1] == 0 && row.imag[maxi - 1] == 0 {
        maxi += 1;
        mind = -1.0;
    } else if row.real[maxi + 1] == 0 && row.imag[maxi + 1] == 0 {
        maxi -= 1;
        maxd = 1.0;
    }

    let real = f64::from(row.real[maxi]);
    let imag = f64::from(row.imag[maxi]);
    let amp = (real * real + imag * imag).sqrt();
    if amp < POSITION_MIN_AMP {
        return f64::NAN;
    }

    // Phase-aligned amplitudes of the three center components.
    let sin = real / amp;
    let cos = imag / amp;
    let x = [
        sin * f64::from(row.real[maxi - 1]) + cos * f64::from(row.imag[maxi - 1]),
        amp,
        sin * f64::from(row.real[maxi + 1]) + cos * f64::from(row.imag[maxi + 1]),
    ]
    .map(|v| v.powf(POSITION_EXP));

    // The negative exponent turns the peak into a minimum; anything else
    // (including NaN from a negative base) is not a fittable peak.
    if !(x[0] + x[2] > 2.0 * x[1]) {
        return f64::NAN;
    }

    let d = (x[0] - x[2]) / (2.0 * (x[0] - 2.0 * x[1] + x[2]));

    f64::from(row.first) + maxi as f64 + d.clamp(mind, maxd)
}

/// Interpolate the carrier frequency peak across `n` rows using Eric
/// Jacobsen's modified quadratic estimator, normalized to `[0, 1]`.
fn interpolate_frequency(x: &[DftWindowRow], y: &[DftWindowRow], n: usize) -> f64 {
    if n < 3 {
        return f64::NAN;
    }

    let mut maxi = 0;
    let mut maxm: u64 = 0;
    for i in 0..n {
        let m = u64::from(x[i].magnitude) + u64::from(y[i].magnitude);
        if m > maxm {
            maxm = m;
            maxi = i;
        }
    }
    if maxm < 2 * FREQ_MIN_MAG {
        return f64::NAN;
    }

    let mut mind = -0.5;
    let mut maxd = 0.5;
    if maxi < 1 {
        maxi = 1;
        mind = -1.0;
    } else if maxi > n - 2 {
        maxi = n - 2;
        maxd = 1.0;
    }

    // All components of a row share a phase, and matching x and y rows do
    // too, so everything can be summed into one complex sample per row.
    let mut real = [0i64; 3];
    let mut imag = [0i64; 3];
    for i in 0..3 {
        let row_x = &x[maxi + i - 1];
        let row_y = &y[maxi + i - 1];
        for j in 0..DFT_NUM_COMPONENTS {
            real[i] += i64::from(row_x.real[j]) + i64::from(row_y.real[j]);
            imag[i] += i64::from(row_x.imag[j]) + i64::from(row_y.imag[j]);
        }
    }

    let ra = real[0] - real[2];
    let rb = 2 * real[1] - real[0] - real[2];
    let ia = imag[0] - imag[2];
    let ib = 2 * imag[1] - imag[0] - imag[2];
    let d = (ra * rb + ia * ib) as f64 / (rb * rb + ib * ib) as f64;

    (maxi as f64 + d.clamp(mind, maxd)) / (n - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_row(first: i8, magnitude: u32, real: [i16; 9]) -> DftWindowRow {
        DftWindowRow {
            frequency: 119000,
            magnitude,
            real,
            imag: [0; 9],
            first,
            last: first + 8,
            mid: first + 4,
            zero: 0,
        }
    }

    fn position_window(x: DftWindowRow, y: DftWindowRow) -> DftWindow {
        DftWindow {
            data_type: DFT_ID_POSITION,
            rows: 1,
            width: 64,
            height: 44,
            x: [x; 16],
            y: [y; 16],
            ..Default::default()
        }
    }

    fn collect(
        stylus: &mut DftStylus,
        window: &DftWindow,
    ) -> Vec<StylusData> {
        let mut events = Vec::new();
        stylus
            .process(window, |data| {
                events.push(*data);
                Ok(())
            })
            .unwrap();
        events
    }

    #[test]
    fn centered_peak_interpolates_to_center() {
        let mut real = [0i16; 9];
        real[3] = 40;
        real[4] = 80;
        real[5] = 40;
        let row = position_row(12, 5000, real);

        let pos = interpolate_position(&row);
        assert!((pos - 16.0).abs() < 1e-12);
    }

    #[test]
    fn asymmetric_peak_leans_toward_heavier_neighbor() {
        let mut real = [0i16; 9];
        real[3] = 60;
        real[4] = 80;
        real[5] = 40;
        let row = position_row(0, 5000, real);

        let pos = interpolate_position(&row);
        assert!(pos > 3.5 && pos < 4.0);
    }

    #[test]
    fn zeroed_left_neighbor_shifts_window_and_widens_clamp() {
        // Cell 3 is off-screen; the window moves to components 4..=6 and the
        // offset bound opens to [-1, 0.5]. These amplitudes drive the raw
        // vertex below -1, so the clamp lands the result on first + 4.
        let mut real = [0i16; 9];
        real[4] = 72;
        real[5] = 50;
        real[6] = 27;
        let row = position_row(10, 5000, real);

        let pos = interpolate_position(&row);
        assert!((pos - 14.0).abs() < 1e-12);
    }

    #[test]
    fn weak_amplitude_has_no_peak() {
        let mut real = [0i16; 9];
        real[3] = 30;
        real[4] = 45; // below the 50 amplitude floor
        real[5] = 30;
        let row = position_row(0, 5000, real);

        assert!(interpolate_position(&row).is_nan());
    }

    #[test]
    fn wrong_curvature_has_no_peak() {
        // Center weaker than both neighbors: the remapped parabola opens the
        // wrong way.
        let mut real = [0i16; 9];
        real[3] = 500;
        real[4] = 100;
        real[5] = 500;
        let row = position_row(0, 5000, real);

        assert!(interpolate_position(&row).is_nan());
    }

    #[test]
    fn position_arms_proximity_and_normalizes() {
        let mut real = [0i16; 9];
        real[3] = 40;
        real[4] = 80;
        real[5] = 40;
        let window = position_window(position_row(10, 5000, real), position_row(10, 5000, real));

        let mut stylus = DftStylus::new(false, false);
        let events = collect(&mut stylus, &window);

        assert_eq!(events.len(), 1);
        assert!(events[0].proximity);
        assert!((events[0].x - 14.0 / 63.0).abs() < 1e-9);
        assert!((events[0].y - 14.0 / 43.0).abs() < 1e-9);
    }

    #[test]
    fn axis_inversion_mirrors_coordinates() {
        let mut real = [0i16; 9];
        real[3] = 40;
        real[4] = 80;
        real[5] = 40;
        let window = position_window(position_row(10, 5000, real), position_row(10, 5000, real));

        let mut stylus = DftStylus::new(true, false);
        let events = collect(&mut stylus, &window);

        assert!((events[0].x - (1.0 - 14.0 / 63.0)).abs() < 1e-9);
        assert!((events[0].y - 14.0 / 43.0).abs() < 1e-9);
    }

    #[test]
    fn weak_position_window_stops_a_proximate_stylus() {
        let mut real = [0i16; 9];
        real[3] = 40;
        real[4] = 80;
        real[5] = 40;
        let good = position_window(position_row(10, 5000, real), position_row(10, 5000, real));
        let weak = position_window(position_row(10, 100, real), position_row(10, 100, real));

        let mut stylus = DftStylus::new(false, false);
        let mut events = collect(&mut stylus, &good);
        events.extend(collect(&mut stylus, &weak));

        assert_eq!(events.len(), 2);
        assert!(events[0].proximity);
        assert!(!events[1].proximity);
        assert!(!events[1].contact);
        assert_eq!(events[1].pressure, 0.0);

        // Not proximate anymore: another failure stays silent.
        assert!(collect(&mut stylus, &weak).is_empty());
    }

    fn button_window(center: i16, magnitude: u32) -> DftWindow {
        let mut real = [0i16; 9];
        real[4] = center;
        let row = position_row(10, magnitude, real);
        DftWindow {
            data_type: DFT_ID_BUTTON,
            rows: 1,
            width: 64,
            height: 44,
            x: [row; 16],
            y: [row; 16],
            ..Default::default()
        }
    }

    fn arm_proximity(stylus: &mut DftStylus) {
        let mut real = [0i16; 9];
        real[3] = 40;
        real[4] = 80;
        real[5] = 40;
        let window = position_window(position_row(10, 5000, real), position_row(10, 5000, real));
        assert_eq!(collect(stylus, &window).len(), 1);
    }

    #[test]
    fn in_phase_button_window_is_an_eraser_flip() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        // Same sign as the stashed position carrier: eraser, not button.
        let events = collect(&mut stylus, &button_window(800, 1500));

        assert_eq!(events.len(), 2);
        assert!(!events[0].proximity);
        assert!(!events[0].rubber);
        assert!(events[1].rubber);
        assert!(!events[1].button);
    }

    #[test]
    fn anti_phase_button_window_sets_the_barrel_button() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        let events = collect(&mut stylus, &button_window(-800, 1500));

        // No eraser flip, so the refined sample is emitted directly.
        assert_eq!(events.len(), 1);
        assert!(events[0].proximity);
        assert!(events[0].button);
        assert!(!events[0].rubber);
    }

    #[test]
    fn weak_button_window_leaves_state_unchanged() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        let events = collect(&mut stylus, &button_window(800, 500));
        assert!(events.is_empty());
    }

    fn pressure_window(row_sums: [(i16, u32); 6]) -> DftWindow {
        let mut window = DftWindow {
            data_type: DFT_ID_PRESSURE,
            rows: 6,
            width: 64,
            height: 44,
            ..Default::default()
        };
        for (i, (component, magnitude)) in row_sums.into_iter().enumerate() {
            let mut real = [0i16; 9];
            real[0] = component;
            let row = position_row(0, magnitude, real);
            window.x[i] = row;
            window.y[i] = row;
        }
        window
    }

    #[test]
    fn interior_frequency_peak_maps_to_pressure() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        // Peak at row 1 with symmetric neighbors: the vertex offset is zero
        // and the normalized frequency is 1/5.
        let window = pressure_window([
            (100, 1000),
            (200, 15000),
            (100, 1000),
            (0, 0),
            (0, 0),
            (0, 0),
        ]);
        let events = collect(&mut stylus, &window);

        assert_eq!(events.len(), 1);
        assert!(events[0].contact);
        let expected = (1.0 - 0.2) * 4096.0 / 4096.0;
        assert!((events[0].pressure - expected).abs() < 1e-9);
    }

    #[test]
    fn weak_frequency_peak_means_no_contact() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        // Peak magnitude sum 15000, below the 20000 floor.
        let window = pressure_window([
            (100, 1000),
            (200, 7500),
            (100, 1000),
            (0, 0),
            (0, 0),
            (0, 0),
        ]);
        let events = collect(&mut stylus, &window);

        assert_eq!(events.len(), 1);
        assert!(!events[0].contact);
        assert_eq!(events[0].pressure, 0.0);
    }

    #[test]
    fn short_pressure_window_reads_as_no_contact() {
        let mut stylus = DftStylus::new(false, false);
        arm_proximity(&mut stylus);

        let mut window = pressure_window([
            (100, 1000),
            (200, 15000),
            (100, 1000),
            (0, 0),
            (0, 0),
            (0, 0),
        ]);
        window.rows = 4;

        let events = collect(&mut stylus, &window);
        assert_eq!(events.len(), 1);
        assert!(!events[0].contact);
        assert_eq!(events[0].pressure, 0.0);
    }
}
