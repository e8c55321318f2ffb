//! Decode and print incoming reports for debugging.
//! Run: ipts-input dump (Ctrl+C to stop).

use std::cell::Cell;
use std::fs::File;
use std::io::Read;
use std::rc::Rc;

use crate::config::Config;
use crate::device::DeviceProfile;
use crate::ipts::{ParseError, Parser};

pub fn run(
    config: &Config,
    profile: &DeviceProfile,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut file = File::open(&config.device)?;
    eprintln!("Dumping reports from {} (Ctrl+C to stop):\n", config.device);

    let count: Rc<Cell<u64>> = Rc::new(Cell::new(0));
    let next = |count: &Rc<Cell<u64>>| {
        count.set(count.get() + 1);
        count.get()
    };

    let mut parser = Parser::new(config.protocol, config.invert_x, config.invert_y);

    let n = count.clone();
    parser.on_stylus = Some(Box::new(move |d| {
        println!(
            "{:6}  STYLUS  prox={} contact={} button={} rubber={} x={:.4} y={:.4} p={:.4} serial={:08x} ts={}",
            next(&n), d.proximity, d.contact, d.button, d.rubber, d.x, d.y, d.pressure, d.serial, d.timestamp
        );
        Ok(())
    }));

    let n = count.clone();
    parser.on_singletouch = Some(Box::new(move |d| {
        println!("{:6}  TOUCH   touch={} x={} y={}", next(&n), d.touch, d.x, d.y);
        Ok(())
    }));

    let n = count.clone();
    parser.on_heatmap = Some(Box::new(move |h| {
        println!(
            "{:6}  HEATMAP {}x{} x=[{}..{}] y=[{}..{}] z=[{}..{}] ts={} bytes={}",
            next(&n),
            h.width, h.height,
            h.x_min, h.x_max,
            h.y_min, h.y_max,
            h.z_min, h.z_max,
            h.timestamp,
            h.data.len()
        );
        Ok(())
    }));

    let n = count.clone();
    parser.on_dft = Some(Box::new(move |w| {
        let row = match w.rows {
            0 => String::new(),
            _ => format!(
                " x0: freq={} mag={} cells=[{}..{}] mid={} zero={}",
                w.x[0].frequency, w.x[0].magnitude, w.x[0].first, w.x[0].last, w.x[0].mid,
                w.x[0].zero
            ),
        };
        println!(
            "{:6}  DFT     type={} rows={} group={:?} clock={}{}",
            next(&n), w.data_type, w.rows, w.group, w.timestamp, row
        );
        Ok(())
    }));

    let n = count.clone();
    parser.on_metadata = Some(Box::new(move |m| {
        let t = &m.transform;
        println!(
            "{:6}  META    {}x{} cells, {}x{} units, unknown_byte={}, transform=[{} {} {}; {} {} {}]",
            next(&n), m.columns, m.rows, m.width, m.height, m.unknown_byte,
            t.xx, t.yx, t.tx, t.xy, t.yy, t.ty
        );
        Ok(())
    }));

    let mut buf = vec![0u8; profile.buffer_size];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            continue;
        }

        match parser.parse(&buf[..read]) {
            Ok(()) => {}
            Err(err @ ParseError::Truncated { .. }) => log::warn!("{}", err),
            Err(ParseError::Observer(err)) => return Err(err),
        }
    }
}
