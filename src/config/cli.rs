use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ipts::Protocol;

#[derive(Parser)]
#[command(name = "ipts-input")]
#[command(about = "Turn Intel Precise Touch & Stylus frames into virtual pen and touch input")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Touch controller character device
    #[arg(long, env = "IPTS_INPUT_DEVICE")]
    pub device: Option<String>,

    /// Frame grammar spoken by the device (hid, container)
    #[arg(long, value_parser = clap::value_parser!(Protocol))]
    pub protocol: Option<Protocol>,

    /// Mirror the X axis of DFT stylus positions
    #[arg(long)]
    pub invert_x: bool,

    /// Mirror the Y axis of DFT stylus positions
    #[arg(long)]
    pub invert_y: bool,

    /// Display width in millimetres (for axis resolution)
    #[arg(long)]
    pub width: Option<u32>,

    /// Display height in millimetres (for axis resolution)
    #[arg(long)]
    pub height: Option<u32>,

    /// Path to config file
    #[arg(long, env = "IPTS_INPUT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode and print incoming reports for debugging
    Dump,
}
