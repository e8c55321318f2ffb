mod config;
mod daemon;
mod device;
mod dump;
mod ipts;
mod output;

use clap::Parser;

use config::{Cli, Command, Config};
use device::DeviceProfile;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Some(Command::Dump) => "warn",
        None => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let profile = DeviceProfile::detect();
    let config = Config::load(&cli, profile);

    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    log::info!(
        "ipts-input starting ({} profile, device={}, protocol={}, display {}x{} mm)",
        profile.name,
        config.device,
        config.protocol,
        config.width,
        config.height
    );

    match cli.command {
        Some(Command::Dump) => dump::run(&config, profile),
        None => daemon::run(&config, profile),
    }
}
