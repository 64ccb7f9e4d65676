use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use helios_dashboard::{
    LinkEvent, TelemetryLink, recorder::Recorder, serial_port_list, settings::Settings,
};

const IDLE_CHECK: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "telemetry_monitor")]
#[command(about = "Headless HELIOS telemetry monitor", long_about = None)]
struct Args {
    /// List serial ports and exit
    #[arg(short, long)]
    list: bool,

    /// Serial port; defaults to the first detected port
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// Record frames as CSV into this directory
    #[arg(long)]
    csv: Option<PathBuf>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list {
        for port in serial_port_list() {
            println!("{port}");
        }
        return Ok(());
    }

    let mut settings = Settings::load();
    if let Some(baud) = args.baud {
        settings.serial.baud_rate = baud;
    }

    let mut link = TelemetryLink::new(settings.serial.clone());
    let mut rx = link.subscribe();

    let csv_dir = args
        .csv
        .or_else(|| settings.logging.record_csv.then(|| settings.logging.csv_dir.clone()));
    let _recorder = match csv_dir {
        Some(dir) => Some(Recorder::start(&dir, link.subscribe())?),
        None => None,
    };

    match args.port {
        Some(port) => link.connect(&port)?,
        None => {
            if link.connect_first_available()?.is_none() {
                bail!("No serial ports available");
            }
        }
    }

    loop {
        let event = match rx.recv_timeout(IDLE_CHECK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) if link.is_connected() => continue,
            Err(_) => break,
        };

        match &event {
            LinkEvent::Frame(frame) => {
                println!("{} {}", frame.time.format("%H:%M:%S%.3f"), event.describe());
            }
            LinkEvent::Raw(line) => log::debug!("{line}"),
            LinkEvent::Unmatched(line) => log::warn!("Unmatched: {line}"),
            LinkEvent::Status(status) => log::info!("{status}"),
            LinkEvent::Error(e) => log::error!("{e}"),
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
