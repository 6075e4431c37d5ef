#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use lpc_uart_loader::{Cancel, Image, Loader, Options, Outcome};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Image to be loaded
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Serial device the bootloader is attached to
    device: String,

    /// Suppress progress output
    #[structopt(short, long)]
    quiet: bool,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            .progress_chars("##-"),
    );
    bar
}

fn load(o: Args, cancel: Cancel) -> anyhow::Result<i32> {
    let f = File::open(&o.file).with_context(|| format!("Unable to open {}", o.file.display()))?;
    let image = Image::new(f).with_context(|| format!("Unable to read {}", o.file.display()))?;

    info!(
        "Loading {} ({}) to {}",
        o.file.display(),
        bytefmt::format(image.len()),
        o.device
    );

    let mut loader = Loader::linux(&o.device, o.options.clone())
        .with_context(|| format!("Error connecting to serial port {}", o.device))?
        .with_cancel(cancel);

    let mut bar = progress_bar(o.quiet);
    let outcome = loader.run(image, &mut bar);

    match &outcome {
        Outcome::Sent(c) => info!("Sent file ({} bytes, {} padding)", c.total(), c.padding),
        Outcome::SyncTimeout { attempts } => {
            error!("Timed out waiting for sync after {} attempts", attempts)
        }
        Outcome::Interrupted(c) => warn!(
            "Interrupted, {} image bytes and {} padding sent, device state unknown",
            c.body, c.padding
        ),
        Outcome::Failed(e) => error!("Load failed: {} ({:?})", e, e),
    }

    Ok(outcome.exit_code())
}

fn main() {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let level = if o.quiet {
        o.log_level.min(LevelFilter::Warn)
    } else {
        o.log_level
    };
    let _ = SimpleLogger::init(level, Config::default());

    // SIGINT and SIGTERM stop the transfer between chunks
    let cancel = Cancel::new();
    let handle = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handle.cancel()) {
        warn!("Unable to install signal handler: {}", e);
    }

    let code = match load(o, cancel) {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            1
        }
    };

    std::process::exit(code);
}
