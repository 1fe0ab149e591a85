use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use clap::Parser;
use crossbeam::channel::Receiver;
use parking_ledger::{
    ChannelNotifier, FanoutNotifier, LogNotifier, MemoryStore, ParkingEvent, ParkingLedger,
};
use plate_parking::metrics;
use plate_parking::plate_detection::frame_reader::ImageFolderReader;
use plate_parking::plate_detection::plate_ocr::{TesseractOcr, TimeoutOcr};
use plate_parking::{
    AutoConfirm, ConsoleConfirmation, ParkingStation, PlateConfirmation, StationConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EVENT_QUEUE: usize = 64;

/// Runs the parking station over still images instead of a live camera.
#[derive(Parser, Debug)]
#[command(name = "parking_offline", version)]
struct Args {
    /// YAML station configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accept every plate without asking on the terminal
    #[arg(long)]
    auto_confirm: bool,

    /// Append entry and exit events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Print Prometheus metrics when done
    #[arg(long)]
    metrics: bool,

    /// Image files or directories of images, processed in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

type Ledger = ParkingLedger<MemoryStore>;

fn setup_ledger(
    config: &StationConfig,
    events: Option<&PathBuf>,
) -> anyhow::Result<(Arc<Ledger>, Option<JoinHandle<anyhow::Result<usize>>>)> {
    let ledger = ParkingLedger::open(
        MemoryStore::new(),
        config.parking.layout(),
        config.parking.fee_schedule()?,
    );

    // Log every event, and also stream them to a file when asked
    let (ledger, writer) = match events {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create events file {}", path.display()))?;
            let (notifier, receiver) = ChannelNotifier::bounded(EVENT_QUEUE);
            let writer = thread::Builder::new()
                .name("event-writer".to_string())
                .spawn(move || write_events(receiver, BufWriter::new(file)))?;
            let fanout = FanoutNotifier::new().with(LogNotifier).with(notifier);
            (ledger.with_notifier(fanout), Some(writer))
        }
        None => (ledger, None),
    };
    Ok((Arc::new(ledger), writer))
}

/// Drains the event queue until the ledger is closed.
fn write_events(receiver: Receiver<ParkingEvent>, mut out: impl Write) -> anyhow::Result<usize> {
    let mut written = 0;
    for event in receiver {
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

fn run_station<C: PlateConfirmation>(
    config: &StationConfig,
    ledger: Arc<Ledger>,
    confirmation: C,
    frames: ImageFolderReader,
) -> anyhow::Result<()> {
    let ocr_config = config.ocr.clone();
    let ocr = TimeoutOcr::spawn(
        move || TesseractOcr::new(ocr_config.tessdata_dir.as_deref(), &ocr_config.language),
        config.ocr.timeout(),
    )?;
    let mut station = ParkingStation::new(ocr, confirmation, ledger)
        .with_snapshot_format(&config.parking.snapshot_format);

    for (path, frame) in frames {
        info!("Processing {}", path.display());
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        match station.process_frame(&frame) {
            Ok(transition) => {
                let record = transition.record();
                info!(
                    "{}: {} {:?} slot {}",
                    path.display(),
                    record.plate_number,
                    record.state(),
                    record.slot
                );
            }
            Err(e) if e.is_fatal() => {
                error!("{}: {} [{}]", path.display(), e, e.error_code());
                return Err(e.into());
            }
            Err(e) if e.is_retryable() => {
                warn!("{}: {}. Rescan when ready.", path.display(), e);
            }
            Err(e) => {
                error!("{}: {} [{}]", path.display(), e, e.error_code());
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plate_parking=info,parking_ledger=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => StationConfig::load(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => StationConfig::default(),
    };

    let (ledger, writer) = setup_ledger(&config, args.events.as_ref())?;
    let frames = ImageFolderReader::new(args.inputs.as_slice())?;

    info!("Starting, {} frames to go", frames.remaining());
    let result = if args.auto_confirm {
        run_station(&config, ledger.clone(), AutoConfirm, frames)
    } else {
        run_station(&config, ledger.clone(), ConsoleConfirmation::stdio(), frames)
    };

    let ledger = Arc::try_unwrap(ledger).map_err(|_| anyhow!("ledger is still in use"))?;
    let occupied = ledger.occupied_count()?;
    let history = ledger.records()?.len();
    ledger.close()?;
    info!("{} records, {} cars still parked", history, occupied);

    // The notifier sender went away with the ledger, so the writer finishes
    if let Some(writer) = writer {
        match writer.join() {
            Ok(Ok(written)) => info!("Wrote {} events", written),
            Ok(Err(e)) => error!("Event writer failed: {}", e),
            Err(_) => error!("Event writer panicked"),
        }
    }

    if args.metrics {
        println!("{}", metrics::gather_text());
    }
    println!("Done");
    result
}
