use breathfi_lib::{now, BpmOutcome, BpmService, PayloadFormat, SqliteStore};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crate::cli::MonitorArgs;
use crate::ingest::ingest_into;
use crate::CliResult;

pub fn run_monitor(args: MonitorArgs) -> CliResult<()> {
    let config = args.config();
    let interval = Duration::from_secs_f64(args.interval.max(0.1));
    let MonitorArgs {
        db, input, format, ..
    } = args;

    // Set up the `running` flag for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    // Set up CTRL+C handler for graceful shutdown
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let store = Arc::new(SqliteStore::open(&db)?);

    // Ingest concurrently if an input was given
    let ingester = input.map(|input| {
        let store = store.clone();
        let format: PayloadFormat = format.into();
        log::trace!("Spawning background thread to ingest payloads");
        thread::spawn(move || ingest_into(store, Some(input), format))
    });

    let window_secs = config.window_secs;
    let service = BpmService::new(store, config);
    let _warmup = service.start_warmup();

    while running.load(Ordering::SeqCst) {
        let tick = Instant::now();
        let now = now();
        match service.get_bpm(now) {
            Ok(BpmOutcome::NotReady) => println!("{}: Warming up, please wait.", now.format("%H:%M:%S")),
            Ok(BpmOutcome::InsufficientData) => println!(
                "{}: No valid CSI data in the last {}s.",
                now.format("%H:%M:%S"),
                window_secs
            ),
            Ok(BpmOutcome::Estimate(estimate)) => println!(
                "{}, fs = {:.2} Hz, BPM = {}",
                now.format("%H:%M:%S"),
                estimate.sampling_rate_hz,
                estimate.bpm
            ),
            Err(e) => log::error!("Breathing-rate query failed: {}", e),
        }

        // Wait for the next tick, or for CTRL+C
        while running.load(Ordering::SeqCst) && tick.elapsed() < interval {
            thread::sleep(Duration::from_millis(100).min(interval));
        }
    }

    println!("Shutting down gracefully...");
    if let Some(ingester) = ingester {
        // A stdin reader may still be blocked on input; leave it to process exit
        if ingester.is_finished() {
            match ingester.join() {
                Ok(Ok(frames)) => log::info!("Ingested {} frames while monitoring", frames),
                Ok(Err(e)) => log::error!("Ingestion failed: {}", e),
                Err(e) => log::error!("Couldn't join ingestion thread. Error: {:?}", e),
            }
        }
    }
    Ok(())
}
