use breathfi_lib::{ingest_lines, now, IngestWorker, PayloadFormat, SqliteStore};

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::IngestArgs;
use crate::CliResult;

pub fn run_ingest(args: IngestArgs) -> CliResult<()> {
    let IngestArgs { db, input, format } = args;

    let store = Arc::new(SqliteStore::open(&db)?);
    let frames = ingest_into(store.clone(), input, format.into())?;

    println!(
        "Stored {} frames; {} frames in {}",
        frames,
        store.count()?,
        db.display()
    );
    Ok(())
}

/// Decodes all lines of `input` and commits the frames to `store`,
/// returning the number of frames written.
pub fn ingest_into(
    store: Arc<SqliteStore>,
    input: Option<PathBuf>,
    format: PayloadFormat,
) -> CliResult<usize> {
    let reader = open_input(input.as_deref())?;
    let worker = IngestWorker::spawn(store);

    let lines = ingest_lines(reader, format, &worker, now)?;
    let stats = worker.finish()?;

    log::info!(
        "Read {} lines ({} skipped), {} frames decoded, {} stored",
        lines.lines,
        lines.skipped_lines,
        lines.frames,
        stats.frames_stored
    );
    Ok(stats.frames_stored)
}

/// Opens the given file, or stdin for `None` and `-`.
fn open_input(path: Option<&Path>) -> io::Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != Path::new("-") => {
            log::info!("Reading payloads from {}", path.display());
            Ok(Box::new(BufReader::new(File::open(path)?)))
        }
        _ => {
            log::info!("Reading payloads from stdin");
            Ok(Box::new(BufReader::new(io::stdin())))
        }
    }
}
