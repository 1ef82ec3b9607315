mod aggregate;
mod config;
mod errors;
mod frame;
mod ingest;
mod periodicity;
mod persistence;
mod reconstruct;
mod replay;
mod service;
mod smoothing;
mod store;

// Public re-export
pub use crate::aggregate::{aggregate, estimate_window, median, round_bpm, WindowEstimate};
pub use crate::config::{
    EngineConfig, DEFAULT_BAND_BPM, DEFAULT_EXPECTED_LEN, DEFAULT_MIN_PERIOD_SECS,
    DEFAULT_POLY_ORDER, DEFAULT_WARMUP, DEFAULT_WINDOW_SECS,
};
pub use crate::errors::{FrameRejection, IngestError, PersistenceError, StoreError};
pub use crate::frame::{
    format_timestamp, now, parse_timestamp, CsiFrame, RadioMetadata, ReceiptTime,
    TIMESTAMP_FORMAT,
};
pub use crate::ingest::{
    decode_payload, decode_serial_line, ingest_lines, IngestStats, IngestWorker, LineStats,
    PayloadFormat, BATCH_SIZE, FLUSH_INTERVAL,
};
pub use crate::periodicity::{autocorrelation, estimate_bpm};
pub use crate::persistence::{save, FileType, ReplayFile, Writer};
pub use crate::reconstruct::{to_complex, CsiWindow};
pub use crate::replay::{mean_bpm, replay, ReplayWindow};
pub use crate::service::{BpmEstimate, BpmOutcome, BpmService, Readiness};
pub use crate::smoothing::{filter_length, preprocess, savgol_smooth};
pub use crate::store::{FrameStore, MemoryStore, SqliteStore};
