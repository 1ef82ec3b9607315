//! Frame ingestion
//!
//! Stations report CSI in two shapes:
//!  - JSON payloads `{"frames":[...]}`, one per line, as published in batches
//!  - `CSI_DATA` rows of the serial console, as CSV with the receipt time appended
//!
//! Decoded frames are handed to an [`IngestWorker`], whose background thread
//! commits them to a [`FrameStore`] in batches.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;
use std::io::BufRead;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::errors::IngestError;
use crate::frame::{parse_timestamp, CsiFrame, RadioMetadata, ReceiptTime};
use crate::store::FrameStore;

/// Number of frames committed to the store at once.
pub const BATCH_SIZE: usize = 1000;

/// Longest time a partial batch waits before being committed.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Leading marker of CSI rows on the serial console.
const SERIAL_MARKER: &str = "CSI_DATA";

/// Columns of a serial row before the sample list: marker, sequence number,
/// MAC, rssi, rate, noise floor, fft gain, agc gain, channel, station
/// timestamp, signal length, rx state, buffer length, first word invalid.
const SERIAL_LEADING_COLUMNS: usize = 14;

/// Encoding of the lines fed to [`ingest_lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Csv,
}

/// One frame as it appears in a station's JSON payload.
#[derive(Debug, Deserialize)]
struct WireFrame {
    mac: String,
    rssi: i32,
    rate: i32,
    noise_floor: i32,
    fft_gain: i32,
    agc_gain: i32,
    channel: i32,
    #[serde(rename = "timestamp")]
    device_timestamp: i64,
    sig_len: i32,
    rx_state: i32,
    first_word_invalid: i32,
    csi: Vec<i32>,
}

impl WireFrame {
    fn into_frame(self, received_at: ReceiptTime) -> CsiFrame {
        CsiFrame {
            received_at,
            station: self.mac,
            radio: RadioMetadata {
                rssi: self.rssi,
                rate: self.rate,
                noise_floor: self.noise_floor,
                fft_gain: self.fft_gain,
                agc_gain: self.agc_gain,
                channel: self.channel,
                device_timestamp: self.device_timestamp,
                sig_len: self.sig_len,
                rx_state: self.rx_state,
                first_word_invalid: self.first_word_invalid,
            },
            samples: self.csi,
        }
    }
}

/// Decodes a JSON payload, stamping every frame with `received_at`.
///
/// The payload as a whole is rejected when it is not JSON or has no `frames`
/// list. Frames with missing or ill-typed fields are skipped.
pub fn decode_payload(
    payload: &str,
    received_at: ReceiptTime,
) -> Result<Vec<CsiFrame>, IngestError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let entries = value
        .get("frames")
        .and_then(serde_json::Value::as_array)
        .ok_or(IngestError::MissingFrames)?;

    let mut frames = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match WireFrame::deserialize(entry) {
            Ok(wire) => frames.push(wire.into_frame(received_at)),
            Err(e) => log::warn!("Skipping frame {} of payload: {}", i, e),
        }
    }

    log::trace!(
        "Decoded {} of {} frames in payload",
        frames.len(),
        entries.len()
    );
    Ok(frames)
}

/// Decodes one line of the serial console.
///
/// Lines that are not `CSI_DATA` rows yield `Ok(None)`. When the row carries
/// no receipt time after the sample list, `fallback` is used.
pub fn decode_serial_line(
    line: &str,
    fallback: ReceiptTime,
) -> Result<Option<CsiFrame>, IngestError> {
    if !line.trim_start().starts_with(SERIAL_MARKER) {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let record = match reader.records().next() {
        Some(record) => record?,
        None => return Ok(None),
    };

    decode_serial_record(&record, fallback).map(Some)
}

fn decode_serial_record(
    record: &csv::StringRecord,
    fallback: ReceiptTime,
) -> Result<CsiFrame, IngestError> {
    let fields: Vec<&str> = record.iter().collect();
    if fields.len() < SERIAL_LEADING_COLUMNS + 1 {
        return Err(IngestError::MalformedRow(format!(
            "expected at least {} columns, got {}",
            SERIAL_LEADING_COLUMNS + 1,
            fields.len()
        )));
    }

    // The sample list is the last column, or the penultimate one when the
    // receipt time was appended
    let last = fields[fields.len() - 1];
    let (samples_field, received_at) = if last.starts_with('[') {
        (last, fallback)
    } else {
        (fields[fields.len() - 2], parse_timestamp(last)?)
    };

    let samples: Vec<i32> = serde_json::from_str(samples_field)
        .map_err(|e| IngestError::MalformedRow(format!("sample list: {}", e)))?;

    let int = |idx: usize| -> Result<i64, IngestError> {
        fields[idx].parse::<i64>().map_err(|e| {
            IngestError::MalformedRow(format!("column {} ('{}'): {}", idx, fields[idx], e))
        })
    };
    let narrow = |idx: usize| -> Result<i32, IngestError> {
        let value = int(idx)?;
        i32::try_from(value)
            .map_err(|_| IngestError::MalformedRow(format!("column {} out of range", idx)))
    };

    Ok(CsiFrame {
        received_at,
        station: fields[2].to_string(),
        radio: RadioMetadata {
            rssi: narrow(3)?,
            rate: narrow(4)?,
            noise_floor: narrow(5)?,
            fft_gain: narrow(6)?,
            agc_gain: narrow(7)?,
            channel: narrow(8)?,
            device_timestamp: int(9)?,
            sig_len: narrow(10)?,
            rx_state: narrow(11)?,
            first_word_invalid: narrow(13)?,
        },
        samples,
    })
}

/// Counters reported by the writer thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub frames_received: usize,
    pub frames_stored: usize,
    pub batches_committed: usize,
}

/// Background writer committing frames to a store in batches.
///
/// Frames sent through [`IngestWorker::submit`] are buffered and committed
/// once `batch_size` is reached, after [`FLUSH_INTERVAL`] without a full
/// batch, or when the worker is finished.
pub struct IngestWorker {
    sender: Option<Sender<CsiFrame>>,
    writer: Option<JoinHandle<IngestStats>>,
}

impl IngestWorker {
    pub fn spawn<S: FrameStore + 'static>(store: S) -> Self {
        Self::with_batch_size(store, BATCH_SIZE, FLUSH_INTERVAL)
    }

    pub fn with_batch_size<S: FrameStore + 'static>(
        store: S,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        let (tx, rx) = bounded(batch_size.max(1) * 2);
        log::trace!(
            "Spawning background thread to write frames in batches of {}",
            batch_size
        );
        let writer =
            thread::spawn(move || write_frames_to_store(rx, store, batch_size.max(1), flush_interval));

        Self {
            sender: Some(tx),
            writer: Some(writer),
        }
    }

    /// Queues frames for the writer thread.
    ///
    /// Fails with [`IngestError::WriterGone`] once the writer has stopped.
    pub fn submit(&self, frames: Vec<CsiFrame>) -> Result<(), IngestError> {
        let sender = self.sender.as_ref().ok_or(IngestError::WriterGone)?;
        for frame in frames {
            sender.send(frame).map_err(|_| IngestError::WriterGone)?;
        }
        Ok(())
    }

    /// Closes the queue, waits for pending frames to be committed and
    /// returns the writer's counters.
    pub fn finish(mut self) -> Result<IngestStats, IngestError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<IngestStats, IngestError> {
        // Dropping the sender lets the writer drain and exit
        self.sender = None;
        match self.writer.take() {
            Some(writer) => writer.join().map_err(|e| {
                log::error!("Couldn't join frame writer thread. Error: {:?}", e);
                IngestError::WriterGone
            }),
            None => Err(IngestError::WriterGone),
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// Receives frames from a queue and commits them to the store in batches.
fn write_frames_to_store<S: FrameStore>(
    rx: Receiver<CsiFrame>,
    store: S,
    batch_size: usize,
    flush_interval: Duration,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut buffer: Vec<CsiFrame> = Vec::with_capacity(batch_size);

    loop {
        match rx.recv_timeout(flush_interval) {
            Ok(frame) => {
                stats.frames_received += 1;
                buffer.push(frame);
                if buffer.len() < batch_size {
                    continue;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if buffer.is_empty() {
                    continue;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Err(e) = commit(&store, &mut buffer, &mut stats) {
            log::error!("Error encountered on batch writing: {}. Exiting writer.", e);
            return stats;
        }
    }

    // Write any remaining frames once the channel is closed
    if !buffer.is_empty() {
        if let Err(e) = commit(&store, &mut buffer, &mut stats) {
            log::error!("Error encountered on batch writing: {}. Exiting writer.", e);
        }
    }

    log::info!(
        "Frame writer finished: {} received, {} stored in {} batches",
        stats.frames_received,
        stats.frames_stored,
        stats.batches_committed
    );
    stats
}

fn commit<S: FrameStore>(
    store: &S,
    buffer: &mut Vec<CsiFrame>,
    stats: &mut IngestStats,
) -> Result<(), IngestError> {
    let written = store.append_frames(buffer)?;
    log::debug!("Committed batch of {} frames", written);
    stats.frames_stored += written;
    stats.batches_committed += 1;
    buffer.clear();
    Ok(())
}

/// Counters of a line-oriented ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub lines: usize,
    pub frames: usize,
    pub skipped_lines: usize,
}

/// Decodes every line of `reader` and queues the frames on `worker`.
///
/// `clock` supplies the receipt time of JSON payloads and of serial rows
/// without one. Undecodable lines are logged and skipped; reading stops at
/// end of input or when the writer is gone.
pub fn ingest_lines<R, F>(
    reader: R,
    format: PayloadFormat,
    worker: &IngestWorker,
    clock: F,
) -> Result<LineStats, IngestError>
where
    R: BufRead,
    F: Fn() -> ReceiptTime,
{
    let mut stats = LineStats::default();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let decoded = match format {
            PayloadFormat::Json => decode_payload(&line, clock()),
            PayloadFormat::Csv => decode_serial_line(&line, clock()).map(|f| f.into_iter().collect()),
        };

        match decoded {
            Ok(frames) => {
                stats.frames += frames.len();
                worker.submit(frames)?;
            }
            Err(e) => {
                log::warn!("Skipping line {}: {}", stats.lines, e);
                stats.skipped_lines += 1;
            }
        }
    }

    Ok(stats)
}
