//! SQLite-backed frame store.
use std::path::Path;
use std::sync::Mutex;

use chrono::Duration;
use rusqlite::{params, Connection, Row};

use crate::errors::StoreError;
use crate::frame::{format_timestamp, parse_timestamp, CsiFrame, RadioMetadata, ReceiptTime};

const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SQL_CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS csi_frame (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        received_at_utc    TEXT    NOT NULL,
        mac                TEXT    NOT NULL,
        rssi               INTEGER NOT NULL,
        rate               INTEGER NOT NULL,
        noise_floor        INTEGER NOT NULL,
        fft_gain           INTEGER NOT NULL,
        agc_gain           INTEGER NOT NULL,
        channel            INTEGER NOT NULL,
        csi_timestamp      INTEGER NOT NULL,
        sig_len            INTEGER NOT NULL,
        rx_state           INTEGER NOT NULL,
        first_word_invalid INTEGER NOT NULL,
        csi_json           TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS csi_frame_received_idx
        ON csi_frame(replace(substr(received_at_utc, 1, 19), 'T', ' '));";

const SQL_INSERT: &str = "
    INSERT INTO csi_frame
    (received_at_utc, mac, rssi, rate, noise_floor, fft_gain, agc_gain,
     channel, csi_timestamp, sig_len, rx_state, first_word_invalid, csi_json)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

// Rows are compared on their seconds prefix with a space separator. Rows
// carrying a UTC offset only reveal their local time once parsed, so they
// always pass the prefilter.
const SQL_SELECT_RANGE: &str = "
    SELECT id, received_at_utc, mac, rssi, rate, noise_floor, fft_gain, agc_gain,
           channel, csi_timestamp, sig_len, rx_state, first_word_invalid, csi_json
    FROM csi_frame
    WHERE (replace(substr(received_at_utc, 1, 19), 'T', ' ') >= ?1
           AND replace(substr(received_at_utc, 1, 19), 'T', ' ') < ?2)
       OR substr(received_at_utc, 20) GLOB '*[zZ+-]*'
    ORDER BY id ASC";

/// Frame store over the `csi_frame` table of a SQLite database.
///
/// One connection is shared by the ingestion writer and the query readers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// A row as it sits in the table, before validation.
struct RawRow {
    id: i64,
    received_at: String,
    station: String,
    radio: RadioMetadata,
    csi_json: String,
}

impl RawRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            received_at: row.get(1)?,
            station: row.get(2)?,
            radio: RadioMetadata {
                rssi: row.get(3)?,
                rate: row.get(4)?,
                noise_floor: row.get(5)?,
                fft_gain: row.get(6)?,
                agc_gain: row.get(7)?,
                channel: row.get(8)?,
                device_timestamp: row.get(9)?,
                sig_len: row.get(10)?,
                rx_state: row.get(11)?,
                first_word_invalid: row.get(12)?,
            },
            csi_json: row.get(13)?,
        })
    }

    /// Validates the stored text columns into a frame.
    fn into_frame(self) -> Option<CsiFrame> {
        let received_at = match parse_timestamp(&self.received_at) {
            Ok(ts) => ts,
            Err(e) => {
                log::warn!("Skipping stored frame {}: {}", self.id, e);
                return None;
            }
        };
        let samples = match serde_json::from_str::<Vec<i32>>(&self.csi_json) {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("Skipping stored frame {}: bad sample JSON: {}", self.id, e);
                return None;
            }
        };

        Some(CsiFrame {
            received_at,
            station: self.station,
            radio: self.radio,
            samples,
        })
    }
}

impl SqliteStore {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        log::info!("Opening frame store at {}", path.as_ref().display());
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    /// A store living only in memory, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SQL_CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total number of stored rows, valid or not.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM csi_frame", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl super::FrameStore for SqliteStore {
    fn fetch_frames(
        &self,
        start: ReceiptTime,
        end: ReceiptTime,
    ) -> Result<Vec<CsiFrame>, StoreError> {
        // Text bounds at whole seconds catch rows stored with or without a
        // fractional part; the exact range is applied after parsing.
        let lower = start.format(SECOND_FORMAT).to_string();
        let upper = (end + Duration::seconds(1)).format(SECOND_FORMAT).to_string();

        let rows = {
            let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            let mut stmt = conn.prepare_cached(SQL_SELECT_RANGE)?;
            let rows = stmt
                .query_map(params![lower, upper], RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut frames: Vec<CsiFrame> = rows
            .into_iter()
            .filter_map(RawRow::into_frame)
            .filter(|f| f.received_at >= start && f.received_at <= end)
            .collect();
        frames.sort_by_key(|f| f.received_at);

        log::trace!(
            "Fetched {} frames between {} and {}",
            frames.len(),
            start,
            end
        );
        Ok(frames)
    }

    fn append_frames(&self, frames: &[CsiFrame]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(SQL_INSERT)?;
            for frame in frames {
                let r = &frame.radio;
                stmt.execute(params![
                    format_timestamp(&frame.received_at),
                    frame.station,
                    r.rssi,
                    r.rate,
                    r.noise_floor,
                    r.fft_gain,
                    r.agc_gain,
                    r.channel,
                    r.device_timestamp,
                    r.sig_len,
                    r.rx_state,
                    r.first_word_invalid,
                    serde_json::to_string(&frame.samples)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(frames.len())
    }

    fn time_span(&self) -> Result<Option<(ReceiptTime, ReceiptTime)>, StoreError> {
        // Mixed encodings do not sort as text, so every row is parsed.
        let stamps = {
            let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            let mut stmt = conn.prepare_cached("SELECT id, received_at_utc FROM csi_frame")?;
            let stamps = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            stamps
        };

        let mut span: Option<(ReceiptTime, ReceiptTime)> = None;
        for (id, raw) in stamps {
            let ts = match parse_timestamp(&raw) {
                Ok(ts) => ts,
                Err(e) => {
                    log::warn!("Ignoring stored frame {} for the time span: {}", id, e);
                    continue;
                }
            };
            span = Some(match span {
                Some((first, last)) => (first.min(ts), last.max(ts)),
                None => (ts, ts),
            });
        }
        Ok(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FrameStore;
    use chrono::{NaiveDate, TimeZone};

    fn at(secs: i64, millis: i64) -> ReceiptTime {
        NaiveDate::from_ymd_opt(2025, 4, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
            + Duration::milliseconds(millis)
    }

    fn frame(secs: i64, millis: i64, samples: Vec<i32>) -> CsiFrame {
        CsiFrame {
            received_at: at(secs, millis),
            station: "24:6f:28:aa:bb:cc".to_string(),
            radio: RadioMetadata {
                rssi: -42,
                rate: 11,
                noise_floor: -95,
                fft_gain: 3,
                agc_gain: 30,
                channel: 6,
                device_timestamp: 123_456_789,
                sig_len: 112,
                rx_state: 0,
                first_word_invalid: 0,
            },
            samples,
        }
    }

    #[test]
    fn append_then_fetch_preserves_frames() {
        let store = SqliteStore::open_in_memory().unwrap();
        let written = vec![frame(0, 0, vec![1, -2, 3, -4]), frame(0, 500, vec![5, 6])];
        assert_eq!(store.append_frames(&written).unwrap(), 2);

        let read = store.fetch_frames(at(0, 0), at(1, 0)).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn fetch_respects_fractional_bounds() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .append_frames(&[
                frame(0, 200, vec![1]),
                frame(0, 700, vec![2]),
                frame(1, 100, vec![3]),
                frame(1, 900, vec![4]),
            ])
            .unwrap();

        let read = store.fetch_frames(at(0, 500), at(1, 500)).unwrap();
        let samples: Vec<i32> = read.iter().map(|f| f.samples[0]).collect();
        assert_eq!(samples, vec![2, 3]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_frames(&[frame(0, 0, vec![1, 2])]).unwrap();
        store
            .execute_raw(
                "INSERT INTO csi_frame
                 (received_at_utc, mac, rssi, rate, noise_floor, fft_gain, agc_gain, channel,
                  csi_timestamp, sig_len, rx_state, first_word_invalid, csi_json)
                 VALUES ('2025-04-10 10:00:01', 'x', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 'not json'),
                        ('2025-04-10 10:00:02 junk', 'y', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, '[1,2]'),
                        ('2025-04-10 10:00:03', 'z', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, '[3,4]');",
            )
            .unwrap();

        let read = store.fetch_frames(at(0, 0), at(5, 0)).unwrap();
        assert_eq!(store.count().unwrap(), 4);
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].station, "z");
        assert_eq!(read[1].samples, vec![3, 4]);
    }

    #[test]
    fn time_span_of_stored_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.time_span().unwrap(), None);
        store
            .append_frames(&[frame(4, 0, vec![]), frame(-3, 250, vec![]), frame(9, 0, vec![])])
            .unwrap();
        assert_eq!(store.time_span().unwrap(), Some((at(-3, 250), at(9, 0))));
    }

    fn insert_raw(store: &SqliteStore, received_at: &str, station: &str) {
        store
            .execute_raw(&format!(
                "INSERT INTO csi_frame
                 (received_at_utc, mac, rssi, rate, noise_floor, fft_gain, agc_gain, channel,
                  csi_timestamp, sig_len, rx_state, first_word_invalid, csi_json)
                 VALUES ('{}', '{}', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, '[1,2]');",
                received_at, station
            ))
            .unwrap();
    }

    #[test]
    fn fetch_finds_rows_with_t_separator() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_frames(&[frame(1, 0, vec![1, 2])]).unwrap();
        insert_raw(&store, "2025-04-10T10:00:03", "t-plain");
        insert_raw(&store, "2025-04-10T10:00:04.250", "t-fraction");
        insert_raw(&store, "2025-04-10T10:00:30", "t-late");

        let read = store.fetch_frames(at(0, 0), at(10, 0)).unwrap();
        let stations: Vec<&str> = read.iter().map(|f| f.station.as_str()).collect();
        assert_eq!(stations, vec!["24:6f:28:aa:bb:cc", "t-plain", "t-fraction"]);
        assert_eq!(read[2].received_at, at(4, 250));
    }

    #[test]
    fn fetch_converts_rows_with_offset() {
        let store = SqliteStore::open_in_memory().unwrap();
        let local = at(5, 0);
        let stamp = chrono::Local
            .from_local_datetime(&local)
            .single()
            .unwrap()
            .with_timezone(&chrono::FixedOffset::east_opt(9 * 3600).unwrap())
            .to_rfc3339();
        insert_raw(&store, &stamp, "offset");

        let read = store.fetch_frames(at(0, 0), at(10, 0)).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].received_at, local);
        assert!(store.fetch_frames(at(6, 0), at(10, 0)).unwrap().is_empty());
    }

    #[test]
    fn time_span_orders_mixed_encodings() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_frames(&[frame(2, 0, vec![])]).unwrap();
        insert_raw(&store, "2025-04-10T10:00:07", "late");
        insert_raw(&store, "2025-04-10 09:59:58.500", "early");
        insert_raw(&store, "not a time", "junk");
        assert_eq!(store.time_span().unwrap(), Some((at(-2, 500), at(7, 0))));
    }

    #[test]
    fn opens_database_created_by_the_collector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("csi_data.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE csi_frame (
                    id                INTEGER PRIMARY KEY AUTOINCREMENT,
                    received_at_utc   TEXT    NOT NULL,
                    mac               TEXT    NOT NULL,
                    rssi              INTEGER NOT NULL,
                    rate              INTEGER NOT NULL,
                    noise_floor       INTEGER NOT NULL,
                    fft_gain          INTEGER NOT NULL,
                    agc_gain          INTEGER NOT NULL,
                    channel           INTEGER NOT NULL,
                    csi_timestamp     INTEGER NOT NULL,
                    sig_len           INTEGER NOT NULL,
                    rx_state          INTEGER NOT NULL,
                    first_word_invalid INTEGER NOT NULL,
                    csi_json          TEXT    NOT NULL
                );
                INSERT INTO csi_frame
                (received_at_utc, mac, rssi, rate, noise_floor, fft_gain, agc_gain, channel,
                 csi_timestamp, sig_len, rx_state, first_word_invalid, csi_json)
                VALUES ('2025-04-10T10:00:01.500000', '24:6f:28:00:00:01',
                        -50, 11, -93, 2, 31, 6, 987654, 112, 0, 0, '[4,-4,2,2]');",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        store.append_frames(&[frame(3, 0, vec![7, 8])]).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let read = store.fetch_frames(at(0, 0), at(5, 0)).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].station, "24:6f:28:00:00:01");
        assert_eq!(read[0].received_at, at(1, 500));
        assert_eq!(read[0].radio.device_timestamp, 987_654);
        assert_eq!(read[0].samples, vec![4, -4, 2, 2]);
        assert_eq!(read[1].samples, vec![7, 8]);
    }
}
