use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use sidetree_types::{Operation, QueuedOperation};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::traits::OperationQueue;

/// File name of the queue database inside its directory.
pub const QUEUE_DB_FILE: &str = "queue.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue (
    slot BLOB PRIMARY KEY,
    body BLOB NOT NULL
) WITHOUT ROWID;
"#;

#[derive(Debug, Default)]
struct Cursor {
    head: u64,
    tail: u64,
    closed: bool,
}

/// Operation queue backed by a SQLite database.
///
/// The database is opened in exclusive locking mode and an exclusive lock
/// is taken immediately, so a concurrent open (from this or another
/// process) fails instead of sharing the queue.
///
/// Slot numbers are stored as 8-byte big-endian BLOBs; SQLite compares
/// BLOBs with `memcmp`, which makes key order equal slot order.
pub struct SqliteOperationQueue {
    dir: PathBuf,
    cursor: RwLock<Cursor>,
    conn: Mutex<Option<Connection>>,
}

impl SqliteOperationQueue {
    /// Open (or create) the queue stored in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> QueueResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join(QUEUE_DB_FILE))?;
        conn.busy_timeout(Duration::ZERO)?;
        conn.execute_batch("PRAGMA locking_mode = EXCLUSIVE;")?;
        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;")?;
        conn.execute_batch(SCHEMA)?;

        let first = conn
            .query_row("SELECT slot FROM queue ORDER BY slot ASC LIMIT 1", [], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        let last = conn
            .query_row("SELECT slot FROM queue ORDER BY slot DESC LIMIT 1", [], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;

        let head = first.map(|k| decode_slot(&k)).transpose()?.unwrap_or(0);
        let tail = match last {
            Some(k) => decode_slot(&k)? + 1,
            None => head,
        };

        info!(dir = %dir.display(), head, tail, "opened operation queue");
        Ok(Self {
            dir,
            cursor: RwLock::new(Cursor {
                head,
                tail,
                closed: false,
            }),
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn encode_slot(slot: u64) -> [u8; 8] {
    slot.to_be_bytes()
}

fn decode_slot(key: &[u8]) -> QueueResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| QueueError::CorruptKey(key.to_vec()))?;
    Ok(u64::from_be_bytes(bytes))
}

impl OperationQueue for SqliteOperationQueue {
    fn add(&self, op: &Operation, protocol_genesis_time: u64) -> QueueResult<u64> {
        let record = QueuedOperation::new(op.clone(), protocol_genesis_time);
        let body =
            bincode::serialize(&record).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut cursor = self.cursor.write();
        if cursor.closed {
            return Err(QueueError::Closed);
        }
        let conn = self.conn.lock();
        let conn = conn.as_ref().ok_or(QueueError::Closed)?;
        conn.execute(
            "INSERT INTO queue (slot, body) VALUES (?1, ?2)",
            params![encode_slot(cursor.tail).as_slice(), body],
        )?;
        cursor.tail += 1;

        let len = cursor.tail - cursor.head;
        debug!(suffix = op.unique_suffix(), slot = cursor.tail - 1, len, "queued operation");
        Ok(len)
    }

    fn peek(&self, n: usize) -> QueueResult<Vec<QueuedOperation>> {
        // Reads take the exclusive lock too; the connection is not shareable.
        let cursor = self.cursor.write();
        if cursor.closed {
            return Err(QueueError::Closed);
        }
        let to = cursor.head.saturating_add(n as u64).min(cursor.tail);
        if to <= cursor.head {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let conn = conn.as_ref().ok_or(QueueError::Closed)?;
        let mut stmt =
            conn.prepare("SELECT body FROM queue WHERE slot >= ?1 AND slot < ?2 ORDER BY slot")?;
        let bodies = stmt
            .query_map(
                params![encode_slot(cursor.head).as_slice(), encode_slot(to).as_slice()],
                |row| row.get::<_, Vec<u8>>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| {
                bincode::deserialize(b).map_err(|e| QueueError::Serialization(e.to_string()))
            })
            .collect()
    }

    fn remove(&self, n: usize) -> QueueResult<(usize, u64)> {
        let mut cursor = self.cursor.write();
        if cursor.closed {
            return Err(QueueError::Closed);
        }
        let to = cursor.head.saturating_add(n as u64).min(cursor.tail);
        if to <= cursor.head {
            return Ok((0, cursor.tail - cursor.head));
        }

        let conn = self.conn.lock();
        let conn = conn.as_ref().ok_or(QueueError::Closed)?;
        let removed = conn.execute(
            "DELETE FROM queue WHERE slot >= ?1 AND slot < ?2",
            params![encode_slot(cursor.head).as_slice(), encode_slot(to).as_slice()],
        )?;
        cursor.head = to;

        let len = cursor.tail - cursor.head;
        debug!(removed, len, "removed operations from queue");
        Ok((removed, len))
    }

    fn len(&self) -> u64 {
        let cursor = self.cursor.read();
        if cursor.closed {
            warn!(dir = %self.dir.display(), "length requested on closed queue");
            return 0;
        }
        cursor.tail - cursor.head
    }

    fn close(&self) -> QueueResult<()> {
        let mut cursor = self.cursor.write();
        if cursor.closed {
            return Err(QueueError::Closed);
        }
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| QueueError::Database(e))?;
        }
        cursor.closed = true;
        info!(dir = %self.dir.display(), "closed operation queue");
        Ok(())
    }

    fn destroy(&self) -> QueueResult<()> {
        let cursor = self.cursor.read();
        if !cursor.closed {
            return Err(QueueError::NotClosed);
        }
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        info!(dir = %self.dir.display(), "deleted operation queue storage");
        Ok(())
    }
}
