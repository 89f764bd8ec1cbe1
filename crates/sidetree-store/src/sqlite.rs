//! SQLite-backed operation store.
//!
//! One table per database, one database per namespace. Rows are keyed by
//! the content address of the operation, so `INSERT OR IGNORE` gives
//! idempotent puts and the ordering columns give ordered reads.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use sidetree_types::AnchoredOperation;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::opstore::{operation_key, OperationStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS operations (
    op_key             TEXT PRIMARY KEY,
    unique_suffix      TEXT NOT NULL,
    transaction_time   INTEGER NOT NULL,
    transaction_number INTEGER NOT NULL,
    operation_index    INTEGER NOT NULL,
    body               BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_operations_suffix
    ON operations (unique_suffix, transaction_time, transaction_number, operation_index);
"#;

/// Operation store persisted in a SQLite database.
pub struct SqliteOperationStore {
    conn: Mutex<Connection>,
}

impl SqliteOperationStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn len(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().expect("lock poisoned");
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn put(&self, ops: &[AnchoredOperation]) -> StoreResult<()> {
        let mut rows = Vec::with_capacity(ops.len());
        for op in ops {
            let body =
                serde_json::to_vec(op).map_err(|e| StoreError::Serialization(e.to_string()))?;
            rows.push((operation_key(op)?, op, body));
        }

        let mut conn = self.conn.lock().expect("lock poisoned");
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO operations
                 (op_key, unique_suffix, transaction_time, transaction_number,
                  operation_index, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (key, op, body) in &rows {
                inserted += stmt.execute(params![
                    key,
                    op.unique_suffix,
                    op.transaction_time as i64,
                    op.transaction_number as i64,
                    op.operation_index as i64,
                    body,
                ])?;
            }
        }
        tx.commit()?;
        debug!(offered = ops.len(), inserted, "stored anchored operations");
        Ok(())
    }

    async fn get(&self, unique_suffix: &str) -> StoreResult<Vec<AnchoredOperation>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT body FROM operations WHERE unique_suffix = ?1
             ORDER BY transaction_time, transaction_number, operation_index",
        )?;
        let bodies = stmt
            .query_map(params![unique_suffix], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if bodies.is_empty() {
            return Err(StoreError::SuffixNotFound(unique_suffix.to_string()));
        }
        bodies
            .iter()
            .map(|b| {
                serde_json::from_slice(b).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidetree_types::OperationType;

    fn anchored(suffix: &str, time: u64, number: u64, index: u32) -> AnchoredOperation {
        AnchoredOperation {
            unique_suffix: suffix.into(),
            op_type: OperationType::Recover,
            namespace: "did:sidetree".into(),
            payload: vec![time as u8, number as u8, index as u8],
            transaction_time: time,
            transaction_number: number,
            operation_index: index,
            protocol_genesis_time: 0,
        }
    }

    #[tokio::test]
    async fn ordered_and_idempotent() {
        let store = SqliteOperationStore::in_memory().unwrap();
        let ops = vec![
            anchored("abc", 9, 0, 0),
            anchored("abc", 3, 2, 0),
            anchored("abc", 3, 1, 4),
            anchored("def", 1, 0, 0),
        ];
        store.put(&ops).await.unwrap();
        store.put(&ops).await.unwrap();
        assert_eq!(store.len().unwrap(), 4);

        let got = store.get("abc").await.unwrap();
        let keys: Vec<_> = got.iter().map(AnchoredOperation::ordering_key).collect();
        assert_eq!(keys, vec![(3, 1, 4), (3, 2, 0), (9, 0, 0)]);
        assert_eq!(got[0], ops[2]);
    }

    #[tokio::test]
    async fn unknown_suffix_not_found() {
        let store = SqliteOperationStore::in_memory().unwrap();
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::SuffixNotFound(_))
        ));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.db");
        {
            let store = SqliteOperationStore::open(&path).unwrap();
            store.put(&[anchored("abc", 1, 0, 0)]).await.unwrap();
        }
        let store = SqliteOperationStore::open(&path).unwrap();
        assert_eq!(store.get("abc").await.unwrap().len(), 1);
    }
}
