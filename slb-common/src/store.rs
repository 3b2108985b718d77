//! Scan State Store
//!
//! The shared table through which the host poller and the web interface
//! coordinate, one [`ScanRecord`] per tag identifier. Both processes read it
//! freely; writes follow a single-writer discipline:
//!
//! - Inside a process, every mutation is sent over a channel to one writer
//!   task, which applies requests strictly one at a time.
//! - Each request runs as one SQLite transaction that takes the write lock
//!   before reading the row, so the writer task of the *other* process queues
//!   behind it (busy timeout) instead of working on a stale copy.
//!
//! A mutation therefore always sees the latest committed record, and two
//! concurrent mutations of the same record both land. Callers never write a
//! whole-table snapshot back.

use crate::handshake::ScanMutation;
use crate::tag::TagId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Requests queued ahead of the writer before senders start waiting
const WRITER_QUEUE_CAPACITY: usize = 64;

/// One row of the scan state table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRecord {
    pub id: TagId,
    /// Host considers the tag present and is handling it
    pub host_scanning: bool,
    /// Web has persisted the tag's data (transient pulse)
    pub web_acknowledged: bool,
    /// Tag is unknown to the registry and owes an enrollment prompt
    pub pending_enrollment: bool,
    pub updated_at: DateTime<Utc>,
}

impl ScanRecord {
    /// A freshly seen tag: all flags clear
    pub fn new(id: TagId) -> Self {
        Self {
            id,
            host_scanning: false,
            web_acknowledged: false,
            pending_enrollment: false,
            updated_at: Utc::now(),
        }
    }

    /// True when no flag is set
    pub fn is_idle(&self) -> bool {
        !self.host_scanning && !self.web_acknowledged && !self.pending_enrollment
    }
}

type Mutator = Box<dyn FnOnce(&mut ScanRecord) -> Result<()> + Send>;

enum WriteCommand {
    Upsert {
        id: TagId,
        mutator: Mutator,
        reply: oneshot::Sender<Result<ScanRecord>>,
    },
}

/// Handle to the scan state table
///
/// Cheap to clone; all clones share the same writer task.
#[derive(Clone)]
pub struct ScanStateStore {
    pool: SqlitePool,
    writer: mpsc::Sender<WriteCommand>,
}

impl ScanStateStore {
    /// Start the writer task for this process
    ///
    /// Must be called from within a tokio runtime. The writer stops once the
    /// last handle is dropped.
    pub fn spawn(pool: SqlitePool) -> Self {
        let (writer, rx) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        tokio::spawn(writer_loop(pool.clone(), rx));
        Self { pool, writer }
    }

    /// Current record for `id`, or `None` if the tag was never seen
    pub async fn get(&self, id: &TagId) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(
            "SELECT uid, host_scanning, web_acknowledged, pending_enrollment, updated_at \
             FROM scan_status WHERE uid = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Full-table snapshot ordered by identifier
    pub async fn scan_all(&self) -> Result<Vec<ScanRecord>> {
        let rows = sqlx::query(
            "SELECT uid, host_scanning, web_acknowledged, pending_enrollment, updated_at \
             FROM scan_status ORDER BY uid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// The record currently awaiting enrollment, if any
    ///
    /// Oldest first, as in [`prompt_target`](crate::handshake::prompt_target).
    pub async fn pending(&self) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(
            "SELECT uid, host_scanning, web_acknowledged, pending_enrollment, updated_at \
             FROM scan_status WHERE pending_enrollment = 1 ORDER BY updated_at, uid LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Read-modify-write the record for `id`, creating it if absent
    pub async fn upsert<F>(&self, id: &TagId, mutator: F) -> Result<ScanRecord>
    where
        F: FnOnce(&mut ScanRecord) + Send + 'static,
    {
        self.try_upsert(id, move |record| {
            mutator(record);
            Ok(())
        })
        .await
    }

    /// Like [`upsert`](Self::upsert), but the mutator may refuse
    ///
    /// A refusal rolls the transaction back: a missing record is not created
    /// and an existing one is left untouched.
    pub async fn try_upsert<F>(&self, id: &TagId, mutator: F) -> Result<ScanRecord>
    where
        F: FnOnce(&mut ScanRecord) -> Result<()> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.writer
            .send(WriteCommand::Upsert {
                id: id.clone(),
                mutator: Box::new(mutator),
                reply,
            })
            .await
            .map_err(|_| Error::StoreClosed)?;

        response.await.map_err(|_| Error::StoreClosed)?
    }

    /// Apply a handshake mutation to the record for `id`
    pub async fn apply(&self, id: &TagId, mutation: ScanMutation) -> Result<ScanRecord> {
        trace!("Applying {:?} to {}", mutation, id);
        self.try_upsert(id, move |record| mutation.apply(record)).await
    }

    /// Make sure a record exists for each identifier (flags untouched)
    pub async fn ensure_records(&self, ids: &[TagId]) -> Result<usize> {
        let mut created = 0;
        for id in ids {
            if self.get(id).await?.is_none() {
                self.upsert(id, |_| {}).await?;
                created += 1;
            }
        }
        Ok(created)
    }
}

async fn writer_loop(pool: SqlitePool, mut rx: mpsc::Receiver<WriteCommand>) {
    debug!("Scan state writer started");

    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Upsert { id, mutator, reply } => {
                let result = apply_upsert(&pool, &id, mutator).await;
                if let Err(e) = &result {
                    match e {
                        // Refusals are part of the protocol, not failures
                        Error::UnknownAcknowledgmentTarget { .. } | Error::InvalidInput(_) => {
                            debug!("Mutation of {} refused: {}", id, e)
                        }
                        _ => warn!("Scan state write for {} failed: {}", id, e),
                    }
                }
                // The requester may have gone away; the write stands either way
                let _ = reply.send(result);
            }
        }
    }

    debug!("Scan state writer stopped");
}

async fn apply_upsert(pool: &SqlitePool, id: &TagId, mutator: Mutator) -> Result<ScanRecord> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    // Writing first takes the database write lock before the row is read
    sqlx::query("INSERT OR IGNORE INTO scan_status (uid, updated_at) VALUES (?, ?)")
        .bind(id.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query(
        "SELECT uid, host_scanning, web_acknowledged, pending_enrollment, updated_at \
         FROM scan_status WHERE uid = ?",
    )
    .bind(id.as_str())
    .fetch_one(&mut *tx)
    .await?;

    let mut record = record_from_row(&row)?;
    // Dropping `tx` on error rolls back, including the insert above
    mutator(&mut record)?;
    record.id = id.clone();
    record.updated_at = now;

    sqlx::query(
        "UPDATE scan_status \
         SET host_scanning = ?, web_acknowledged = ?, pending_enrollment = ?, updated_at = ? \
         WHERE uid = ?",
    )
    .bind(record.host_scanning)
    .bind(record.web_acknowledged)
    .bind(record.pending_enrollment)
    .bind(record.updated_at)
    .bind(id.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(record)
}

fn record_from_row(row: &SqliteRow) -> Result<ScanRecord> {
    let unreadable = |e: sqlx::Error| Error::StoreUnreadable(e.to_string());

    let uid: String = row.try_get("uid").map_err(unreadable)?;
    let id = TagId::parse(&uid)
        .map_err(|e| Error::StoreUnreadable(format!("scan_status.uid {:?}: {}", uid, e)))?;

    Ok(ScanRecord {
        id,
        host_scanning: row.try_get("host_scanning").map_err(unreadable)?,
        web_acknowledged: row.try_get("web_acknowledged").map_err(unreadable)?,
        pending_enrollment: row.try_get("pending_enrollment").map_err(unreadable)?,
        updated_at: row.try_get("updated_at").map_err(unreadable)?,
    })
}
