//! Tag Registry: enrolled samples and the archive
//!
//! The registry is the durable mapping from tag identifier to sample metadata.
//! The host only asks "is this tag known"; the web enrolls new samples and
//! archives old ones. Archived tags still count as enrolled, so a tag can be
//! enrolled at most once over its whole life.
//!
//! Writes are single statements (or a transaction that writes first), so the
//! SQLite write lock is taken before anything is read and the host and web
//! processes cannot interleave an enrollment.

use crate::tag::TagId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Operator-supplied sample metadata
///
/// The short aliases match the field names of the legacy enrollment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    #[serde(alias = "ID")]
    pub sample_id: String,
    #[serde(alias = "FID")]
    pub field_number: String,
    #[serde(alias = "PID")]
    pub project_number: String,
    #[serde(alias = "SB")]
    pub sampled_by: String,
    #[serde(alias = "TB")]
    pub tested_by: String,
    #[serde(alias = "TR")]
    pub tests_run: String,
}

impl SampleMetadata {
    /// Trim every field and reject blanks
    pub fn validated(self) -> Result<Self> {
        let fields = [
            ("sample_id", self.sample_id),
            ("field_number", self.field_number),
            ("project_number", self.project_number),
            ("sampled_by", self.sampled_by),
            ("tested_by", self.tested_by),
            ("tests_run", self.tests_run),
        ];

        let mut trimmed = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(Error::InvalidInput(format!("{} is required", name)));
            }
            trimmed.push(value);
        }

        let mut it = trimmed.into_iter();
        // Order matches the array above
        Ok(Self {
            sample_id: it.next().unwrap_or_default(),
            field_number: it.next().unwrap_or_default(),
            project_number: it.next().unwrap_or_default(),
            sampled_by: it.next().unwrap_or_default(),
            tested_by: it.next().unwrap_or_default(),
            tests_run: it.next().unwrap_or_default(),
        })
    }
}

/// A registry row: an enrolled (or archived) sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub uid: TagId,
    #[serde(flatten)]
    pub metadata: SampleMetadata,
    pub date_received: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

impl Sample {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

const ACTIVE_COLUMNS: &str =
    "uid, sample_id, field_number, project_number, sampled_by, tested_by, tests_run, date_received, NULL AS archived_at";
const ARCHIVED_COLUMNS: &str =
    "uid, sample_id, field_number, project_number, sampled_by, tested_by, tests_run, date_received, archived_at";

/// Durable tag → sample mapping
#[derive(Clone)]
pub struct TagRegistry {
    pool: SqlitePool,
}

impl TagRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// True if the tag is enrolled, active or archived
    pub async fn exists(&self, id: &TagId) -> Result<bool> {
        let known: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM samples WHERE uid = ?1)
                OR EXISTS(SELECT 1 FROM archived_samples WHERE uid = ?1)
            "#,
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(known)
    }

    /// Look up a tag, preferring the active row over the archive
    pub async fn lookup(&self, id: &TagId) -> Result<Option<Sample>> {
        let active = sqlx::query(&format!("SELECT {} FROM samples WHERE uid = ?", ACTIVE_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = active {
            return sample_from_row(&row).map(Some);
        }

        let archived = sqlx::query(&format!(
            "SELECT {} FROM archived_samples WHERE uid = ?",
            ARCHIVED_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        archived.as_ref().map(sample_from_row).transpose()
    }

    /// Enroll a new sample under `id`
    ///
    /// Fails with [`Error::RegistryWriteConflict`] if the tag is already
    /// enrolled or archived; nothing is written in that case.
    pub async fn enroll(&self, id: &TagId, metadata: SampleMetadata) -> Result<Sample> {
        let metadata = metadata.validated()?;
        let date_received = crate::time::display_now();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO samples
                (uid, sample_id, field_number, project_number, sampled_by, tested_by, tests_run, date_received)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE NOT EXISTS (SELECT 1 FROM archived_samples WHERE uid = ?1)
            "#,
        )
        .bind(id.as_str())
        .bind(&metadata.sample_id)
        .bind(&metadata.field_number)
        .bind(&metadata.project_number)
        .bind(&metadata.sampled_by)
        .bind(&metadata.tested_by)
        .bind(&metadata.tests_run)
        .bind(&date_received)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RegistryWriteConflict(id.clone()));
        }

        info!("Enrolled tag {} as sample {}", id, metadata.sample_id);

        Ok(Sample {
            uid: id.clone(),
            metadata,
            date_received,
            archived_at: None,
        })
    }

    /// Active samples in enrollment order
    pub async fn list_active(&self) -> Result<Vec<Sample>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM samples ORDER BY enrolled_at, rowid",
            ACTIVE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sample_from_row).collect()
    }

    /// Archived samples in archival order
    pub async fn list_archived(&self) -> Result<Vec<Sample>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM archived_samples ORDER BY rowid",
            ARCHIVED_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sample_from_row).collect()
    }

    /// Every enrolled identifier, active and archived
    pub async fn enrolled_ids(&self) -> Result<Vec<TagId>> {
        let uids: Vec<String> = sqlx::query_scalar(
            "SELECT uid FROM samples UNION SELECT uid FROM archived_samples ORDER BY uid",
        )
        .fetch_all(&self.pool)
        .await?;

        uids.iter()
            .map(|u| TagId::parse(u).map_err(|e| Error::StoreUnreadable(format!("samples.uid {:?}: {}", u, e))))
            .collect()
    }

    /// Move an active sample to the archive
    pub async fn archive(&self, id: &TagId) -> Result<Sample> {
        let archived_at = crate::time::display_now();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before reading
        let moved = sqlx::query(
            r#"
            INSERT OR IGNORE INTO archived_samples
                (uid, sample_id, field_number, project_number, sampled_by, tested_by, tests_run, date_received, archived_at)
            SELECT uid, sample_id, field_number, project_number, sampled_by, tested_by, tests_run, date_received, ?
            FROM samples WHERE uid = ?
            "#,
        )
        .bind(&archived_at)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            return Err(Error::NotFound(format!("active sample {}", id)));
        }

        sqlx::query("DELETE FROM samples WHERE uid = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM archived_samples WHERE uid = ?",
            ARCHIVED_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let sample = sample_from_row(&row)?;

        tx.commit().await?;

        info!("Archived sample {} (tag {})", sample.metadata.sample_id, id);
        Ok(sample)
    }
}

fn sample_from_row(row: &SqliteRow) -> Result<Sample> {
    let uid: String = row.try_get("uid")?;
    let uid = TagId::parse(&uid)
        .map_err(|e| Error::StoreUnreadable(format!("sample uid {:?}: {}", uid, e)))?;

    Ok(Sample {
        uid,
        metadata: SampleMetadata {
            sample_id: row.try_get("sample_id")?,
            field_number: row.try_get("field_number")?,
            project_number: row.try_get("project_number")?,
            sampled_by: row.try_get("sampled_by")?,
            tested_by: row.try_get("tested_by")?,
            tests_run: row.try_get("tests_run")?,
        },
        date_received: row.try_get("date_received")?,
        archived_at: row.try_get("archived_at")?,
    })
}
