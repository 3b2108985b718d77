//! Database initialization
//!
//! Both `slb-host` and `slb-web` call [`init_database`] on the same file. Every
//! statement here is idempotent, so whichever process starts first creates the
//! schema and the other simply opens it.
//!
//! A database file that SQLite refuses to read (truncated, overwritten, not a
//! database at all) is moved aside and replaced with an empty one. The scan
//! state is a coordination mailbox, so starting empty is the documented
//! recovery; the quarantined file is kept for manual inspection.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Schema version written by this release
pub const SCHEMA_VERSION: i64 = 1;

/// How long a writer waits for the other process to release the write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let newly_created = !db_path.exists();

    let pool = match open_and_prepare(db_path).await {
        Ok(pool) => pool,
        Err(Error::Database(e)) if is_corruption(&e) => {
            let moved_to = quarantine(db_path)?;
            warn!(
                "{}",
                Error::StoreUnreadable(format!(
                    "{} ({}); moved to {} and starting with an empty store",
                    db_path.display(),
                    e,
                    moved_to.display()
                ))
            );
            open_and_prepare(db_path).await?
        }
        Err(e) => return Err(e),
    };

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}

async fn open_and_prepare(db_path: &Path) -> Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    // WAL lets the web side read the scan table while the host holds the
    // write lock; busy_timeout makes cross-process writers queue instead of
    // failing immediately.
    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    create_schema_version_table(&pool).await?;
    create_scan_status_table(&pool).await?;
    create_samples_table(&pool).await?;
    create_archived_samples_table(&pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&pool)
        .await?;

    Ok(pool)
}

/// SQLITE_CORRUPT (11) and SQLITE_NOTADB (26), including extended codes
fn is_corruption(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let primary = db_err
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| c & 0xff);
            matches!(primary, Some(11) | Some(26))
                || db_err.message().contains("file is not a database")
                || db_err.message().contains("malformed")
        }
        _ => false,
    }
}

/// Move an unreadable database (and its WAL side files) out of the way
fn quarantine(db_path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let target = PathBuf::from(format!("{}.corrupt-{}", db_path.display(), stamp));
    std::fs::rename(db_path, &target)?;

    for suffix in ["-wal", "-shm"] {
        let side = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if side.exists() {
            let _ = std::fs::remove_file(&side);
        }
    }

    Ok(target)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the scan_status table
///
/// One row per tag identifier ever seen. External readers may poll this
/// table directly; flags are stored as 0/1 integers.
pub async fn create_scan_status_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_status (
            uid TEXT PRIMARY KEY,
            host_scanning INTEGER NOT NULL DEFAULT 0 CHECK (host_scanning IN (0, 1)),
            web_acknowledged INTEGER NOT NULL DEFAULT 0 CHECK (web_acknowledged IN (0, 1)),
            pending_enrollment INTEGER NOT NULL DEFAULT 0 CHECK (pending_enrollment IN (0, 1)),
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the samples table (active Tag Registry entries)
pub async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            uid TEXT PRIMARY KEY,
            sample_id TEXT NOT NULL,
            field_number TEXT NOT NULL,
            project_number TEXT NOT NULL,
            sampled_by TEXT NOT NULL,
            tested_by TEXT NOT NULL,
            tests_run TEXT NOT NULL,
            date_received TEXT NOT NULL,
            enrolled_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the archived_samples table
pub async fn create_archived_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archived_samples (
            uid TEXT PRIMARY KEY,
            sample_id TEXT NOT NULL,
            field_number TEXT NOT NULL,
            project_number TEXT NOT NULL,
            sampled_by TEXT NOT NULL,
            tested_by TEXT NOT NULL,
            tests_run TEXT NOT NULL,
            date_received TEXT NOT NULL,
            archived_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
