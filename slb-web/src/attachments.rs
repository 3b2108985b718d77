//! Per-sample attachments: uploaded files and notes
//!
//! Layout: `<root>/samples/<UID>/`, one folder per tag. Notes are appended to
//! `notes.txt` in that folder, one `[<timestamp>] <note>` line each.

use serde::Serialize;
use slb_common::{Error, Result, TagId};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const NOTES_FILE_NAME: &str = "notes.txt";

/// Files and notes stored for one sample
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleAttachments {
    pub files: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Attachments {
    root: PathBuf,
}

impl Attachments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sample_dir(&self, uid: &TagId) -> PathBuf {
        self.root.join(uid.as_str())
    }

    /// Everything stored for `uid`; empty if nothing was ever stored
    pub async fn list(&self, uid: &TagId) -> Result<SampleAttachments> {
        let dir = self.sample_dir(uid);
        let mut attachments = SampleAttachments::default();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(attachments),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != NOTES_FILE_NAME {
                attachments.files.push(name);
            }
        }
        attachments.files.sort();

        match tokio::fs::read_to_string(dir.join(NOTES_FILE_NAME)).await {
            Ok(notes) => {
                attachments.notes = notes
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(attachments)
    }

    /// Append a timestamped note; returns the stored line
    pub async fn append_note(&self, uid: &TagId, note: &str) -> Result<String> {
        let note = note.split_whitespace().collect::<Vec<_>>().join(" ");
        if note.is_empty() {
            return Err(Error::InvalidInput("note is empty".to_string()));
        }

        let dir = self.sample_dir(uid);
        tokio::fs::create_dir_all(&dir).await?;

        let line = format!("[{}] {}", slb_common::time::display_now(), note);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(NOTES_FILE_NAME))
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;

        Ok(line)
    }

    /// Store an uploaded file under its sanitized name; returns that name
    pub async fn save_file(&self, uid: &TagId, file_name: &str, contents: &[u8]) -> Result<String> {
        let name = sanitize_file_name(file_name)?;
        let dir = self.sample_dir(uid);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), contents).await?;

        info!("Stored attachment {} for {} ({} bytes)", name, uid, contents.len());
        Ok(name)
    }

    /// Path of an existing attachment
    ///
    /// Names that would not survive sanitizing are rejected, so a request can
    /// never leave the sample folder.
    pub async fn file_path(&self, uid: &TagId, file_name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(file_name)?;
        if name != file_name {
            return Err(Error::InvalidInput(format!("invalid file name {:?}", file_name)));
        }

        let path = self.sample_dir(uid).join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(Error::NotFound(format!("attachment {}", file_name))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("attachment {}", file_name)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduce a client-supplied file name to a safe single path component
///
/// Directory parts are dropped, spaces become `_`, and anything other than
/// ASCII letters, digits, `.`, `-` and `_` is removed. Leading dots are
/// stripped. The notes file name is reserved.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c),
            '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        return Err(Error::InvalidInput(format!("unusable file name {:?}", name)));
    }
    if cleaned == NOTES_FILE_NAME {
        return Err(Error::InvalidInput(format!("{} is reserved", NOTES_FILE_NAME)));
    }
    Ok(cleaned)
}
