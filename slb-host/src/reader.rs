//! Tag reader backends
//!
//! The poller talks to the hardware through [`TagReader`]. One poll either
//! yields a tag identifier or nothing within the given timeout.
//!
//! - [`LineReader`]: one identifier per text line, from stdin or a file/FIFO.
//!   This is the bridge to external NFC tooling (`nfc-poll`, a PN532 script)
//!   that prints UIDs as hex.
//! - [`ScriptedReader`]: reads fed from memory, for simulation and tests.

use crate::error::ReaderError;
use async_trait::async_trait;
use slb_common::TagId;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// A source of tag detections
#[async_trait]
pub trait TagReader: Send {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Wait up to `timeout` for one tag
    ///
    /// `Ok(None)` means no tag was presented in time.
    async fn poll_once(&mut self, timeout: Duration) -> Result<Option<TagId>, ReaderError>;
}

#[async_trait]
impl<T: TagReader + ?Sized> TagReader for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn poll_once(&mut self, timeout: Duration) -> Result<Option<TagId>, ReaderError> {
        (**self).poll_once(timeout).await
    }
}

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Reads hex identifiers, one per line
///
/// Blank lines are "no tag". Lines that are not a valid identifier are logged
/// and also treated as "no tag".
pub struct LineReader {
    lines: Lines<LineSource>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Read from a file or named pipe
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let source: LineSource = Box::new(reader);
        Self {
            lines: source.lines(),
        }
    }
}

#[async_trait]
impl TagReader for LineReader {
    fn name(&self) -> &'static str {
        "line"
    }

    async fn poll_once(&mut self, timeout: Duration) -> Result<Option<TagId>, ReaderError> {
        // next_line is cancel safe: a partial line stays buffered for the next poll
        let line = match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => return Ok(None),
            Ok(line) => line?,
        };

        let Some(line) = line else {
            return Err(ReaderError::Closed);
        };

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        match TagId::parse(line) {
            Ok(id) => {
                trace!("Reader line {:?} -> {}", line, id);
                Ok(Some(id))
            }
            Err(e) => {
                warn!("Ignoring reader line {:?}: {}", line, e);
                Ok(None)
            }
        }
    }
}

type ScriptedRead = Result<TagId, ReaderError>;

/// Handle for feeding reads into a [`ScriptedReader`]
#[derive(Clone)]
pub struct ScriptedFeed {
    tx: mpsc::UnboundedSender<ScriptedRead>,
}

impl ScriptedFeed {
    /// Present a tag to the reader. Returns false once the reader is gone.
    pub fn present(&self, id: TagId) -> bool {
        self.tx.send(Ok(id)).is_ok()
    }

    /// Make the next poll fail with `error`, like a flaky device or a closed pipe
    pub fn fail(&self, error: ReaderError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// In-memory reader
///
/// Each queued read (identifier or failure) is returned by exactly one poll,
/// in order. With nothing queued a poll waits out its timeout, like a reader
/// with no tag in the field.
pub struct ScriptedReader {
    queued: VecDeque<ScriptedRead>,
    rx: mpsc::UnboundedReceiver<ScriptedRead>,
    feed_open: bool,
}

impl ScriptedReader {
    /// A reader plus the handle that feeds it
    pub fn channel() -> (Self, ScriptedFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Self {
            queued: VecDeque::new(),
            rx,
            feed_open: true,
        };
        (reader, ScriptedFeed { tx })
    }

    /// A reader that replays a fixed list of reads and then sees nothing
    pub fn from_reads(reads: impl IntoIterator<Item = TagId>) -> Self {
        let (mut reader, _feed) = Self::channel();
        reader.queued.extend(reads.into_iter().map(Ok));
        reader
    }
}

#[async_trait]
impl TagReader for ScriptedReader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn poll_once(&mut self, timeout: Duration) -> Result<Option<TagId>, ReaderError> {
        if let Some(read) = self.queued.pop_front() {
            return read.map(Some);
        }

        if !self.feed_open {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(read)) => read.map(Some),
            Ok(None) => {
                self.feed_open = false;
                Ok(None)
            }
        }
    }
}
