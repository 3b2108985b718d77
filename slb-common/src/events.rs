//! Event types for the Sample Log Book event system
//!
//! Events describe handshake and catalog changes as the web process observes
//! them. They are broadcast on an [`EventBus`] and streamed to browsers over
//! SSE; nothing depends on an event being delivered.

use crate::tag::TagId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Scan and catalog events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// An unknown tag is waiting for the operator
    ///
    /// Triggers:
    /// - UI: show the "New Sample Detected" prompt
    EnrollmentRequested {
        uid: TagId,
        timestamp: DateTime<Utc>,
    },

    /// The pending tag was enrolled and acknowledged
    EnrollmentCompleted {
        uid: TagId,
        sample_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The tag is no longer awaiting enrollment (answered or abandoned)
    EnrollmentPromptCleared {
        uid: TagId,
        timestamp: DateTime<Utc>,
    },

    /// Host started or stopped reporting a tag as present
    ///
    /// Triggers:
    /// - UI: highlight the matching sample row
    TagPresenceChanged {
        uid: TagId,
        present: bool,
        timestamp: DateTime<Utc>,
    },

    /// A sample moved to the archive
    SampleArchived {
        uid: TagId,
        sample_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EnrollmentRequested { .. } => "EnrollmentRequested",
            Self::EnrollmentCompleted { .. } => "EnrollmentCompleted",
            Self::EnrollmentPromptCleared { .. } => "EnrollmentPromptCleared",
            Self::TagPresenceChanged { .. } => "TagPresenceChanged",
            Self::SampleArchived { .. } => "SampleArchived",
        }
    }

    /// Tag the event is about
    pub fn uid(&self) -> &TagId {
        match self {
            Self::EnrollmentRequested { uid, .. }
            | Self::EnrollmentCompleted { uid, .. }
            | Self::EnrollmentPromptCleared { uid, .. }
            | Self::TagPresenceChanged { uid, .. }
            | Self::SampleArchived { uid, .. } => uid,
        }
    }
}

/// Broadcast bus for [`ScanEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
