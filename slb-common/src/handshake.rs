//! Handshake Protocol
//!
//! The per-tag state machine shared by the host poller and the web interface:
//!
//! ```text
//! Unseen ─► Detected ─┬─► KnownDisplay ──(dwell elapsed)──────────────► Idle
//!                     └─► PendingEnrollment ─(web)─► Acknowledged ─(host)─► Idle
//!                              │
//!                              └─(enrollment timeout, host)─► Unseen-equivalent
//! ```
//!
//! `Detected` only exists inside the host between reading a tag and writing
//! the store. Every other transition is one [`ScanMutation`] applied through
//! [`ScanStateStore::apply`](crate::store::ScanStateStore::apply).

use crate::registry::{Sample, TagRegistry};
use crate::store::ScanRecord;
use crate::tag::TagId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Externally visible handshake phase of one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakePhase {
    /// No record: never detected
    Unseen,
    /// Record exists, nothing in flight
    Idle,
    /// Known tag currently present
    KnownDisplay,
    /// Unknown tag waiting for the operator
    PendingEnrollment,
    /// Web has enrolled the tag; host has not yet reset the record
    Acknowledged,
}

impl HandshakePhase {
    pub fn of(record: Option<&ScanRecord>) -> Self {
        match record {
            None => Self::Unseen,
            Some(r) if r.web_acknowledged => Self::Acknowledged,
            Some(r) if r.pending_enrollment => Self::PendingEnrollment,
            Some(r) if r.host_scanning => Self::KnownDisplay,
            Some(_) => Self::Idle,
        }
    }
}

/// A single step of the handshake, applied to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMutation {
    /// Host: a known tag is present
    MarkPresent,
    /// Host: an unknown tag is present and needs enrollment
    RequestEnrollment,
    /// Web: the pending tag has been written to the registry
    Acknowledge,
    /// Web: delayed reset of the acknowledgment pulse
    ClearAcknowledgment,
    /// Host: acknowledgment observed, return to idle
    ResolveAcknowledged,
    /// Host: dwell elapsed without re-detection
    ClearPresence,
    /// Host: nobody answered the enrollment prompt in time
    Abandon,
}

impl ScanMutation {
    pub fn apply(self, record: &mut ScanRecord) -> Result<()> {
        match self {
            Self::MarkPresent => {
                record.host_scanning = true;
            }
            Self::RequestEnrollment => {
                record.host_scanning = true;
                record.pending_enrollment = true;
                // A leftover pulse from an earlier cycle must not read as an answer
                record.web_acknowledged = false;
            }
            Self::Acknowledge => {
                if !record.pending_enrollment {
                    return Err(Error::UnknownAcknowledgmentTarget {
                        target: record.id.clone(),
                        pending: None,
                    });
                }
                record.web_acknowledged = true;
                record.pending_enrollment = false;
            }
            Self::ClearAcknowledgment => {
                record.web_acknowledged = false;
            }
            Self::ResolveAcknowledged => {
                record.host_scanning = false;
                record.web_acknowledged = false;
                record.pending_enrollment = false;
            }
            Self::ClearPresence => {
                record.host_scanning = false;
            }
            Self::Abandon => {
                record.host_scanning = false;
                record.pending_enrollment = false;
            }
        }
        Ok(())
    }
}

/// Outcome of looking up a freshly read tag in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Known(Box<Sample>),
    Unknown,
}

impl Detection {
    /// Query the registry now, so out-of-band enrollments and archivals are seen
    pub async fn classify(id: &TagId, registry: &TagRegistry) -> Result<Self> {
        Ok(match registry.lookup(id).await? {
            Some(sample) => Self::Known(Box::new(sample)),
            None => Self::Unknown,
        })
    }

    /// The mutation the host applies for this detection
    pub fn mutation(&self) -> ScanMutation {
        match self {
            Self::Known(_) => ScanMutation::MarkPresent,
            Self::Unknown => ScanMutation::RequestEnrollment,
        }
    }
}

/// Has the web side answered the enrollment prompt for this tag?
///
/// Either the acknowledgment pulse is visible, or the tag already made it
/// into the registry (the pulse may have been reset before the host looked,
/// or the tag was enrolled out of band).
pub fn acknowledgment_observed(record: Option<&ScanRecord>, enrolled: bool) -> bool {
    enrolled || record.map(|r| r.web_acknowledged).unwrap_or(false)
}

/// What the interface should show, derived from a full-table snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanView {
    /// Tag owed an enrollment prompt
    pub pending: Option<TagId>,
    /// Tags the host currently reports as present
    pub present: Vec<TagId>,
}

/// The pending record the prompt is for: oldest `updated_at`, then lowest id
///
/// Same order as [`ScanStateStore::pending`](crate::ScanStateStore::pending).
pub fn prompt_target<'a>(records: impl IntoIterator<Item = &'a ScanRecord>) -> Option<&'a ScanRecord> {
    records
        .into_iter()
        .filter(|r| r.pending_enrollment)
        .min_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)))
}

impl ScanView {
    pub fn from_records(records: &[ScanRecord]) -> Self {
        let first = prompt_target(records).map(|r| r.id.clone());
        let extra: Vec<&str> = records
            .iter()
            .filter(|r| r.pending_enrollment && Some(&r.id) != first.as_ref())
            .map(|r| r.id.as_str())
            .collect();
        if !extra.is_empty() {
            warn!(
                "More than one tag awaiting enrollment; prompting for {:?}, also pending: {:?}",
                first.as_ref().map(|id| id.as_str()),
                extra
            );
        }

        Self {
            pending: first,
            present: records
                .iter()
                .filter(|r| r.host_scanning)
                .map(|r| r.id.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ScanRecord {
        ScanRecord::new(TagId::parse(id).unwrap())
    }

    #[test]
    fn test_request_enrollment_sets_flags() {
        let mut r = record("04A1B2C3");
        r.web_acknowledged = true;
        ScanMutation::RequestEnrollment.apply(&mut r).unwrap();
        assert!(r.host_scanning);
        assert!(r.pending_enrollment);
        assert!(!r.web_acknowledged);
        assert_eq!(HandshakePhase::of(Some(&r)), HandshakePhase::PendingEnrollment);
    }

    #[test]
    fn test_full_unknown_cycle() {
        let mut r = record("04A1B2C3");
        assert_eq!(HandshakePhase::of(None), HandshakePhase::Unseen);

        ScanMutation::RequestEnrollment.apply(&mut r).unwrap();
        ScanMutation::Acknowledge.apply(&mut r).unwrap();
        assert!(r.web_acknowledged);
        assert!(!r.pending_enrollment);
        assert_eq!(HandshakePhase::of(Some(&r)), HandshakePhase::Acknowledged);

        ScanMutation::ResolveAcknowledged.apply(&mut r).unwrap();
        assert!(r.is_idle());
        assert_eq!(HandshakePhase::of(Some(&r)), HandshakePhase::Idle);
    }

    #[test]
    fn test_acknowledge_requires_pending() {
        let mut r = record("FFFFFFFF");
        let before = r.clone();
        let err = ScanMutation::Acknowledge.apply(&mut r).unwrap_err();
        assert!(matches!(err, Error::UnknownAcknowledgmentTarget { .. }));
        assert_eq!(r, before);
    }

    #[test]
    fn test_known_cycle() {
        let mut r = record("0A0B");
        ScanMutation::MarkPresent.apply(&mut r).unwrap();
        assert_eq!(HandshakePhase::of(Some(&r)), HandshakePhase::KnownDisplay);
        assert!(!r.pending_enrollment);
        ScanMutation::ClearPresence.apply(&mut r).unwrap();
        assert!(r.is_idle());
    }

    #[test]
    fn test_abandon_clears_prompt() {
        let mut r = record("0A0B");
        ScanMutation::RequestEnrollment.apply(&mut r).unwrap();
        ScanMutation::Abandon.apply(&mut r).unwrap();
        assert!(r.is_idle());
    }

    #[test]
    fn test_clear_acknowledgment_leaves_other_flags() {
        let mut r = record("0A0B");
        r.host_scanning = true;
        r.web_acknowledged = true;
        ScanMutation::ClearAcknowledgment.apply(&mut r).unwrap();
        assert!(r.host_scanning);
        assert!(!r.web_acknowledged);
    }

    #[test]
    fn test_acknowledgment_observed() {
        let mut r = record("0A0B");
        assert!(!acknowledgment_observed(Some(&r), false));
        assert!(!acknowledgment_observed(None, false));
        assert!(acknowledgment_observed(None, true));
        r.web_acknowledged = true;
        assert!(acknowledgment_observed(Some(&r), false));
    }

    #[test]
    fn test_scan_view() {
        let mut a = record("0A");
        a.host_scanning = true;
        let mut b = record("0B");
        b.host_scanning = true;
        b.pending_enrollment = true;
        let c = record("0C");

        let view = ScanView::from_records(&[a, b, c]);
        assert_eq!(view.pending, Some(TagId::parse("0B").unwrap()));
        assert_eq!(view.present.len(), 2);
    }

    #[test]
    fn test_prompt_target_is_oldest_pending() {
        let mut newer = record("0A");
        newer.pending_enrollment = true;
        let mut older = record("0B");
        older.pending_enrollment = true;
        older.updated_at = newer.updated_at - chrono::Duration::seconds(5);
        let mut tied = record("0C");
        tied.pending_enrollment = true;
        tied.updated_at = older.updated_at;

        let records = [newer, older, tied];
        assert_eq!(prompt_target(&records).map(|r| r.id.as_str()), Some("0B"));
        let view = ScanView::from_records(&records);
        assert_eq!(view.pending, Some(TagId::parse("0B").unwrap()));
        assert!(prompt_target(&[record("0D")]).is_none());
    }

    #[test]
    fn test_detection_mutation() {
        assert_eq!(Detection::Unknown.mutation(), ScanMutation::RequestEnrollment);
    }
}
