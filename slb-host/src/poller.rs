//! Hardware Poller
//!
//! Drives the host side of the handshake. The loop runs every `idle_poll`:
//!
//! 1. While a tag awaits enrollment, re-read the store and the registry every
//!    `ack_poll` and resolve the prompt once the web has answered (or give up
//!    after the optional enrollment timeout).
//! 2. Poll the reader once.
//! 3. On a detection, ask the registry (fresh every time) whether the tag is
//!    known:
//!    - known: mark it present and (re)arm the presence-clear after `known_dwell`
//!    - unknown: request enrollment and start awaiting the acknowledgment
//!
//! Only one enrollment prompt is ever open. Detections while it is open are
//! ignored.
//!
//! Store failures are logged and the step is retried on the next detection or
//! acknowledgment check; they never stop the loop. A failed startup reconcile
//! is retried every `ack_poll` until it succeeds.

use crate::error::ReaderError;
use crate::reader::TagReader;
use slb_common::config::HandshakeTimings;
use slb_common::debounce::DebounceScheduler;
use slb_common::handshake::{acknowledgment_observed, prompt_target, Detection};
use slb_common::{ScanMutation, ScanStateStore, TagId, TagRegistry};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Notable poller transitions, reported for observability and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    KnownDetected { id: TagId, sample_id: String },
    EnrollmentRequested { id: TagId },
    EnrollmentResolved { id: TagId },
    EnrollmentAbandoned { id: TagId },
    DetectionIgnored { id: TagId, pending: TagId },
    PresenceCleared { id: TagId },
}

/// What startup reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records created for enrolled tags that had none
    pub created: usize,
    /// Tags whose stale presence flag was cleared
    pub presence_cleared: Vec<TagId>,
    /// Prompts that were already answered (tag now enrolled)
    pub resolved: Vec<TagId>,
    /// Prompt the poller resumes waiting on
    pub resumed: Option<TagId>,
    /// Extra open prompts dropped to keep a single session
    pub abandoned: Vec<TagId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollerState {
    Scanning,
    Awaiting {
        id: TagId,
        since: Instant,
        next_check: Instant,
    },
}

pub struct Poller {
    reader: Box<dyn TagReader>,
    store: ScanStateStore,
    registry: TagRegistry,
    timings: HandshakeTimings,
    presence: DebounceScheduler,
    events: Option<mpsc::UnboundedSender<PollerEvent>>,
    state: PollerState,
    reader_closed: bool,
}

impl Poller {
    pub fn new(
        reader: impl TagReader + 'static,
        store: ScanStateStore,
        registry: TagRegistry,
        timings: HandshakeTimings,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            store,
            registry,
            timings,
            presence: DebounceScheduler::new(),
            events: None,
            state: PollerState::Scanning,
            reader_closed: false,
        }
    }

    /// Report transitions on `sink`
    pub fn with_events(mut self, sink: mpsc::UnboundedSender<PollerEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Tag currently awaiting enrollment, if any
    pub fn awaiting(&self) -> Option<&TagId> {
        match &self.state {
            PollerState::Awaiting { id, .. } => Some(id),
            PollerState::Scanning => None,
        }
    }

    /// Reconcile, then poll until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Poller starting with {} reader", self.reader.name());

        while let Err(e) = self.reconcile().await {
            warn!(
                "Startup reconcile failed, retrying in {}ms: {}",
                self.timings.ack_poll_ms, e
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Poller stopped before startup reconcile completed");
                    return;
                }
                _ = tokio::time::sleep(self.timings.ack_poll()) => {}
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.step() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.timings.idle_poll()) => {}
            }
        }

        // Pending presence clears are dropped; the next startup reconcile clears the flags
        self.presence.cancel_all();
        if let Some(id) = self.awaiting() {
            info!("Poller stopping while {} awaits enrollment; resuming on next start", id);
        } else {
            info!("Poller stopped");
        }
    }

    /// Bring the store in line with the registry after a restart
    ///
    /// Creates a record for every enrolled tag, clears presence flags left by
    /// an earlier run, resolves prompts answered while the host was down, and
    /// resumes waiting on a prompt that is still open.
    ///
    /// Safe to call again after a failure; every step is idempotent.
    pub async fn reconcile(&mut self) -> slb_common::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let enrolled: HashSet<TagId> = self.registry.enrolled_ids().await?.into_iter().collect();
        let mut ids: Vec<TagId> = enrolled.iter().cloned().collect();
        ids.sort();
        report.created = self.store.ensure_records(&ids).await?;

        let records = self.store.scan_all().await?;
        let resume = prompt_target(records.iter().filter(|r| !enrolled.contains(&r.id)))
            .map(|r| r.id.clone());

        for record in records {
            let id = record.id.clone();
            let is_enrolled = enrolled.contains(&id);

            if (record.pending_enrollment || record.web_acknowledged) && is_enrolled {
                self.store.apply(&id, ScanMutation::ResolveAcknowledged).await?;
                report.resolved.push(id);
                continue;
            }

            if record.pending_enrollment {
                if resume.as_ref() == Some(&id) {
                    let now = Instant::now();
                    self.state = PollerState::Awaiting {
                        id: id.clone(),
                        since: now,
                        next_check: now,
                    };
                    report.resumed = Some(id);
                } else {
                    self.store.apply(&id, ScanMutation::Abandon).await?;
                    report.abandoned.push(id);
                }
                continue;
            }

            if record.web_acknowledged {
                // Pulse without a registry row: nothing to resolve
                self.store.apply(&id, ScanMutation::ClearAcknowledgment).await?;
            }

            if record.host_scanning {
                self.store.apply(&id, ScanMutation::ClearPresence).await?;
                report.presence_cleared.push(id);
            }
        }

        info!(
            "Startup reconcile: {} records created, {} stale presence flags cleared, {} answered prompts resolved{}",
            report.created,
            report.presence_cleared.len(),
            report.resolved.len(),
            report
                .resumed
                .as_ref()
                .map(|id| format!(", resuming wait for {}", id))
                .unwrap_or_default()
        );
        for id in &report.abandoned {
            warn!("Dropped extra open enrollment prompt for {}", id);
        }

        Ok(report)
    }

    /// One loop iteration: acknowledgment check, then one reader poll
    pub async fn step(&mut self) {
        self.check_acknowledgment().await;

        if self.reader_closed {
            return;
        }

        let read = match self.reader.poll_once(self.timings.reader_timeout()).await {
            Ok(read) => read,
            Err(ReaderError::Closed) => {
                warn!("{} reader input closed; no further detections", self.reader.name());
                self.reader_closed = true;
                None
            }
            Err(e) => {
                warn!("Reader poll failed: {}", e);
                None
            }
        };

        match read {
            Some(id) => self.handle_detection(id).await,
            None => trace!("No tag"),
        }
    }

    async fn handle_detection(&mut self, id: TagId) {
        if let PollerState::Awaiting { id: pending, .. } = &self.state {
            debug!("Ignoring {} while {} awaits enrollment", id, pending);
            let pending = pending.clone();
            self.emit(PollerEvent::DetectionIgnored { id, pending });
            return;
        }

        let detection = match Detection::classify(&id, &self.registry).await {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Registry lookup for {} failed: {}", id, e);
                return;
            }
        };

        // Re-arm or drop the pending presence clear before writing, so an old
        // clear cannot land after this detection's flags
        match &detection {
            Detection::Known(_) => self.schedule_presence_clear(id.clone()),
            Detection::Unknown => {
                self.presence.cancel(&id);
            }
        }

        if let Err(e) = self.store.apply(&id, detection.mutation()).await {
            warn!("Could not record detection of {}: {}", id, e);
            return;
        }

        match detection {
            Detection::Known(sample) => {
                info!(
                    "Recognized {} as sample {} (project {})",
                    id, sample.metadata.sample_id, sample.metadata.project_number
                );
                self.emit(PollerEvent::KnownDetected {
                    id,
                    sample_id: sample.metadata.sample_id,
                });
            }
            Detection::Unknown => {
                info!("New tag {} detected, awaiting enrollment", id);
                let now = Instant::now();
                self.state = PollerState::Awaiting {
                    id: id.clone(),
                    since: now,
                    next_check: now + self.timings.ack_poll(),
                };
                self.emit(PollerEvent::EnrollmentRequested { id });
            }
        }
    }

    fn schedule_presence_clear(&self, id: TagId) {
        let store = self.store.clone();
        let events = self.events.clone();
        let target = id.clone();

        self.presence
            .schedule(id, self.timings.known_dwell(), move || async move {
                match store.apply(&target, ScanMutation::ClearPresence).await {
                    Ok(_) => {
                        debug!("Presence of {} cleared after dwell", target);
                        if let Some(events) = events {
                            let _ = events.send(PollerEvent::PresenceCleared { id: target });
                        }
                    }
                    Err(e) => warn!("Could not clear presence of {}: {}", target, e),
                }
            });
    }

    async fn check_acknowledgment(&mut self) {
        let PollerState::Awaiting {
            id,
            since,
            next_check,
        } = &mut self.state
        else {
            return;
        };

        let now = Instant::now();
        if now < *next_check {
            return;
        }
        *next_check = now + self.timings.ack_poll();
        let id = id.clone();
        let waited = now.duration_since(*since);

        let record = match self.store.get(&id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not read scan state for {}: {}", id, e);
                return;
            }
        };
        let enrolled = match self.registry.exists(&id).await {
            Ok(enrolled) => enrolled,
            Err(e) => {
                warn!("Registry lookup for {} failed: {}", id, e);
                return;
            }
        };

        if acknowledgment_observed(record.as_ref(), enrolled) {
            match self.store.apply(&id, ScanMutation::ResolveAcknowledged).await {
                Ok(_) => {
                    info!("Enrollment of {} acknowledged after {:.1}s", id, waited.as_secs_f64());
                    self.state = PollerState::Scanning;
                    self.emit(PollerEvent::EnrollmentResolved { id });
                }
                Err(e) => warn!("Could not resolve enrollment of {}: {}", id, e),
            }
            return;
        }

        if record.as_ref().map(|r| !r.pending_enrollment).unwrap_or(true) {
            warn!("Enrollment prompt for {} disappeared without an answer", id);
            self.state = PollerState::Scanning;
            self.emit(PollerEvent::EnrollmentAbandoned { id });
            return;
        }

        if let Some(limit) = self.timings.enrollment_timeout() {
            if waited >= limit {
                match self.store.apply(&id, ScanMutation::Abandon).await {
                    Ok(_) => {
                        info!("No enrollment for {} after {}s, giving up", id, limit.as_secs());
                        self.state = PollerState::Scanning;
                        self.emit(PollerEvent::EnrollmentAbandoned { id });
                    }
                    Err(e) => warn!("Could not abandon enrollment of {}: {}", id, e),
                }
                return;
            }
        }

        trace!("Still awaiting enrollment of {}", id);
    }

    fn emit(&self, event: PollerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
