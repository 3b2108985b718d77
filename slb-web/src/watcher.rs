//! Scan watcher
//!
//! Polls the Scan State Store every `consumer_poll` and turns changes in the
//! derived [`ScanView`] into [`ScanEvent`]s for SSE clients. Handlers do not
//! depend on it; they read the store directly.

use slb_common::events::{EventBus, ScanEvent};
use slb_common::handshake::ScanView;
use slb_common::{Result, ScanStateStore};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ScanWatcher {
    store: ScanStateStore,
    events: EventBus,
    period: Duration,
    last: ScanView,
}

impl ScanWatcher {
    pub fn new(store: ScanStateStore, events: EventBus, period: Duration) -> Self {
        Self {
            store,
            events,
            period,
            last: ScanView::default(),
        }
    }

    /// Read the store once and publish what changed since the last poll
    pub async fn poll_once(&mut self) -> Result<ScanView> {
        let records = self.store.scan_all().await?;
        let view = ScanView::from_records(&records);

        for event in view_changes(&self.last, &view) {
            debug!("Scan view change: {} {}", event.event_type(), event.uid());
            self.events.emit_lossy(event);
        }

        self.last = view.clone();
        Ok(view)
    }

    /// Poll until `shutdown` is cancelled
    pub fn spawn(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Scan watcher started ({} ms period)", self.period.as_millis());
            loop {
                if let Err(e) = self.poll_once().await {
                    warn!("Scan watcher could not read the store: {}", e);
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.period) => {}
                }
            }
            info!("Scan watcher stopped");
        })
    }
}

/// Events that turn `previous` into `next`
pub fn view_changes(previous: &ScanView, next: &ScanView) -> Vec<ScanEvent> {
    let now = slb_common::time::now();
    let mut events = Vec::new();

    if previous.pending != next.pending {
        if let Some(uid) = &previous.pending {
            events.push(ScanEvent::EnrollmentPromptCleared {
                uid: uid.clone(),
                timestamp: now,
            });
        }
        if let Some(uid) = &next.pending {
            events.push(ScanEvent::EnrollmentRequested {
                uid: uid.clone(),
                timestamp: now,
            });
        }
    }

    let before: BTreeSet<_> = previous.present.iter().collect();
    let after: BTreeSet<_> = next.present.iter().collect();
    for uid in after.difference(&before) {
        events.push(ScanEvent::TagPresenceChanged {
            uid: (*uid).clone(),
            present: true,
            timestamp: now,
        });
    }
    for uid in before.difference(&after) {
        events.push(ScanEvent::TagPresenceChanged {
            uid: (*uid).clone(),
            present: false,
            timestamp: now,
        });
    }

    events
}
