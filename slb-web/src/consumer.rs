//! Interface Consumer
//!
//! The web side of the handshake. Enrollment runs in a fixed order:
//!
//! 1. the target must be the tag currently awaiting enrollment
//! 2. the sample is written to the registry
//! 3. the record is acknowledged (refused atomically if no longer pending)
//! 4. the acknowledgment pulse is cleared after `ack_reset`
//!
//! The host treats a registry row as an answer too, so it may resolve the
//! prompt between steps 2 and 3. That refusal is expected and harmless.

use slb_common::debounce::DebounceScheduler;
use slb_common::events::{EventBus, ScanEvent};
use slb_common::{Error, Result, Sample, SampleMetadata, ScanMutation, ScanStateStore, TagId, TagRegistry};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Consumer {
    store: ScanStateStore,
    registry: TagRegistry,
    events: EventBus,
    pulse_resets: DebounceScheduler,
    ack_reset: Duration,
}

impl Consumer {
    pub fn new(
        store: ScanStateStore,
        registry: TagRegistry,
        events: EventBus,
        ack_reset: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            pulse_resets: DebounceScheduler::new(),
            ack_reset,
        }
    }

    /// Tag currently owed an enrollment prompt
    pub async fn pending(&self) -> Result<Option<TagId>> {
        Ok(self.store.pending().await?.map(|record| record.id))
    }

    /// Enroll `target` with the operator's metadata and acknowledge it
    ///
    /// Fails with [`Error::UnknownAcknowledgmentTarget`] when `target` is not
    /// the pending tag and with [`Error::RegistryWriteConflict`] when it is
    /// already enrolled. Neither failure changes any state.
    pub async fn submit_enrollment(&self, target: &TagId, metadata: SampleMetadata) -> Result<Sample> {
        let pending = self.pending().await?;
        if pending.as_ref() != Some(target) {
            warn!(
                "Rejected enrollment for {}: pending tag is {:?}",
                target,
                pending.as_ref().map(|id| id.as_str())
            );
            return Err(Error::UnknownAcknowledgmentTarget {
                target: target.clone(),
                pending,
            });
        }

        let sample = self.registry.enroll(target, metadata).await?;

        match self.store.apply(target, ScanMutation::Acknowledge).await {
            Ok(_) => {
                info!("Acknowledged enrollment of {}", target);
                self.schedule_pulse_reset(target.clone());
            }
            Err(Error::UnknownAcknowledgmentTarget { .. }) => {
                debug!("Host resolved {} before the acknowledgment", target);
            }
            Err(e) => {
                // The registry row alone lets the host resolve the prompt
                warn!("Could not acknowledge {} (host will see the registry): {}", target, e);
            }
        }

        self.events.emit_lossy(ScanEvent::EnrollmentCompleted {
            uid: target.clone(),
            sample_id: sample.metadata.sample_id.clone(),
            timestamp: slb_common::time::now(),
        });

        Ok(sample)
    }

    /// Move a sample to the archive
    pub async fn archive(&self, uid: &TagId) -> Result<Sample> {
        let sample = self.registry.archive(uid).await?;
        self.events.emit_lossy(ScanEvent::SampleArchived {
            uid: uid.clone(),
            sample_id: sample.metadata.sample_id.clone(),
            timestamp: slb_common::time::now(),
        });
        Ok(sample)
    }

    /// True while a pulse reset for `uid` is waiting
    pub fn pulse_reset_pending(&self, uid: &TagId) -> bool {
        self.pulse_resets.is_pending(uid)
    }

    /// Drop waiting pulse resets (shutdown)
    pub fn cancel_pulse_resets(&self) {
        self.pulse_resets.cancel_all();
    }

    fn schedule_pulse_reset(&self, id: TagId) {
        let store = self.store.clone();
        let target = id.clone();
        self.pulse_resets.schedule(id, self.ack_reset, move || async move {
            match store.apply(&target, ScanMutation::ClearAcknowledgment).await {
                Ok(_) => debug!("Acknowledgment pulse of {} cleared", target),
                Err(e) => warn!("Could not clear acknowledgment pulse of {}: {}", target, e),
            }
        });
    }
}
