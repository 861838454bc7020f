//! Consumes the gateway event stream and keeps the presence cache current.
//!
//! Events are handled strictly one at a time. A malformed event is logged and
//! dropped; it never ends the loop. The loop only stops when the stream closes
//! or the cancellation token fires.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use rollcall_utils_readiness::Readiness;
use rollcall_utils_readiness::ReadinessFlag;

use crate::cache::CacheError;
use crate::cache::PresenceCache;
use crate::gateway::Gateway;
use crate::gateway::GatewayEvent;
use crate::member::PresenceChange;
use crate::member::SnapshotBuilder;
use crate::member::SnapshotError;
use crate::member::UserId;
use crate::seed::SeedOptions;
use crate::seed::seed_cache;
use crate::stats::IngestCounters;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Effect of a single event on the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Upserted(UserId),
    Removed { id: UserId, existed: bool },
    /// The event carried nothing the cache cares about.
    Ignored,
    /// Upstream readiness; seeding is the loop's job.
    Ready,
    UpstreamError(String),
}

/// Applies one event to `cache`. Replaying the same event yields the same
/// cache state.
pub fn apply_event(
    cache: &PresenceCache,
    builder: &SnapshotBuilder,
    event: &GatewayEvent,
) -> Result<Applied, IngestError> {
    match event {
        GatewayEvent::Ready => Ok(Applied::Ready),
        GatewayEvent::PresenceUpdate { new, .. } => match builder.from_presence(new)? {
            PresenceChange::Online(snapshot) => {
                let id = snapshot.id.clone();
                cache.upsert(snapshot)?;
                Ok(Applied::Upserted(id))
            }
            PresenceChange::Offline(id) => {
                let existed = cache.remove(&id);
                Ok(Applied::Removed { id, existed })
            }
            PresenceChange::Anonymous => Ok(Applied::Ignored),
        },
        GatewayEvent::MemberRemove { member } => {
            let id = member.id().clone();
            let existed = cache.remove(&id);
            Ok(Applied::Removed { id, existed })
        }
        GatewayEvent::Error { message } => Ok(Applied::UpstreamError(message.clone())),
    }
}

pub struct IngestLoop {
    gateway: Arc<dyn Gateway>,
    cache: Arc<PresenceCache>,
    builder: SnapshotBuilder,
    seed: SeedOptions,
    readiness: Arc<ReadinessFlag>,
    counters: Arc<IngestCounters>,
    cancel: CancellationToken,
    seeded: bool,
}

impl IngestLoop {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cache: Arc<PresenceCache>,
        builder: SnapshotBuilder,
        seed: SeedOptions,
        readiness: Arc<ReadinessFlag>,
        counters: Arc<IngestCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            cache,
            builder,
            seed,
            readiness,
            counters,
            cancel,
            seeded: false,
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                info!("gateway event stream closed");
                break;
            };
            if !self.handle(event).await {
                break;
            }
            self.counters.record_event();
        }
        debug!("presence ingestion stopped");
    }

    /// Returns `false` when the loop should stop.
    async fn handle(&mut self, event: GatewayEvent) -> bool {
        let kind = event.kind();
        match apply_event(&self.cache, &self.builder, &event) {
            Ok(Applied::Upserted(id)) => {
                debug!(user_id = %id, "member online");
                self.counters.record_presence_upsert();
            }
            Ok(Applied::Removed { id, existed }) => {
                debug!(user_id = %id, existed, kind, "member removed");
                if matches!(event, GatewayEvent::MemberRemove { .. }) {
                    self.counters.record_member_removal();
                } else {
                    self.counters.record_presence_removal();
                }
            }
            Ok(Applied::Ignored) => {
                debug!(kind, "event named no user, ignoring");
            }
            Ok(Applied::UpstreamError(message)) => {
                warn!("gateway reported an error: {message}");
            }
            Ok(Applied::Ready) => return self.on_ready().await,
            Err(err) => {
                warn!(kind, "dropping malformed gateway event: {err}");
                self.counters.record_dropped();
            }
        }
        true
    }

    async fn on_ready(&mut self) -> bool {
        if self.seeded {
            debug!("ignoring repeated ready signal");
            return true;
        }
        self.seeded = true;
        let report = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            report = seed_cache(self.gateway.as_ref(), &self.cache, &self.builder, &self.seed) => report,
        };
        self.counters.record_seeded(report.inserted as u64);
        if self.readiness.mark_ready() {
            info!(members = self.cache.len(), "presence cache ready");
        }
        true
    }
}
