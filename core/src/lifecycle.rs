//! Owns the presence cache and the upstream connection for the lifetime of
//! the process.
//!
//! ```text
//! Unstarted -> Connecting -> AwaitingReady -> Ready
//! Unstarted -> Disabled            (missing credential or community id)
//! Connecting -> Disabled           (subscribe or connect failed)
//! any -> Stopped                   (stop)
//! ```
//!
//! `AwaitingReady -> Ready` happens on whichever comes first: the ingestion
//! task finishing seeding after the upstream `Ready` event, or the configured
//! ready timeout. After a timeout the service answers queries with whatever
//! the cache holds; a late `Ready` still seeds but does not change state.
//!
//! The connect handshake is bounded by the same timeout, and `stop` preempts
//! a pending connect or readiness wait instead of queueing behind `init`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::info;
use tracing::warn;

use rollcall_utils_readiness::Readiness;
use rollcall_utils_readiness::ReadinessError;
use rollcall_utils_readiness::ReadinessFlag;

use crate::cache::PresenceCache;
use crate::config::PresenceConfig;
use crate::gateway::Gateway;
use crate::ingest::IngestLoop;
use crate::member::MemberSnapshot;
use crate::member::SnapshotBuilder;
use crate::seed::SeedOptions;
use crate::stats::IngestCounters;
use crate::stats::IngestStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unstarted,
    Connecting,
    AwaitingReady,
    Ready,
    Disabled,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unstarted => "unstarted",
            Self::Connecting => "connecting",
            Self::AwaitingReady => "awaiting_ready",
            Self::Ready => "ready",
            Self::Disabled => "disabled",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceSummary {
    pub enabled: bool,
    /// Total number of online members, regardless of the requested limit.
    pub count: usize,
    pub members: Vec<MemberSnapshot>,
}

impl PresenceSummary {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            count: 0,
            members: Vec::new(),
        }
    }
}

/// Upper bound on releasing the upstream connection during `stop`.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Control {
    ingest: Option<JoinHandle<()>>,
    connected: bool,
}

pub struct PresenceService {
    gateway: Arc<dyn Gateway>,
    cache: Arc<PresenceCache>,
    readiness: Arc<ReadinessFlag>,
    counters: Arc<IngestCounters>,
    state: watch::Sender<LifecycleState>,
    /// Fired by `stop` before it takes `control`.
    shutdown: CancellationToken,
    /// Serializes `init` and `stop`. Queries never touch it.
    control: Mutex<Control>,
}

impl PresenceService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_cache(gateway, Arc::new(PresenceCache::new()))
    }

    pub fn with_cache(gateway: Arc<dyn Gateway>, cache: Arc<PresenceCache>) -> Self {
        Self {
            gateway,
            cache,
            readiness: Arc::new(ReadinessFlag::new()),
            counters: Arc::new(IngestCounters::default()),
            state: watch::channel(LifecycleState::Unstarted).0,
            shutdown: CancellationToken::new(),
            control: Mutex::new(Control::default()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn cache(&self) -> &Arc<PresenceCache> {
        &self.cache
    }

    /// Whether seeding has finished, as opposed to the service merely being
    /// enabled after a ready timeout.
    pub fn is_seeded(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Connects and waits (bounded) for the initial snapshot. Never fails:
    /// anything that goes wrong leaves the service disabled. Calling it again
    /// reports the current outcome without reconnecting.
    pub async fn init(&self, config: &PresenceConfig) -> InitOutcome {
        let mut control = self.control.lock().await;
        let current = self.state();
        if current != LifecycleState::Unstarted {
            info!(state = %current, "presence tracking already initialised");
            return InitOutcome {
                enabled: current == LifecycleState::Ready,
            };
        }

        let settings = match config.validate() {
            Ok(settings) => settings,
            Err(err) => {
                warn!("presence tracking disabled: {err}");
                return self.disable();
            }
        };

        let events = match self.gateway.subscribe() {
            Ok(events) => events,
            Err(err) => {
                warn!("presence tracking disabled, cannot subscribe to gateway events: {err}");
                return self.disable();
            }
        };

        self.set_state(LifecycleState::Connecting);
        let connect = tokio::time::timeout(
            settings.ready_timeout,
            self.gateway.connect(&settings.credential),
        );
        let connected = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                info!("presence tracking stopped while connecting");
                return self.disable();
            }
            connected = connect => connected,
        };
        match connected {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("presence tracking disabled, gateway connection failed: {err}");
                return self.disable();
            }
            Err(_) => {
                let waited = settings.ready_timeout;
                warn!("presence tracking disabled, gateway did not connect within {waited:?}");
                return self.disable();
            }
        }
        control.connected = true;

        let ingest = IngestLoop::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.cache),
            SnapshotBuilder::new(settings.community_id.clone(), settings.avatar.clone()),
            SeedOptions {
                bulk_fetch_threshold: settings.bulk_fetch_threshold,
            },
            Arc::clone(&self.readiness),
            Arc::clone(&self.counters),
            self.shutdown.child_token(),
        );
        control.ingest = Some(tokio::spawn(ingest.run(events).in_current_span()));
        self.set_state(LifecycleState::AwaitingReady);

        let awaited = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            () = self.await_ready(settings.ready_timeout) => true,
        };
        if !awaited {
            info!("presence tracking stopped before the cache was ready");
            return InitOutcome { enabled: false };
        }
        self.transition(LifecycleState::AwaitingReady, LifecycleState::Ready);
        info!(
            community_id = %settings.community_id,
            members = self.cache.len(),
            seeded = self.is_seeded(),
            "presence tracking enabled"
        );
        InitOutcome {
            enabled: self.state() == LifecycleState::Ready,
        }
    }

    async fn await_ready(&self, timeout: Duration) {
        match self.readiness.wait_ready_timeout(timeout).await {
            Ok(()) => {}
            Err(ReadinessError::TimedOut(waited)) => {
                warn!(
                    "no ready signal within {waited:?}, serving presence before seeding completes"
                );
            }
            Err(err) => warn!("readiness wait ended early: {err}"),
        }
    }

    /// Point-in-time view of who is online. Cheap and never blocks on
    /// ingestion for longer than a single cache write.
    pub fn summary(&self, limit: usize) -> PresenceSummary {
        if self.state() != LifecycleState::Ready {
            return PresenceSummary::disabled();
        }
        let (count, members) = self.cache.view(limit);
        PresenceSummary {
            enabled: true,
            count,
            members,
        }
    }

    /// Waits until at least `target` events have been fully handled. Returns
    /// `false` if `timeout` elapses first.
    pub async fn wait_for_events(&self, target: u64, timeout: Duration) -> bool {
        let mut events = self.counters.subscribe_events();
        let reached = events.wait_for(|handled| *handled >= target);
        matches!(tokio::time::timeout(timeout, reached).await, Ok(Ok(_)))
    }

    /// Tears everything down. Safe to call before `init` and more than once;
    /// the upstream connection is released at most once. Readers see
    /// `Stopped` before the cache is emptied.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let mut control = self.control.lock().await;
        let already_stopped = self.state() == LifecycleState::Stopped;
        self.set_state(LifecycleState::Stopped);
        if let Some(ingest) = control.ingest.take() {
            if let Err(err) = ingest.await {
                warn!("presence ingestion task ended abnormally: {err}");
            }
        }
        if std::mem::take(&mut control.connected) {
            match tokio::time::timeout(DISCONNECT_TIMEOUT, self.gateway.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("gateway disconnect failed: {err}"),
                Err(_) => warn!("gateway disconnect did not finish within {DISCONNECT_TIMEOUT:?}"),
            }
        }
        self.cache.clear();
        if !already_stopped {
            info!("presence tracking stopped");
        }
    }

    fn disable(&self) -> InitOutcome {
        self.set_state(LifecycleState::Disabled);
        InitOutcome { enabled: false }
    }

    fn set_state(&self, next: LifecycleState) {
        self.state.send_replace(next);
    }

    /// Moves to `to` only from `from`; any other current state is left alone.
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state != from {
                return false;
            }
            *state = to;
            true
        })
    }
}

impl fmt::Debug for PresenceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceService")
            .field("state", &self.state())
            .field("members", &self.cache.len())
            .field("seeded", &self.is_seeded())
            .finish()
    }
}
