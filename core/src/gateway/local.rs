use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use super::EVENT_BUFFER;
use super::Gateway;
use super::GatewayError;
use super::GatewayEvent;
use super::MemberRecord;
use crate::member::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMember {
    #[serde(flatten)]
    pub member: MemberRecord,
    #[serde(default)]
    pub status: Option<String>,
    /// Present in the local member cache before any full fetch.
    #[serde(default)]
    pub cached: bool,
}

/// Static description of one community as the upstream would report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildFixture {
    pub id: String,
    /// Upstream member count; defaults to the number of listed members.
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub members: Vec<FixtureMember>,
    /// When set, `connect` only accepts this credential.
    #[serde(default)]
    pub credential: Option<String>,
    /// Emit `Ready` as soon as `connect` succeeds.
    #[serde(default = "default_auto_ready")]
    pub auto_ready: bool,
}

fn default_auto_ready() -> bool {
    true
}

impl GuildFixture {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            member_count: None,
            members: Vec::new(),
            credential: None,
            auto_ready: true,
        }
    }
}

#[derive(Debug, Default)]
struct LocalState {
    connected: bool,
    connects: u32,
    disconnects: u32,
    bulk_fetches: u32,
    members: IndexMap<UserId, MemberRecord>,
    presences: HashMap<UserId, String>,
}

/// In-process gateway backed by a [`GuildFixture`]. Events are pushed in
/// through the paired [`GatewayFeed`].
#[derive(Debug)]
pub struct LocalGateway {
    community_id: String,
    member_count: u64,
    credential: Option<String>,
    auto_ready: bool,
    listing: Vec<MemberRecord>,
    state: Mutex<LocalState>,
    events: Mutex<Option<mpsc::Receiver<GatewayEvent>>>,
    tx: Mutex<Option<mpsc::Sender<GatewayEvent>>>,
    sent: AtomicU64,
}

impl LocalGateway {
    pub fn new(fixture: GuildFixture) -> (Arc<Self>, GatewayFeed) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut state = LocalState::default();
        for entry in &fixture.members {
            let id = entry.member.id().clone();
            if let Some(status) = &entry.status {
                state.presences.insert(id.clone(), status.clone());
            }
            if entry.cached {
                state.members.insert(id, entry.member.clone());
            }
        }
        let gateway = Arc::new(Self {
            member_count: fixture
                .member_count
                .unwrap_or(fixture.members.len() as u64),
            community_id: fixture.id,
            credential: fixture.credential,
            auto_ready: fixture.auto_ready,
            listing: fixture.members.into_iter().map(|entry| entry.member).collect(),
            state: Mutex::new(state),
            events: Mutex::new(Some(rx)),
            tx: Mutex::new(Some(tx)),
            sent: AtomicU64::new(0),
        });
        let feed = GatewayFeed {
            gateway: Arc::clone(&gateway),
        };
        (gateway, feed)
    }

    /// Events pushed onto the stream so far, including the automatic `Ready`.
    pub fn sent_events(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().connected
    }

    pub fn connects(&self) -> u32 {
        self.lock_state().connects
    }

    pub fn disconnects(&self) -> u32 {
        self.lock_state().disconnects
    }

    pub fn bulk_fetches(&self) -> u32 {
        self.lock_state().bulk_fetches
    }

    async fn push(&self, event: GatewayEvent) -> Result<(), GatewayError> {
        let sender = lock(&self.tx).clone().ok_or(GatewayError::Closed)?;
        sender.send(event).await.map_err(|_| GatewayError::Closed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Mirrors what a connection layer does with its own member and presence
    /// caches as events pass through it.
    fn observe(&self, event: &GatewayEvent) {
        let mut state = self.lock_state();
        match event {
            GatewayEvent::PresenceUpdate { new, .. } => {
                let Some(id) = new.user_id().cloned() else {
                    return;
                };
                match &new.status {
                    Some(status) => {
                        state.presences.insert(id.clone(), status.clone());
                    }
                    None => {
                        state.presences.remove(&id);
                    }
                }
                if let Some(member) = &new.member {
                    state.members.entry(id).or_insert_with(|| member.clone());
                }
            }
            GatewayEvent::MemberRemove { member } => {
                state.members.shift_remove(member.id());
                state.presences.remove(member.id());
            }
            GatewayEvent::Ready | GatewayEvent::Error { .. } => {}
        }
    }

    fn check_community(&self, community_id: &str) -> Result<(), GatewayError> {
        if community_id != self.community_id {
            return Err(GatewayError::UnknownCommunity(community_id.to_string()));
        }
        if !self.lock_state().connected {
            return Err(GatewayError::NotConnected);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, LocalState> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Gateway for LocalGateway {
    fn subscribe(&self) -> Result<mpsc::Receiver<GatewayEvent>, GatewayError> {
        lock(&self.events)
            .take()
            .ok_or(GatewayError::AlreadySubscribed)
    }

    async fn connect(&self, credential: &str) -> Result<(), GatewayError> {
        if credential.trim().is_empty() {
            return Err(GatewayError::InvalidCredential);
        }
        if self
            .credential
            .as_deref()
            .is_some_and(|expected| expected != credential)
        {
            return Err(GatewayError::InvalidCredential);
        }
        {
            let mut state = self.lock_state();
            state.connected = true;
            state.connects += 1;
        }
        if self.auto_ready {
            self.push(GatewayEvent::Ready).await?;
        }
        Ok(())
    }

    async fn member_count(&self, community_id: &str) -> Result<u64, GatewayError> {
        self.check_community(community_id)?;
        Ok(self.member_count)
    }

    async fn fetch_members(&self, community_id: &str) -> Result<(), GatewayError> {
        self.check_community(community_id)?;
        let mut state = self.lock_state();
        state.bulk_fetches += 1;
        for member in &self.listing {
            state
                .members
                .entry(member.id().clone())
                .or_insert_with(|| member.clone());
        }
        Ok(())
    }

    async fn cached_members(&self, community_id: &str) -> Result<Vec<MemberRecord>, GatewayError> {
        self.check_community(community_id)?;
        Ok(self.lock_state().members.values().cloned().collect())
    }

    async fn cached_presence(&self, community_id: &str, user_id: &UserId) -> Option<String> {
        if community_id != self.community_id {
            return None;
        }
        self.lock_state().presences.get(user_id).cloned()
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        {
            let mut state = self.lock_state();
            if !state.connected {
                return Err(GatewayError::NotConnected);
            }
            state.connected = false;
            state.disconnects += 1;
        }
        lock(&self.tx).take();
        Ok(())
    }
}

/// Producer half of a [`LocalGateway`] event stream.
#[derive(Debug, Clone)]
pub struct GatewayFeed {
    gateway: Arc<LocalGateway>,
}

impl GatewayFeed {
    pub async fn send(&self, event: GatewayEvent) -> Result<(), GatewayError> {
        self.gateway.observe(&event);
        self.gateway.push(event).await
    }

    pub fn gateway(&self) -> &Arc<LocalGateway> {
        &self.gateway
    }
}
