//! The seam between the presence cache and whatever maintains the upstream
//! connection.
//!
//! A [`Gateway`] hands out exactly one event stream via [`Gateway::subscribe`].
//! Callers subscribe before [`Gateway::connect`] so that nothing emitted during
//! the handshake (including the `Ready` event) is lost.

mod local;

pub use local::FixtureMember;
pub use local::GatewayFeed;
pub use local::GuildFixture;
pub use local::LocalGateway;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::member::UserId;

/// Buffer between the connection layer and the ingestion task.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    /// Avatar hash of the account itself.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A user as seen through their membership of one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user: UserRecord,
    #[serde(default)]
    pub nick: Option<String>,
    /// Community-specific avatar hash; takes precedence over `user.avatar`.
    #[serde(default)]
    pub avatar: Option<String>,
}

impl MemberRecord {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }
}

/// One side of a presence change. Every field is optional on the wire; the
/// ingestion loop decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub member: Option<MemberRecord>,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

impl PresenceState {
    /// The affected user, taken from the first non-empty identifier among the
    /// explicit id, the member record and the bare user record.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id
            .as_ref()
            .into_iter()
            .chain(self.member.as_ref().map(MemberRecord::id))
            .chain(self.user.as_ref().map(|user| &user.id))
            .find(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Ready,
    PresenceUpdate {
        #[serde(default)]
        old: Option<PresenceState>,
        new: PresenceState,
    },
    MemberRemove {
        member: MemberRecord,
    },
    Error {
        message: String,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::Ready => "ready",
            GatewayEvent::PresenceUpdate { .. } => "presence_update",
            GatewayEvent::MemberRemove { .. } => "member_remove",
            GatewayEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("event stream already handed out")]
    AlreadySubscribed,
    #[error("gateway is not connected")]
    NotConnected,
    #[error("credential rejected by upstream")]
    InvalidCredential,
    #[error("unknown community {0}")]
    UnknownCommunity(String),
    #[error("event stream closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Hands out the event stream. Only the first call succeeds.
    fn subscribe(&self) -> Result<mpsc::Receiver<GatewayEvent>, GatewayError>;

    async fn connect(&self, credential: &str) -> Result<(), GatewayError>;

    /// Total member count as reported by the upstream, not the local cache.
    async fn member_count(&self, community_id: &str) -> Result<u64, GatewayError>;

    /// Full member listing. Expensive; populates the local member cache.
    async fn fetch_members(&self, community_id: &str) -> Result<(), GatewayError>;

    /// Members currently held in the connection layer's local cache.
    async fn cached_members(&self, community_id: &str) -> Result<Vec<MemberRecord>, GatewayError>;

    /// Last presence status the connection layer saw for `user_id`.
    async fn cached_presence(&self, community_id: &str, user_id: &UserId) -> Option<String>;

    async fn disconnect(&self) -> Result<(), GatewayError>;
}
