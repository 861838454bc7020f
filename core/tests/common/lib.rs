//! Builders and gateway doubles shared by the `rollcall-core` integration
//! tests.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use rollcall_core::PresenceConfig;
use rollcall_core::UserId;
use rollcall_core::gateway::FixtureMember;
use rollcall_core::gateway::Gateway;
use rollcall_core::gateway::GatewayError;
use rollcall_core::gateway::GatewayEvent;
use rollcall_core::gateway::GuildFixture;
use rollcall_core::gateway::MemberRecord;
use rollcall_core::gateway::PresenceState;
use rollcall_core::gateway::UserRecord;
use tokio::sync::mpsc;

pub const GUILD: &str = "guild-1";
pub const TOKEN: &str = "test-token";

pub fn member(id: &str) -> MemberRecord {
    MemberRecord {
        user: UserRecord {
            id: UserId::from(id),
            username: Some(format!("user-{id}")),
            avatar: Some(format!("hash-{id}")),
        },
        nick: None,
        avatar: None,
    }
}

/// A member record with no username, which snapshot building rejects.
pub fn nameless_member(id: &str) -> MemberRecord {
    MemberRecord {
        user: UserRecord {
            id: UserId::from(id),
            username: None,
            avatar: None,
        },
        nick: None,
        avatar: None,
    }
}

pub fn fixture_member(id: &str, status: &str, cached: bool) -> FixtureMember {
    FixtureMember {
        member: member(id),
        status: Some(status.to_string()),
        cached,
    }
}

pub fn fixture(members: Vec<FixtureMember>) -> GuildFixture {
    GuildFixture {
        members,
        credential: Some(TOKEN.to_string()),
        ..GuildFixture::new(GUILD)
    }
}

pub fn config() -> PresenceConfig {
    PresenceConfig {
        credential: Some(TOKEN.to_string()),
        community_id: Some(GUILD.to_string()),
        ready_timeout_ms: 2_000,
        ..PresenceConfig::default()
    }
}

pub fn presence(id: &str, status: &str) -> GatewayEvent {
    GatewayEvent::PresenceUpdate {
        old: None,
        new: PresenceState {
            user_id: Some(UserId::from(id)),
            status: Some(status.to_string()),
            member: Some(member(id)),
            user: None,
        },
    }
}

pub fn removal(id: &str) -> GatewayEvent {
    GatewayEvent::MemberRemove { member: member(id) }
}

/// Wraps another gateway and fails selected calls on demand.
pub struct FlakyGateway {
    inner: Arc<dyn Gateway>,
    pub fail_connect: AtomicBool,
    /// `connect` never resolves, like a handshake that stalls upstream.
    pub stall_connect: AtomicBool,
    pub fail_member_count: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub stall_disconnect: AtomicBool,
}

impl FlakyGateway {
    pub fn new(inner: Arc<dyn Gateway>) -> Self {
        Self {
            inner,
            fail_connect: AtomicBool::new(false),
            stall_connect: AtomicBool::new(false),
            fail_member_count: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            stall_disconnect: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), GatewayError> {
        if flag.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for FlakyGateway {
    fn subscribe(&self) -> Result<mpsc::Receiver<GatewayEvent>, GatewayError> {
        self.inner.subscribe()
    }

    async fn connect(&self, credential: &str) -> Result<(), GatewayError> {
        Self::check(&self.fail_connect)?;
        if self.stall_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.connect(credential).await
    }

    async fn member_count(&self, community_id: &str) -> Result<u64, GatewayError> {
        Self::check(&self.fail_member_count)?;
        self.inner.member_count(community_id).await
    }

    async fn fetch_members(&self, community_id: &str) -> Result<(), GatewayError> {
        Self::check(&self.fail_fetch)?;
        self.inner.fetch_members(community_id).await
    }

    async fn cached_members(&self, community_id: &str) -> Result<Vec<MemberRecord>, GatewayError> {
        self.inner.cached_members(community_id).await
    }

    async fn cached_presence(&self, community_id: &str, user_id: &UserId) -> Option<String> {
        self.inner.cached_presence(community_id, user_id).await
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        if self.stall_disconnect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.disconnect().await
    }
}
