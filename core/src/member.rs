use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::gateway::MemberRecord;
use crate::gateway::PresenceState;
use crate::status::PresenceStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The cached record for one online member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("member record has an empty user id")]
    EmptyUserId,
    #[error("no username available for user {0}")]
    MissingUsername(UserId),
}

/// Small, fixed-format avatar references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarFormat {
    pub cdn_base: String,
    pub size: u16,
}

impl Default for AvatarFormat {
    fn default() -> Self {
        Self {
            cdn_base: "https://cdn.discordapp.com".to_string(),
            size: 64,
        }
    }
}

impl AvatarFormat {
    pub fn user_avatar(&self, user_id: &UserId, hash: &str) -> String {
        format!(
            "{}/avatars/{user_id}/{hash}.png?size={}",
            self.base(),
            self.size
        )
    }

    pub fn member_avatar(&self, community_id: &str, user_id: &UserId, hash: &str) -> String {
        format!(
            "{}/guilds/{community_id}/users/{user_id}/avatars/{hash}.png?size={}",
            self.base(),
            self.size
        )
    }

    fn base(&self) -> &str {
        self.cdn_base.trim_end_matches('/')
    }
}

/// What a presence change means for the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Online(MemberSnapshot),
    Offline(UserId),
    /// The event named no user.
    Anonymous,
}

/// Builds snapshots for one community. Seeding and ingestion share this so
/// that classification and identity resolution cannot drift between them.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    community_id: String,
    avatars: AvatarFormat,
}

impl SnapshotBuilder {
    pub fn new(community_id: impl Into<String>, avatars: AvatarFormat) -> Self {
        Self {
            community_id: community_id.into(),
            avatars,
        }
    }

    pub fn community_id(&self) -> &str {
        &self.community_id
    }

    /// Snapshot for a member read from the connection layer's cache, or
    /// `None` when `raw_status` does not count as online.
    pub fn from_member(
        &self,
        member: &MemberRecord,
        raw_status: &str,
    ) -> Result<Option<MemberSnapshot>, SnapshotError> {
        let id = member.id();
        if id.is_empty() {
            return Err(SnapshotError::EmptyUserId);
        }
        let Some(status) = PresenceStatus::classify(raw_status) else {
            return Ok(None);
        };
        let username = member
            .user
            .username
            .clone()
            .ok_or_else(|| SnapshotError::MissingUsername(id.clone()))?;
        Ok(Some(MemberSnapshot {
            id: id.clone(),
            username,
            avatar_url: self.member_avatar_url(member),
            status,
        }))
    }

    /// Interprets the new side of a presence change. Identity comes from the
    /// attached member record when there is one, falling back to the bare
    /// user record field by field.
    pub fn from_presence(&self, state: &PresenceState) -> Result<PresenceChange, SnapshotError> {
        let Some(id) = state.user_id() else {
            return Ok(PresenceChange::Anonymous);
        };
        let Some(status) = state.status.as_deref().and_then(PresenceStatus::classify) else {
            return Ok(PresenceChange::Offline(id.clone()));
        };

        let member = state.member.as_ref();
        let user = state.user.as_ref();
        let username = member
            .and_then(|member| member.user.username.clone())
            .or_else(|| user.and_then(|user| user.username.clone()))
            .ok_or_else(|| SnapshotError::MissingUsername(id.clone()))?;
        let avatar_url = member
            .and_then(|member| self.member_avatar_url(member))
            .or_else(|| {
                user.and_then(|user| user.avatar.as_deref())
                    .map(|hash| self.avatars.user_avatar(id, hash))
            });

        Ok(PresenceChange::Online(MemberSnapshot {
            id: id.clone(),
            username,
            avatar_url,
            status,
        }))
    }

    fn member_avatar_url(&self, member: &MemberRecord) -> Option<String> {
        let id = member.id();
        if let Some(hash) = member.avatar.as_deref() {
            return Some(self.avatars.member_avatar(&self.community_id, id, hash));
        }
        member
            .user
            .avatar
            .as_deref()
            .map(|hash| self.avatars.user_avatar(id, hash))
    }
}
