use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Statuses that count a member as online. Anything else the upstream sends
/// (`offline`, `invisible`, or a value we have never seen) is represented by
/// the member being absent from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "dnd")]
    DoNotDisturb,
}

impl PresenceStatus {
    pub const ALL: [PresenceStatus; 3] = [
        PresenceStatus::Online,
        PresenceStatus::Idle,
        PresenceStatus::DoNotDisturb,
    ];

    /// Maps a raw upstream status onto the online set. Matching is exact and
    /// case-sensitive.
    pub fn classify(raw: &str) -> Option<Self> {
        match raw {
            "online" => Some(Self::Online),
            "idle" => Some(Self::Idle),
            "dnd" => Some(Self::DoNotDisturb),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::DoNotDisturb => "dnd",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_online_status(status: &str) -> bool {
    PresenceStatus::classify(status).is_some()
}
