//! Tracks which members of a single community are online.
//!
//! A [`PresenceService`] owns one [`PresenceCache`]. On `init` it connects to
//! a [`Gateway`], seeds the cache once the upstream reports ready and then
//! keeps it current from presence and membership events until `stop`.
//! Request handlers read it through [`PresenceService::summary`].

pub mod cache;
pub mod config;
pub mod gateway;
pub mod ingest;
pub mod lifecycle;
pub mod member;
pub mod seed;
pub mod stats;
pub mod status;

pub use cache::PresenceCache;
pub use config::PresenceConfig;
pub use gateway::Gateway;
pub use gateway::GatewayEvent;
pub use lifecycle::InitOutcome;
pub use lifecycle::LifecycleState;
pub use lifecycle::PresenceService;
pub use lifecycle::PresenceSummary;
pub use member::MemberSnapshot;
pub use member::UserId;
pub use stats::IngestStats;
pub use status::PresenceStatus;
pub use status::is_online_status;
