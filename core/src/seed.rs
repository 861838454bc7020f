//! One-shot population of the presence cache from the connection layer's
//! local member cache.
//!
//! Small communities get a full member listing first. At or above the
//! threshold the listing is skipped and only members the connection layer
//! already knows about are considered, so the initial snapshot of a large
//! community may be incomplete until presence events fill it in.

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::PresenceCache;
use crate::gateway::Gateway;
use crate::member::SnapshotBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOptions {
    pub bulk_fetch_threshold: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub member_count: Option<u64>,
    pub bulk_fetched: bool,
    pub scanned: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub async fn seed_cache(
    gateway: &dyn Gateway,
    cache: &PresenceCache,
    builder: &SnapshotBuilder,
    options: &SeedOptions,
) -> SeedReport {
    let community_id = builder.community_id();
    let mut report = SeedReport::default();

    match gateway.member_count(community_id).await {
        Ok(count) => {
            report.member_count = Some(count);
            if count < options.bulk_fetch_threshold {
                match gateway.fetch_members(community_id).await {
                    Ok(()) => report.bulk_fetched = true,
                    Err(err) => {
                        warn!(community_id, "full member fetch failed, seeding from cache: {err}");
                    }
                }
            } else {
                info!(
                    community_id,
                    count,
                    threshold = options.bulk_fetch_threshold,
                    "community too large for a full member fetch, seeding from cached members"
                );
            }
        }
        Err(err) => {
            warn!(community_id, "member count unavailable, seeding from cache: {err}");
        }
    }

    let members = match gateway.cached_members(community_id).await {
        Ok(members) => members,
        Err(err) => {
            warn!(community_id, "cached member listing failed: {err}");
            return report;
        }
    };

    for member in &members {
        report.scanned += 1;
        let status = gateway
            .cached_presence(community_id, member.id())
            .await
            .unwrap_or_default();
        let snapshot = match builder.from_member(member, &status) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => continue,
            Err(err) => {
                debug!(user_id = %member.id(), "skipping member during seeding: {err}");
                report.skipped += 1;
                continue;
            }
        };
        match cache.upsert(snapshot) {
            Ok(()) => report.inserted += 1,
            Err(err) => {
                debug!(user_id = %member.id(), "skipping member during seeding: {err}");
                report.skipped += 1;
            }
        }
    }

    info!(
        community_id,
        scanned = report.scanned,
        inserted = report.inserted,
        skipped = report.skipped,
        bulk_fetched = report.bulk_fetched,
        "presence seeding complete"
    );
    report
}
