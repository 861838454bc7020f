use std::sync::Arc;
use std::sync::atomic::Ordering;

use core_test_support::FlakyGateway;
use core_test_support::GUILD;
use core_test_support::TOKEN;
use core_test_support::fixture;
use core_test_support::fixture_member;
use core_test_support::nameless_member;
use pretty_assertions::assert_eq;
use rollcall_core::PresenceCache;
use rollcall_core::gateway::FixtureMember;
use rollcall_core::gateway::Gateway;
use rollcall_core::gateway::LocalGateway;
use rollcall_core::member::AvatarFormat;
use rollcall_core::member::SnapshotBuilder;
use rollcall_core::seed::SeedOptions;
use rollcall_core::seed::SeedReport;
use rollcall_core::seed::seed_cache;

fn builder() -> SnapshotBuilder {
    SnapshotBuilder::new(GUILD, AvatarFormat::default())
}

fn ids(cache: &PresenceCache) -> Vec<String> {
    cache
        .snapshot(usize::MAX)
        .into_iter()
        .map(|member| member.id.to_string())
        .collect()
}

/// a and c are in the local cache up front; b and d only show up after a
/// full member fetch.
fn members() -> Vec<FixtureMember> {
    vec![
        fixture_member("a", "online", true),
        fixture_member("b", "idle", false),
        fixture_member("c", "offline", true),
        fixture_member("d", "dnd", false),
    ]
}

async fn connected(members: Vec<FixtureMember>) -> Arc<LocalGateway> {
    let (gateway, _feed) = LocalGateway::new(fixture(members));
    if let Err(err) = gateway.connect(TOKEN).await {
        panic!("connect failed: {err}");
    }
    gateway
}

#[tokio::test]
async fn small_community_gets_full_fetch() {
    let gateway = connected(members()).await;
    let cache = PresenceCache::new();

    let report = seed_cache(
        gateway.as_ref(),
        &cache,
        &builder(),
        &SeedOptions {
            bulk_fetch_threshold: 10,
        },
    )
    .await;

    assert_eq!(
        report,
        SeedReport {
            member_count: Some(4),
            bulk_fetched: true,
            scanned: 4,
            inserted: 3,
            skipped: 0,
        }
    );
    assert_eq!(gateway.bulk_fetches(), 1);
    assert_eq!(ids(&cache), vec!["a", "b", "d"]);
}

#[tokio::test]
async fn large_community_seeds_from_cached_members_only() {
    let gateway = connected(members()).await;
    let cache = PresenceCache::new();

    let report = seed_cache(
        gateway.as_ref(),
        &cache,
        &builder(),
        &SeedOptions {
            bulk_fetch_threshold: 4,
        },
    )
    .await;

    assert!(!report.bulk_fetched);
    assert_eq!(report.scanned, 2);
    assert_eq!(gateway.bulk_fetches(), 0);
    assert_eq!(ids(&cache), vec!["a"]);
}

#[tokio::test]
async fn malformed_member_is_skipped_not_fatal() {
    let mut members = members();
    members.insert(
        1,
        FixtureMember {
            member: nameless_member("broken"),
            status: Some("online".to_string()),
            cached: true,
        },
    );
    let gateway = connected(members).await;
    let cache = PresenceCache::new();

    let report = seed_cache(
        gateway.as_ref(),
        &cache,
        &builder(),
        &SeedOptions {
            bulk_fetch_threshold: 100,
        },
    )
    .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.inserted, 3);
    assert_eq!(ids(&cache), vec!["a", "b", "d"]);
}

#[tokio::test]
async fn upstream_failures_fall_back_to_cached_members() {
    let local = connected(members()).await;
    let flaky = FlakyGateway::new(local.clone());
    flaky.fail_fetch.store(true, Ordering::SeqCst);
    let cache = PresenceCache::new();
    let options = SeedOptions {
        bulk_fetch_threshold: 100,
    };

    let report = seed_cache(&flaky, &cache, &builder(), &options).await;
    assert_eq!(report.member_count, Some(4));
    assert!(!report.bulk_fetched);
    assert_eq!(ids(&cache), vec!["a"]);

    flaky.fail_member_count.store(true, Ordering::SeqCst);
    flaky.fail_fetch.store(false, Ordering::SeqCst);
    cache.clear();
    let report = seed_cache(&flaky, &cache, &builder(), &options).await;
    assert_eq!(report.member_count, None);
    assert!(!report.bulk_fetched);
    assert_eq!(local.bulk_fetches(), 0);
    assert_eq!(ids(&cache), vec!["a"]);
}

#[tokio::test]
async fn seeding_uses_small_avatar_urls() {
    let gateway = connected(vec![fixture_member("a", "online", true)]).await;
    let cache = PresenceCache::new();
    seed_cache(
        gateway.as_ref(),
        &cache,
        &builder(),
        &SeedOptions {
            bulk_fetch_threshold: 0,
        },
    )
    .await;
    let avatar = cache
        .snapshot(1)
        .into_iter()
        .next()
        .and_then(|member| member.avatar_url);
    assert_eq!(
        avatar.as_deref(),
        Some("https://cdn.discordapp.com/avatars/a/hash-a.png?size=64")
    );
}
