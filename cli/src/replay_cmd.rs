use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rollcall_core::PresenceService;
use rollcall_core::gateway::LocalGateway;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::source::SourceArgs;
use crate::source::feed_events;
use crate::source::open_events;

/// Seed from a fixture, replay an event log and print the resulting summary.
#[derive(Debug, Parser)]
pub struct ReplayCli {
    #[command(flatten)]
    source: SourceArgs,

    /// Maximum number of members to include in the output.
    #[arg(long = "limit", default_value_t = 50)]
    limit: usize,

    /// How long to wait for ingestion to catch up with the log.
    #[arg(long = "drain-timeout-ms", default_value_t = 5_000)]
    drain_timeout_ms: u64,
}

pub async fn run(cli: ReplayCli) -> Result<()> {
    let fixture = cli.source.load_fixture()?;
    let config = cli.source.presence_config(&fixture)?;
    let (gateway, feed) = LocalGateway::new(fixture);
    let service = PresenceService::new(gateway.clone());

    let outcome = service.init(&config).await;
    if outcome.enabled {
        if let Some(path) = &cli.source.events {
            let report = feed_events(open_events(path).await?, &feed).await?;
            info!(sent = report.sent, skipped = report.skipped, "event log replayed");
            let drained = service
                .wait_for_events(
                    gateway.sent_events(),
                    Duration::from_millis(cli.drain_timeout_ms),
                )
                .await;
            if !drained {
                warn!("ingestion did not catch up before the drain timeout");
            }
        }
    }

    print_json(service.summary(cli.limit))?;
    service.stop().await;
    Ok(())
}

fn print_json<T: Serialize>(value: T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&value)?;
    println!("{rendered}");
    Ok(())
}
