//! Inputs shared by every subcommand: presence config, guild fixture and the
//! event feed.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use rollcall_core::GatewayEvent;
use rollcall_core::PresenceConfig;
use rollcall_core::gateway::GatewayFeed;
use rollcall_core::gateway::GuildFixture;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::warn;

#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// TOML presence config. Environment variables override it.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON description of the community (members, counts, credential).
    #[arg(long = "fixture", value_name = "PATH")]
    pub fixture: PathBuf,

    /// Gateway events as JSON lines; `-` reads stdin.
    #[arg(long = "events", value_name = "PATH")]
    pub events: Option<PathBuf>,
}

impl SourceArgs {
    pub fn load_fixture(&self) -> Result<GuildFixture> {
        let raw = std::fs::read_to_string(&self.fixture)
            .with_context(|| format!("failed to read fixture {}", self.fixture.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse fixture {}", self.fixture.display()))
    }

    /// Config file, then environment, then whatever the fixture supplies for
    /// fields still unset.
    pub fn presence_config(&self, fixture: &GuildFixture) -> Result<PresenceConfig> {
        let mut config = match &self.config {
            Some(path) => PresenceConfig::load(path)?,
            None => PresenceConfig::default(),
        };
        config.apply_process_env()?;
        if config.community_id.is_none() {
            config.community_id = Some(fixture.id.clone());
        }
        if config.credential.is_none() {
            config.credential = fixture.credential.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    pub sent: u64,
    pub skipped: u64,
}

pub async fn open_events(path: &Path) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open events {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Pushes every decodable line into `feed`. Blank lines and `#` comments are
/// ignored; undecodable lines are logged and skipped. Stops early if the
/// gateway closes its stream.
pub async fn feed_events<R>(reader: R, feed: &GatewayFeed) -> Result<FeedReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = FeedReport::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await.context("failed to read events")? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: GatewayEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = line_no, "skipping malformed event: {err}");
                report.skipped += 1;
                continue;
            }
        };
        if let Err(err) = feed.send(event).await {
            warn!(line = line_no, "gateway stopped accepting events: {err}");
            break;
        }
        report.sent += 1;
    }
    Ok(report)
}
