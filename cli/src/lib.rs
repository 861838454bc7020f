pub mod replay_cmd;
pub mod serve_cmd;
pub mod source;

use anyhow::Result;
use anyhow::anyhow;
use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

use crate::replay_cmd::ReplayCli;
use crate::serve_cmd::ServeCli;

/// Track who is online in a community and report it.
#[derive(Debug, Parser)]
#[command(name = "rollcall", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Seed from a fixture, replay events and print the summary as JSON.
    Replay(ReplayCli),
    /// Serve presence summaries over HTTP.
    Serve(ServeCli),
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` overrides the
/// default `info` level. Fails if a global subscriber is already installed.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Replay(replay) => replay_cmd::run(replay).await,
        Command::Serve(serve) => serve_cmd::run(serve).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_logging_install_is_reported() {
        let _ = init_logging();
        let err = match init_logging() {
            Ok(()) => panic!("a second global subscriber was accepted"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("failed to install tracing subscriber"));
    }
}
