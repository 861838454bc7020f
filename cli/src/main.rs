use clap::Parser;
use rollcall_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = rollcall_cli::init_logging() {
        eprintln!("{err:#}");
    }
    rollcall_cli::run(Cli::parse()).await
}
