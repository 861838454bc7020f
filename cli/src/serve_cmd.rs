use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use clap::Parser;
use rollcall_core::IngestStats;
use rollcall_core::LifecycleState;
use rollcall_core::PresenceService;
use rollcall_core::PresenceSummary;
use rollcall_core::gateway::LocalGateway;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::info;
use tracing::warn;

use crate::source::SourceArgs;
use crate::source::feed_events;
use crate::source::open_events;

pub const DEFAULT_LIMIT: usize = 50;

/// Serve presence summaries over HTTP until interrupted.
#[derive(Debug, Parser)]
pub struct ServeCli {
    #[command(flatten)]
    source: SourceArgs,

    /// Address to bind the HTTP listener to.
    #[arg(long = "listen", value_name = "ADDR", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsResponse {
    pub state: LifecycleState,
    pub seeded: bool,
    pub stats: IngestStats,
}

pub fn router(service: Arc<PresenceService>) -> Router {
    Router::new()
        .route("/presence", get(summary_handler))
        .route("/presence/stats", get(stats_handler))
        .with_state(service)
}

pub async fn summary_handler(
    State(service): State<Arc<PresenceService>>,
    Query(query): Query<SummaryQuery>,
) -> Json<PresenceSummary> {
    Json(service.summary(query.limit.unwrap_or(DEFAULT_LIMIT)))
}

pub async fn stats_handler(State(service): State<Arc<PresenceService>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        state: service.state(),
        seeded: service.is_seeded(),
        stats: service.stats(),
    })
}

pub async fn run(cli: ServeCli) -> Result<()> {
    let fixture = cli.source.load_fixture()?;
    let config = cli.source.presence_config(&fixture)?;
    let (gateway, feed) = LocalGateway::new(fixture);
    let service = Arc::new(PresenceService::new(gateway));

    let outcome = service.init(&config).await;
    if !outcome.enabled {
        warn!("serving with presence tracking disabled");
    }

    let replay = match (&cli.source.events, outcome.enabled) {
        (Some(path), true) => {
            let reader = open_events(path).await?;
            Some(tokio::spawn(async move {
                match feed_events(reader, &feed).await {
                    Ok(report) => {
                        info!(sent = report.sent, skipped = report.skipped, "event feed finished");
                    }
                    Err(err) => warn!("event feed failed: {err:#}"),
                }
            }))
        }
        _ => None,
    };

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("presence server listening on {}", cli.listen);

    let served = axum::serve(listener, router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(replay) = replay {
        replay.abort();
    }
    service.stop().await;
    served.context("presence server failed")
}

async fn shutdown_signal() {
    let interrupt = async {
        match ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(err) => {
                warn!("failed to listen for Ctrl+C: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}
