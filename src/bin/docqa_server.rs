use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use docqa::server::{router, AppState};
use docqa::telemetry::init_tracing;
use docqa::{PipelineArgs, RagError, RequestLimiter};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "docqa-server",
    about = "HTTP API that ingests the document corpus and answers questions over it"
)]
struct ServerCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "DOCQA_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Max /query requests per minute (0 disables rate limiting).
    #[arg(long, env = "DOCQA_MAX_REQUESTS_PER_MINUTE", default_value_t = 120)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (requests admitted instantly).
    #[arg(long, env = "DOCQA_RATE_LIMIT_BURST", default_value_t = 12)]
    rate_limit_burst: u32,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = ServerCli::parse();
    match serve(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<RagError>() {
                Some(RagError::Configuration(message)) => {
                    error!("{message}");
                    eprintln!("configuration error: {message}");
                }
                _ => error!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli: ServerCli) -> Result<()> {
    let pipelines = cli.pipeline.build_pipelines().await?;
    let limiter = RequestLimiter::new(cli.max_requests_per_minute, cli.rate_limit_burst);
    let state = AppState::new(
        pipelines.store,
        pipelines.ingestor,
        pipelines.query,
        cli.pipeline.chunk_size.max(1),
    )
    .with_rate_limiter(limiter);
    let app = router(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("docqa-server listening on http://{addr}");
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}
