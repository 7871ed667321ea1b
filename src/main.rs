use claude_bridge::{build_router, AppState, Config, SharedLedger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "claude-bridge",
    about = "Anthropic Messages API proxy for OpenAI-compatible backends",
    version
)]
struct Cli {
    /// Bind host (overrides SERVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Request ledger file (JSONL)
    #[arg(long, default_value = "claude-bridge.jsonl")]
    ledger_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.tracing_filter())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ledger = SharedLedger::open(&cli.ledger_file)?;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let key_mark = |set: bool| if set { "set" } else { "not set" };
    info!("claude-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Preferred provider: {}", config.preferred_provider.tag());
    info!("  Big model:          {}", config.big_model);
    info!("  Small model:        {}", config.small_model);
    info!(
        "  OpenAI key: {} | Anthropic key: {} | NVIDIA NIM key: {}",
        key_mark(config.openai_api_key.is_some()),
        key_mark(config.anthropic_api_key.is_some()),
        key_mark(config.nvidia_nim_api_key.is_some()),
    );
    if let Some(ref url) = config.openai_base_url {
        info!("  OpenAI base URL:    {url}");
    }
    info!("  Ledger file:        {}", cli.ledger_file.display());

    let bind_addr = format!("{}:{}", config.server_host, config.server_port);
    let display_port = config.server_port;
    let state = Arc::new(AppState {
        config: Arc::new(config),
        client,
        ledger,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{bind_addr}");
    info!("");
    info!("  To use with Claude Code:");
    info!("    ANTHROPIC_BASE_URL=http://localhost:{display_port} claude");
    info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
