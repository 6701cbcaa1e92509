use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::Level;

use pulse_core::security::{AdminToken, ApiKey};
use pulse_llm::{InsightGenerator, OpenRouterConfig, OpenRouterProvider};
use pulse_server::{LimiterConfig, ReviewOrchestrator, ServerConfig, SlidingWindowLimiter};
use pulse_settings::PulseSettings;
use pulse_store::{Database, ReviewRepo};
use pulse_telemetry::TelemetryConfig;

/// Review intake service: rate-limited submission with generated replies,
/// and an admin listing.
#[derive(Debug, Parser)]
#[command(name = "pulse", version)]
struct Cli {
    /// Settings file (defaults to ~/.pulse/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the listen address.
    #[arg(long)]
    host: Option<String>,
}

fn load(cli: &Cli) -> anyhow::Result<PulseSettings> {
    let mut settings = match &cli.config {
        Some(path) => pulse_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => pulse_settings::load_settings().context("loading settings")?,
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let log_level = settings.telemetry.log_level.parse::<Level>().ok();
    let telemetry = pulse_telemetry::init_telemetry(TelemetryConfig {
        log_level: log_level.unwrap_or(Level::INFO),
        log_format: settings.telemetry.log_format,
        metrics_enabled: settings.telemetry.metrics_enabled,
        ..Default::default()
    });
    if log_level.is_none() {
        tracing::warn!(value = %settings.telemetry.log_level, "invalid log level, using info");
    }
    let metrics = telemetry.metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting pulse");

    let db = Database::open(&settings.server.database_path).with_context(|| {
        format!(
            "opening database at {}",
            settings.server.database_path.display()
        )
    })?;

    let generator_settings = &settings.generator;
    if generator_settings.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; every review submission will fail");
    }
    let provider = OpenRouterProvider::new(OpenRouterConfig {
        api_key: generator_settings.api_key.clone().map(ApiKey),
        base_url: generator_settings.base_url.clone(),
        model: generator_settings.model.clone(),
        connect_timeout: Duration::from_secs(generator_settings.connect_timeout_secs),
        request_timeout: Duration::from_secs(settings.server.request_timeout_secs),
    })
    .context("building generation client")?;
    tracing::info!(
        base_url = %generator_settings.base_url,
        model = %generator_settings.model,
        "generation client ready"
    );
    let generator = InsightGenerator::new(Arc::new(provider))
        .with_temperature(generator_settings.temperature)
        .with_metrics(metrics.clone());

    let admin_token = settings.server.admin_token.clone().map(AdminToken::from);
    if admin_token.is_none() {
        tracing::warn!(
            "ADMINS_BASIC_AUTH_TOKEN is not set; GET /reviews is open to any caller"
        );
    }

    let window = Duration::from_secs(settings.rate_limit.window_secs);
    let limiter = Arc::new(SlidingWindowLimiter::new(LimiterConfig {
        window,
        max_requests: settings.rate_limit.max_requests,
    }));

    let orchestrator = ReviewOrchestrator::new(limiter, generator, ReviewRepo::new(db), admin_token)
        .with_metrics(metrics);

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        handler_timeout: Duration::from_secs(settings.server.request_timeout_secs + 10),
        sweep_interval: window,
    };
    let handle = pulse_server::start(config, Arc::new(orchestrator))
        .await
        .with_context(|| {
            format!(
                "binding {}:{}",
                settings.server.host, settings.server.port
            )
        })?;
    tracing::info!(addr = %handle.addr, "pulse ready");

    pulse_server::shutdown_signal().await;
    handle.shutdown().await;
    Ok(())
}
