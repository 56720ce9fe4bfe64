use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use cg_domain::config::{Config, ConfigSeverity};
use cg_pipeline::{CancelRegistry, DeterministicPipeline, PipelineAdapter};
use cg_store::{ArtifactStore, Connector};

mod api;
mod auth;
mod cli;
mod scheduler;
mod state;
mod tier_policy;

use cli::{Cli, Command, ConfigCommand};
use scheduler::Scheduler;
use state::AppState;
use tier_policy::TierPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            let (config, _config_path) = cli::load_config()?;
            init_tracing(&config.observability);
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, _config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            let valid = cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Token { user_id, tier, email_verified, admin, ttl_secs }) => {
            let (config, _config_path) = cli::load_config()?;
            let secret = std::env::var(&config.auth.secret_key_env)
                .context("signing key env var not set")?;
            let tier: cg_domain::model::Tier = tier
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown tier {tier:?}"))?;
            let token = auth::sign_token(secret.as_bytes(), &user_id, tier, email_verified, admin, ttl_secs);
            println!("{token}");
            Ok(())
        }
        Some(Command::Version) => {
            println!("cg-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing, plus OTLP span export when
/// `observability.otlp_endpoint` is configured. With no endpoint set the
/// gateway emits JSON logs only — no collector dependency at all.
fn init_tracing(observability: &cg_domain::config::ObservabilityConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cg_gateway=debug"));

    let Some(endpoint) = observability.otlp_endpoint.clone() else {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
        return;
    };

    let tracer = match build_otlp_tracer(&endpoint, observability) {
        Ok(tracer) => tracer,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
            tracing::warn!(error = %e, endpoint, "failed to initialize OTLP exporter, falling back to JSON logging only");
            return;
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    tracing::info!(endpoint, "OTLP trace export enabled");
}

fn build_otlp_tracer(
    endpoint: &str,
    observability: &cg_domain::config::ObservabilityConfig,
) -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::trace::TracerProvider as _;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.to_string())
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            observability.sample_rate,
        ))
        .with_id_generator(opentelemetry_sdk::trace::RandomIdGenerator::default())
        .with_resource(opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
            "service.name",
            observability.service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer(observability.service_name.clone());
    opentelemetry::global::set_tracer_provider(provider);
    Ok(tracer)
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("cg-gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Artifact Store (C7) ──────────────────────────────────────────
    let store: Arc<dyn Connector> = Arc::new(
        ArtifactStore::connect(config.pool.clone())
            .await
            .context("connecting artifact store")?,
    );
    tracing::info!(database_url = %config.pool.database_url, "artifact store ready");

    // ── Event Bus (C4) ───────────────────────────────────────────────
    let bus = Arc::new(cg_bus::EventBus::new(
        Duration::from_millis(config.bus.keep_alive_interval_ms),
        config.bus.subscriber_buffer,
        config.bus.max_bytes_per_job,
        Duration::from_secs(config.bus.retention_after_terminal_secs),
    ));
    tracing::info!("event bus ready");

    // ── Content Cache (C3) ───────────────────────────────────────────
    let cache = Arc::new(cg_cache::ContentCache::new(config.cache.max_entries));
    tracing::info!(max_entries = config.cache.max_entries, "content cache ready");

    // ── Tier Policy (C2) ─────────────────────────────────────────────
    let catalog = Arc::new(config.load_tier_catalog());
    let tier_policy = Arc::new(TierPolicy::new(catalog, store.clone(), Duration::from_secs(60)));
    tracing::info!("tier policy ready");

    // ── Pipeline Adapter (C6) ────────────────────────────────────────
    let pipeline = Arc::new(PipelineAdapter::new(
        Arc::new(DeterministicPipeline::new()),
        bus.clone(),
        store.clone(),
        cache.clone(),
    ));
    let cancel_registry = Arc::new(CancelRegistry::new());
    tracing::info!("pipeline adapter ready");

    // ── Job Scheduler (C5) ───────────────────────────────────────────
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        bus.clone(),
        cache.clone(),
        tier_policy.clone(),
        pipeline.clone(),
        cancel_registry.clone(),
        config.job.clone(),
    ));
    tracing::info!(max_global_workers = config.job.max_global_workers, "job scheduler ready");

    // ── Security (read once at startup) ──────────────────────────────
    let secret_key = std::env::var(&config.auth.secret_key_env)
        .context(format!("{} must be set", config.auth.secret_key_env))?
        .into_bytes();
    let admin_token = match std::env::var(&config.auth.admin_token_env) {
        Ok(v) if !v.is_empty() => {
            tracing::info!(env_var = %config.auth.admin_token_env, "admin bearer-token auth enabled");
            Some(v)
        }
        _ => {
            tracing::warn!(
                env_var = %config.auth.admin_token_env,
                "admin bearer-token auth DISABLED — every admin request will be rejected"
            );
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        secret_key: Arc::new(secret_key),
        admin_token: Arc::new(admin_token),
        store,
        bus: bus.clone(),
        cache,
        tier_policy,
        pipeline,
        cancel_registry,
        scheduler,
    };

    // ── Periodic bus garbage collection ──────────────────────────────
    {
        let bus = bus.clone();
        let interval_secs = config.bus.gc_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                bus.gc();
            }
        });
    }
    tracing::info!(interval_secs = config.bus.gc_interval_secs, "bus GC task started");

    // ── CORS layer ────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ─────────────────
    let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ───────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "cg-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// carry a trailing `:*` wildcard port (e.g. `http://localhost:*`).
fn build_cors_layer(cors: &cg_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
