pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// cg-gateway — a tiered content generation job server (`spec.md` §1).
#[derive(Debug, Parser)]
#[command(name = "cg-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Mint a signed bearer token for testing or operator use.
    Token {
        /// Subject user id.
        user_id: String,
        /// Tier to embed (free, basic, pro, enterprise).
        #[arg(long, default_value = "free")]
        tier: String,
        #[arg(long)]
        email_verified: bool,
        #[arg(long)]
        admin: bool,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `CG_CONFIG` (or
/// `config.toml` by default), applying the env var overrides from
/// `spec.md` §6.4 on top of whatever the file specifies.
pub fn load_config() -> anyhow::Result<(cg_domain::config::Config, String)> {
    let config_path = std::env::var("CG_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config: cg_domain::config::Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cg_domain::config::Config::default()
    };

    apply_env_overrides(&mut config);
    Ok((config, config_path))
}

fn apply_env_overrides(config: &mut cg_domain::config::Config) {
    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.pool.database_url = v;
    }
    if let Ok(v) = parse_env("PORT") {
        config.server.port = v;
    }
    if let Ok(v) = std::env::var("MODEL_ENDPOINT") {
        config.job.model_endpoint = Some(v);
    }
    if let Ok(v) = parse_env("MAX_GLOBAL_WORKERS") {
        config.job.max_global_workers = v;
    }
    if let Ok(v) = parse_env("KEEP_ALIVE_INTERVAL_MS") {
        config.bus.keep_alive_interval_ms = v;
    }
    if let Ok(v) = parse_env("JOB_TIMEOUT_SEC") {
        config.job.job_timeout_secs = v;
    }
    if let Ok(v) = parse_env("STAGE_TIMEOUT_SEC") {
        config.job.stage_timeout_secs = v;
    }
    if let Ok(v) = parse_env("CACHE_MAX_ENTRIES") {
        config.cache.max_entries = v;
    }
    if let Ok(v) = parse_env("POOL_SIZE") {
        config.pool.pool_size = v;
    }
    if let Ok(v) = parse_env("POOL_OVERFLOW") {
        config.pool.overflow = v;
    }
    if let Ok(v) = std::env::var("TIER_CONFIG_PATH") {
        config.tier_config_path = Some(v);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<T, ()> {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).ok_or(())
}
