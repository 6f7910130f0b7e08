//! Startup configuration: environment variables plus CLI overrides.

use clap::Parser;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub graph_store_path: String,
    pub graph_store_pool_min: u32,
    pub graph_store_pool_max: u32,
    pub vector_db_url: String,
    pub redis_url: String,
    pub signing_key_seed: String,
    pub encryption_secret: String,
    pub bind_host: String,
    pub bind_port: u16,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required_env(key: &str) -> CoreResult<String> {
    std::env::var(key).map_err(|_| {
        CoreError::Config(format!("missing required environment variable {key}"))
    })
}

impl AppConfig {
    pub fn from_env() -> CoreResult<Self> {
        let pool_min: u32 = env_or("GRAPH_STORE_POOL_MIN", "10")
            .parse()
            .map_err(|_| CoreError::Config("GRAPH_STORE_POOL_MIN must be an integer".into()))?;
        let pool_max: u32 = env_or("GRAPH_STORE_POOL_MAX", "20")
            .parse()
            .map_err(|_| CoreError::Config("GRAPH_STORE_POOL_MAX must be an integer".into()))?;
        let bind_port: u16 = env_or("MYCELIUM_PORT", "8080")
            .parse()
            .map_err(|_| CoreError::Config("MYCELIUM_PORT must be a valid port".into()))?;

        Ok(AppConfig {
            graph_store_path: env_or("GRAPH_STORE_PATH", "mycelium.sqlite3"),
            graph_store_pool_min: pool_min,
            graph_store_pool_max: pool_max,
            vector_db_url: env_or("VECTOR_DB_URL", "http://localhost:6334"),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            signing_key_seed: required_env("QMN_SIGNING_KEY")?,
            encryption_secret: required_env("QMN_ENCRYPTION_SECRET")?,
            bind_host: env_or("MYCELIUM_HOST", "0.0.0.0"),
            bind_port,
        })
    }

    pub fn apply_overrides(&mut self, cli: &CliArgs) {
        if let Some(host) = &cli.host {
            self.bind_host = host.clone();
        }
        if let Some(port) = cli.port {
            self.bind_port = port;
        }
    }
}

/// `myceliumd` CLI overrides, applied on top of the environment-sourced
/// config (teacher pattern: `phago-web`'s `clap::Parser` binary args).
#[derive(Debug, Parser)]
#[command(name = "myceliumd", about = "Mycelial substrate data-plane daemon")]
pub struct CliArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub config: Option<String>,
}
