use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `CIRCLE_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub presence_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("CIRCLE_JWT_SECRET").context("CIRCLE_JWT_SECRET must be set")?;
        if jwt_secret.is_empty() || jwt_secret == PLACEHOLDER_SECRET {
            bail!("CIRCLE_JWT_SECRET is empty or still the placeholder value");
        }

        let port = var("CIRCLE_PORT", "3000")
            .parse()
            .context("CIRCLE_PORT is not a valid port")?;
        let ttl_secs: u64 = var("CIRCLE_PRESENCE_TTL_SECS", "60")
            .parse()
            .context("CIRCLE_PRESENCE_TTL_SECS is not a number")?;

        Ok(Self {
            host: var("CIRCLE_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("CIRCLE_DB_PATH", "circle.db")),
            jwt_secret,
            storage_dir: PathBuf::from(var("CIRCLE_STORAGE_DIR", "./storage")),
            public_url: var("CIRCLE_PUBLIC_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            presence_ttl: Duration::from_secs(ttl_secs),
        })
    }

    /// Base URL that stored objects are served under.
    pub fn storage_base_url(&self) -> String {
        format!("{}/storage", self.public_url)
    }
}
