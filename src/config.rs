use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

use crate::services::feishu_client::DEFAULT_BASE_URL;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub feishu_base_url: String,
    pub remote_timeout: Duration,
    pub static_dir: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway for the Feishu open platform")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Feishu app id (overrides APP_ID)
    #[arg(long)]
    pub app_id: Option<String>,

    /// Feishu app secret (overrides APP_SECRET)
    #[arg(long)]
    pub app_secret: Option<String>,

    /// Feishu open platform base URL (overrides FEISHU_BASE_URL)
    #[arg(long)]
    pub feishu_base_url: Option<String>,

    /// Timeout for each outbound Feishu call, in seconds (overrides REMOTE_TIMEOUT_SECS)
    #[arg(long)]
    pub remote_timeout_secs: Option<u64>,

    /// Directory served under /static (overrides STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("PORT", 8080u16)?;
        let env_db = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/feishu_api.db".into());
        let env_app_id = env::var("APP_ID").unwrap_or_default();
        let env_app_secret = env::var("APP_SECRET").unwrap_or_default();
        let env_base_url =
            env::var("FEISHU_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let env_timeout = parse_env("REMOTE_TIMEOUT_SECS", 30u64)?;
        let env_static = env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            app_id: args.app_id.unwrap_or(env_app_id),
            app_secret: args.app_secret.unwrap_or(env_app_secret),
            feishu_base_url: args.feishu_base_url.unwrap_or(env_base_url),
            remote_timeout: Duration::from_secs(args.remote_timeout_secs.unwrap_or(env_timeout)),
            static_dir: args.static_dir.unwrap_or(env_static),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty()
    }
}

/// The secret stays out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("feishu_base_url", &self.feishu_base_url)
            .field("remote_timeout", &self.remote_timeout)
            .field("static_dir", &self.static_dir)
            .finish()
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
/// A present but unparseable value is an error.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_uses_default_when_unset() {
        let port = parse_env("FEISHU_GATEWAY_TEST_UNSET_PORT", 8080u16).unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            database_url: "sqlite::memory:".into(),
            app_id: "cli_a".into(),
            app_secret: "super-secret".into(),
            feishu_base_url: DEFAULT_BASE_URL.into(),
            remote_timeout: Duration::from_secs(30),
            static_dir: "./static".into(),
        };
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("super-secret"));
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert!(cfg.has_credentials());
    }
}
