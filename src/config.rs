use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr};

use crate::services::{
    payment_service::{DEFAULT_CURRENCY, DEFAULT_PRICE_MINOR},
    storage_service::DEFAULT_UPLOAD_TTL_SECS,
};

/// Used when `RAZORPAY_KEY_SECRET` is unset so local development works.
/// Signatures made with it are worthless outside a dev machine.
const DEV_KEY_SECRET: &str = "valentine-dev-secret";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Origin clients use to reach this server; signed and public URLs are
    /// built from it.
    pub public_url: String,
    pub upload_ttl_secs: i64,
    pub price_minor: i64,
    pub currency: String,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Valentine page publishing API")]
pub struct Args {
    /// Host to bind to (overrides VALENTINE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VALENTINE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where photos are stored (overrides VALENTINE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides VALENTINE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public origin of this server (overrides VALENTINE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("VALENTINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("VALENTINE_PORT", 3000u16)?;
        let env_storage =
            env::var("VALENTINE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("VALENTINE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/valentine.db".into());
        let env_public = env::var("VALENTINE_PUBLIC_URL").ok();

        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or(env_public)
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let razorpay_key_id = env::var("RAZORPAY_KEY_ID").ok().filter(|v| !v.is_empty());
        let razorpay_key_secret = match env::var("RAZORPAY_KEY_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                if razorpay_key_id.is_some() {
                    anyhow::bail!("RAZORPAY_KEY_ID is set but RAZORPAY_KEY_SECRET is missing");
                }
                tracing::warn!("RAZORPAY_KEY_SECRET not set; using the development secret");
                DEV_KEY_SECRET.to_string()
            }
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url,
            upload_ttl_secs: parse_env("VALENTINE_UPLOAD_TTL_SECS", DEFAULT_UPLOAD_TTL_SECS)?,
            price_minor: parse_env("VALENTINE_PRICE_MINOR", DEFAULT_PRICE_MINOR)?,
            currency: env::var("VALENTINE_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.into()),
            razorpay_key_id,
            razorpay_key_secret,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field("upload_ttl_secs", &self.upload_ttl_secs)
            .field("price_minor", &self.price_minor)
            .field("currency", &self.currency)
            .field("razorpay_key_id", &self.razorpay_key_id)
            .field("razorpay_key_secret", &"<redacted>")
            .finish()
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
