use std::path::Path;

use anyhow::{Context, bail};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{info, warn};

const MIN_SECRET_LEN: usize = 32;
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
const MAX_MEMBERSHIP_TERM_DAYS: i64 = 365 * 10;
const MAX_SWEEP_INTERVAL_SECS: u64 = 60 * 60 * 24 * 7;

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub membership_term_days: i64,
    pub expiry_sweep_interval_secs: u64,
    pub admin_seed: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let admin_seed = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            (None, None) => None,
            _ => bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://gym.db?mode=rwc".to_string()),
            jwt_secret: jwt_secret()?,
            token_ttl_hours: bounded_var("TOKEN_TTL_HOURS", 2, 1, MAX_TOKEN_TTL_HOURS)?,
            membership_term_days: bounded_var(
                "MEMBERSHIP_TERM_DAYS",
                30,
                1,
                MAX_MEMBERSHIP_TERM_DAYS,
            )?,
            expiry_sweep_interval_secs: bounded_var(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                86_400,
                1,
                MAX_SWEEP_INTERVAL_SECS,
            )?,
            admin_seed,
        })
    }
}

fn var(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn bounded_var<T>(key: &str, default: T, min: T, max: T) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parsed_var(key, default)?;
    if value < min || value > max {
        bail!("{} must be between {} and {}, got {}", key, min, max, value);
    }
    Ok(value)
}

fn jwt_secret() -> anyhow::Result<String> {
    match var("JWT_SECRET") {
        Some(secret) if secret.len() >= MIN_SECRET_LEN => Ok(secret),
        Some(_) => bail!("JWT_SECRET must be at least {} characters long", MIN_SECRET_LEN),
        None if cfg!(debug_assertions) => {
            warn!("JWT_SECRET not set, generating a temporary secret; tokens will not survive a restart");
            Ok(rand::rng()
                .sample_iter(&Alphanumeric)
                .take(64)
                .map(char::from)
                .collect())
        }
        None => bail!("JWT_SECRET environment variable must be set in production"),
    }
}
