use crate::services::providers::fal::FalConfig;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

const DEFAULT_FAL_QUEUE_URL: &str = "https://queue.fal.run";
const DEFAULT_FAL_MODEL: &str = "fal-ai/z-image/turbo/lora";
const DEFAULT_FAL_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_FAL_MAX_WAIT_SECS: u64 = 300;
const DEFAULT_PUBLIC_API_URL: &str = "http://localhost:5000";

#[derive(Debug)]
pub struct GenerationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Base URL the web frontend proxies `/api/*` calls to.
    pub public_api_url: String,
    pub store: StoreSettings,
    pub provider: ProviderSettings,
    /// Refuse generations for users whose balance cannot cover the charge.
    pub require_credits: bool,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Apply the bundled schema at startup. Production databases are
    /// provisioned out of band, so this is off unless asked for.
    pub run_migrations: bool,
}

#[derive(Debug)]
pub enum StoreSettings {
    Postgres(DatabaseConfig),
    Memory,
}

#[derive(Debug)]
pub enum ProviderSettings {
    Fal(FalConfig),
    Mock,
}

impl StoreSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreSettings::Postgres(_) => "postgres",
            StoreSettings::Memory => "memory",
        }
    }
}

impl ProviderSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderSettings::Fal(_) => "fal",
            ProviderSettings::Mock => "mock",
        }
    }
}

impl GenerationConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let store = match get_env("GENERATION_STORE", Some("postgres"), false)?.as_str() {
            "postgres" => StoreSettings::Postgres(DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10, false)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1, false)?,
                run_migrations: parse_env("DATABASE_RUN_MIGRATIONS", false, false)?,
            }),
            "memory" => StoreSettings::Memory,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "GENERATION_STORE must be 'postgres' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let provider = match get_env("GENERATION_PROVIDER", Some("fal"), false)?.as_str() {
            "fal" => ProviderSettings::Fal(FalConfig {
                api_key: Secret::new(get_env("FAL_KEY", None, is_prod)?),
                queue_url: get_env("FAL_QUEUE_URL", Some(DEFAULT_FAL_QUEUE_URL), false)?,
                model: get_env("FAL_MODEL", Some(DEFAULT_FAL_MODEL), false)?,
                poll_interval: Duration::from_millis(parse_env(
                    "FAL_POLL_INTERVAL_MS",
                    DEFAULT_FAL_POLL_INTERVAL_MS,
                    false,
                )?),
                max_wait: Duration::from_secs(parse_env(
                    "FAL_MAX_WAIT_SECS",
                    DEFAULT_FAL_MAX_WAIT_SECS,
                    false,
                )?),
            }),
            "mock" if !is_prod => ProviderSettings::Mock,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "GENERATION_PROVIDER '{}' is not allowed here",
                    other
                )))
            }
        };

        Ok(GenerationConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("generation-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            public_api_url: get_env("NEXT_PUBLIC_API_URL", Some(DEFAULT_PUBLIC_API_URL), false)?,
            store,
            provider,
            require_credits: parse_env("GENERATION_REQUIRE_CREDITS", false, false)?,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(&default.to_string()), is_prod)?
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}
