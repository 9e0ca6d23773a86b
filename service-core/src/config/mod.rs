use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Config {
    /// Load the listener configuration.
    ///
    /// Precedence (lowest first): built-in default, `PORT`, `configuration.*`
    /// file, `APP__*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let port = port_from(env::var("PORT").ok().as_deref())?;

        let config = Cfg::builder()
            .set_default("port", i64::from(port))?
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Unset or empty `PORT` means the default; anything else must be a valid port.
fn port_from(raw: Option<&str>) -> Result<u16, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(p) => p.parse::<u16>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("PORT is invalid ({:?}): {}", p, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_port_uses_default() {
        assert_eq!(port_from(None).unwrap(), 5000);
        assert_eq!(port_from(Some("")).unwrap(), 5000);
    }

    #[test]
    fn valid_port_is_used() {
        assert_eq!(port_from(Some("8080")).unwrap(), 8080);
    }

    #[test]
    fn malformed_port_is_a_config_error() {
        for raw in ["80a", "70000", "-1"] {
            let err = port_from(Some(raw)).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "PORT={}", raw);
        }
    }
}
