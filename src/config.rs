//! Settings for the server and the client.
//!
//! Values come from a YAML file (missing file means defaults), then from
//! `KEEPER_*` environment variables, which may also be set in a `.env` file.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::DEFAULT_TOKEN_TTL_MINUTES;
use crate::error::{KeeperError, Result};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

pub const SERVER_SETTINGS_FILE: &str = "server_settings.yml";
pub const CLIENT_SETTINGS_FILE: &str = "client_settings.yml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    pub host: String,
    pub db_location: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub queue_capacity: usize,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8080".to_string(),
            db_location: "keeper_data/server".to_string(),
            jwt_secret: "super_secret_salt".to_string(),
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_json: false,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: Self = read_yaml(path.as_ref())?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        override_from_env("KEEPER_HOST", &mut self.host)?;
        override_from_env("KEEPER_DB_LOCATION", &mut self.db_location)?;
        override_from_env("KEEPER_JWT_SECRET", &mut self.jwt_secret)?;
        override_from_env("KEEPER_TOKEN_TTL_MINUTES", &mut self.token_ttl_minutes)?;
        override_from_env("KEEPER_QUEUE_CAPACITY", &mut self.queue_capacity)?;
        override_from_env("KEEPER_LOG_JSON", &mut self.log_json)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:8080`.
    pub server_url: String,
    /// Where the local replica lives.
    pub db_location: String,
    pub token_file: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            db_location: "keeper_data/client".to_string(),
            token_file: ".keeper_token".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: Self = read_yaml(path.as_ref())?;
        override_from_env("KEEPER_SERVER_URL", &mut config.server_url)?;
        override_from_env("KEEPER_CLIENT_DB_LOCATION", &mut config.db_location)?;
        override_from_env("KEEPER_TOKEN_FILE", &mut config.token_file)?;
        Ok(config)
    }

    pub fn registration_url(&self) -> String {
        format!("{}/api/v1/registration", self.base())
    }

    pub fn auth_url(&self) -> String {
        format!("{}/api/v1/auth", self.base())
    }

    pub fn items_url(&self) -> String {
        format!("{}/api/v1/items", self.base())
    }

    fn base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

fn read_yaml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    // a .env next to the binary is optional
    let _ = dotenvy::dotenv();

    if !path.exists() {
        debug!("{} not found, using defaults", path.display());
        return Ok(T::default());
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents)
        .map_err(|e| KeeperError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .parse()
            .map_err(|e| KeeperError::Config(format!("{}={}: {}", key, raw, e)))?;
    }
    Ok(())
}
