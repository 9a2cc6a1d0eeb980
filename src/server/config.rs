use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid listen_addr '{0}'")]
    InvalidListenAddr(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub log_dir: String,
    pub max_db_connections: u32,
    pub auto_create_schema: bool,
    /// Embed the text of unexpected failures in error responses.
    pub expose_internal_errors: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    max_db_connections: Option<u32>,
    auto_create_schema: Option<bool>,
    expose_internal_errors: Option<bool>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_max_db_connections() -> u32 {
    10
}

impl ServerConfig {
    /// `.env`, then the optional TOML file, then the environment; later layers win.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => PartialServerConfig::default(),
        };

        let env_config = envy::from_env::<PartialServerConfig>()?;

        Self::merge(env_config, file_config)
    }

    fn merge(env_config: PartialServerConfig, file_config: PartialServerConfig) -> Result<Self, ConfigError> {
        let listen_addr = match env_config.listen_addr.or(file_config.listen_addr) {
            Some(addr) => addr.parse().map_err(|_| ConfigError::InvalidListenAddr(addr))?,
            None => default_listen_addr(),
        };

        Ok(ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            listen_addr,
            log_dir: env_config.log_dir.or(file_config.log_dir).unwrap_or_else(default_log_dir),
            max_db_connections: env_config
                .max_db_connections
                .or(file_config.max_db_connections)
                .unwrap_or_else(default_max_db_connections),
            auto_create_schema: env_config
                .auto_create_schema
                .or(file_config.auto_create_schema)
                .unwrap_or(true),
            expose_internal_errors: env_config
                .expose_internal_errors
                .or(file_config.expose_internal_errors)
                .unwrap_or(true),
        })
    }

    /// Defaults for everything except the database, as used by the router tests.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        ServerConfig {
            database_url: database_url.into(),
            listen_addr: default_listen_addr(),
            log_dir: default_log_dir(),
            max_db_connections: default_max_db_connections(),
            auto_create_schema: true,
            expose_internal_errors: true,
        }
    }
}
