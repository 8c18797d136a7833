//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret is loaded from HARVESTER_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use harvester::HarvestSettings;
use identity_pool::RotationPolicy;
use search_api::TimestampZone;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    pub identities: IdentitiesConfig,
    #[serde(default)]
    pub harvest: HarvestSettings,
    pub sink: SinkConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Remote endpoints and request settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub search_url: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Sent as `<user_agent> (<handle>)`
    pub user_agent: String,
    pub timeout_secs: u64,
    pub timestamp_zone: TimestampZone,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            search_url: search_api::DEFAULT_SEARCH_ENDPOINT.to_string(),
            authorize_url: harvest_auth::DEFAULT_AUTHORIZE_ENDPOINT.to_string(),
            token_url: harvest_auth::DEFAULT_TOKEN_ENDPOINT.to_string(),
            user_agent: format!("resume-harvester/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            timestamp_zone: TimestampZone::default(),
        }
    }
}

/// OAuth application credentials
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to HARVESTER_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

/// Identity pool sources
#[derive(Debug, Deserialize)]
pub struct IdentitiesConfig {
    /// `handle:secret` list, one per line
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Deserialize)]
pub struct SinkConfig {
    pub database_path: PathBuf,
}

/// Optional status server; disabled when `listen_addr` is unset
#[derive(Debug, Default, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. HARVESTER_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| common::Error::io(path, e))?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, url) in [
            ("api.search_url", &config.api.search_url),
            ("api.authorize_url", &config.api.authorize_url),
            ("api.token_url", &config.api.token_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if config.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("oauth.client_id must not be empty".into()));
        }

        config.harvest.validate().map_err(common::Error::Config)?;

        if let Ok(secret) = std::env::var("HARVESTER_CLIENT_SECRET") {
            config.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(Secret::new(secret));
            }
        }

        if config.oauth.client_secret.is_none() {
            return Err(common::Error::Config(
                "oauth client secret missing: set HARVESTER_CLIENT_SECRET or oauth.client_secret_file"
                    .into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("resume-harvester.toml")
    }
}
