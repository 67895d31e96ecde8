//! Initialization configuration.
//!
//! The core consumes an explicit [`Config`] value and never reads the
//! process environment itself; [`Config::from_env`] is the bridge the
//! server binary uses to map `MEMORAI_*` variables into one.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::net::IpAddr;

use crate::constants::DEFAULT_EMBEDDING_DIM;
use crate::index::DEFAULT_COLLECTION_NAME;
use crate::tier::TierLevel;

/// Minimum accepted encryption-key length, in characters.
pub const MIN_ENCRYPTION_KEY_CHARS: usize = 32;

/// Default Qdrant endpoint.
pub const DEFAULT_INDEX_URL: &str = "http://localhost:6334";

#[derive(Debug, Clone)]
/// Everything the engine and server need at initialization.
pub struct Config {
    /// Server port.
    pub port: u16,

    /// Server bind address.
    pub bind_addr: IpAddr,

    /// Vector index endpoint; `None` selects the in-memory backend.
    pub index_url: Option<String>,

    /// Vector index API key.
    pub index_api_key: Option<String>,

    /// Collection name.
    pub collection: String,

    /// Embedding dimension, fixed for the collection's lifetime.
    pub embedding_dim: usize,

    /// Remote embedding endpoint; enables the `advanced` tier.
    pub embedding_endpoint: Option<String>,

    /// Remote embedding API key.
    pub embedding_api_key: Option<String>,

    /// Deployment name; switches the remote provider to its
    /// deployment-keyed dialect.
    pub embedding_deployment: Option<String>,

    /// Local embedding sidecar URL; enables the `smart` tier.
    pub local_embedding_url: Option<String>,

    /// Highest tier to consider at startup.
    pub preferred_tier: Option<TierLevel>,

    /// Payload encryption key for the transport wrapper (≥ 32 chars).
    pub encryption_key: Option<String>,

    /// Hot-cache weight capacity.
    pub cache_capacity: u64,

    /// Test environments select the mock tier directly.
    pub test_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8484,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            index_url: Some(DEFAULT_INDEX_URL.to_string()),
            index_api_key: None,
            collection: DEFAULT_COLLECTION_NAME.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            embedding_endpoint: None,
            embedding_api_key: None,
            embedding_deployment: None,
            local_embedding_url: None,
            preferred_tier: None,
            encryption_key: None,
            cache_capacity: crate::cache::HotCache::<()>::DEFAULT_CAPACITY,
            test_mode: false,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "MEMORAI_PORT";
    const ENV_BIND_ADDR: &'static str = "MEMORAI_BIND_ADDR";
    const ENV_INDEX_URL: &'static str = "MEMORAI_INDEX_URL";
    const ENV_INDEX_API_KEY: &'static str = "MEMORAI_INDEX_API_KEY";
    const ENV_COLLECTION: &'static str = "MEMORAI_COLLECTION";
    const ENV_EMBEDDING_DIM: &'static str = "MEMORAI_EMBEDDING_DIM";
    const ENV_EMBEDDING_ENDPOINT: &'static str = "MEMORAI_EMBEDDING_ENDPOINT";
    const ENV_EMBEDDING_API_KEY: &'static str = "MEMORAI_EMBEDDING_API_KEY";
    const ENV_EMBEDDING_DEPLOYMENT: &'static str = "MEMORAI_EMBEDDING_DEPLOYMENT";
    const ENV_LOCAL_EMBEDDING_URL: &'static str = "MEMORAI_LOCAL_EMBEDDING_URL";
    const ENV_PREFERRED_TIER: &'static str = "MEMORAI_PREFERRED_TIER";
    const ENV_ENCRYPTION_KEY: &'static str = "MEMORAI_ENCRYPTION_KEY";
    const ENV_CACHE_CAPACITY: &'static str = "MEMORAI_CACHE_CAPACITY";
    const ENV_TEST_MODE: &'static str = "MEMORAI_TEST_MODE";

    /// Bridges `MEMORAI_*` environment variables into a config.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let index_url = Self::parse_optional_string_from_env(Self::ENV_INDEX_URL)
            .or(defaults.index_url);
        let index_api_key = Self::parse_optional_string_from_env(Self::ENV_INDEX_API_KEY);
        let collection =
            Self::parse_string_from_env(Self::ENV_COLLECTION, defaults.collection);
        let embedding_dim = Self::parse_dim_from_env(defaults.embedding_dim)?;
        let embedding_endpoint =
            Self::parse_optional_string_from_env(Self::ENV_EMBEDDING_ENDPOINT);
        let embedding_api_key =
            Self::parse_optional_string_from_env(Self::ENV_EMBEDDING_API_KEY);
        let embedding_deployment =
            Self::parse_optional_string_from_env(Self::ENV_EMBEDDING_DEPLOYMENT);
        let local_embedding_url =
            Self::parse_optional_string_from_env(Self::ENV_LOCAL_EMBEDDING_URL);
        let preferred_tier = Self::parse_tier_from_env()?;
        let encryption_key = Self::parse_optional_string_from_env(Self::ENV_ENCRYPTION_KEY);
        let cache_capacity =
            Self::parse_u64_from_env(Self::ENV_CACHE_CAPACITY, defaults.cache_capacity);
        let test_mode = env::var_os(Self::ENV_TEST_MODE).is_some_and(|v| !v.is_empty());

        Ok(Self {
            port,
            bind_addr,
            index_url,
            index_api_key,
            collection,
            embedding_dim,
            embedding_endpoint,
            embedding_api_key,
            embedding_deployment,
            local_embedding_url,
            preferred_tier,
            encryption_key,
            cache_capacity,
            test_mode,
        })
    }

    /// Validates cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dim == 0 {
            return Err(ConfigError::InvalidDimension {
                value: self.embedding_dim.to_string(),
            });
        }

        if let Some(key) = &self.encryption_key {
            let chars = key.chars().count();
            if chars < MIN_ENCRYPTION_KEY_CHARS {
                return Err(ConfigError::EncryptionKeyTooShort {
                    chars,
                    min: MIN_ENCRYPTION_KEY_CHARS,
                });
            }
        }

        if self.embedding_endpoint.is_some() && self.embedding_api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        Ok(())
    }

    /// The `addr:port` string the server binds.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_dim_from_env(default: usize) -> Result<usize, ConfigError> {
        match env::var(Self::ENV_EMBEDDING_DIM) {
            Ok(value) => {
                let dim: usize = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidDimension { value: value.clone() })?;
                if dim == 0 {
                    return Err(ConfigError::InvalidDimension { value });
                }
                Ok(dim)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_tier_from_env() -> Result<Option<TierLevel>, ConfigError> {
        match env::var(Self::ENV_PREFERRED_TIER) {
            Ok(value) => match value.trim().to_lowercase().as_str() {
                "" => Ok(None),
                "advanced" => Ok(Some(TierLevel::Advanced)),
                "smart" => Ok(Some(TierLevel::Smart)),
                "basic" => Ok(Some(TierLevel::Basic)),
                "mock" => Ok(Some(TierLevel::Mock)),
                _ => Err(ConfigError::InvalidTier { value }),
            },
            Err(_) => Ok(None),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
