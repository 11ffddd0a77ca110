
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::metadata::{Profile, RecordKind, SizeLimits};
use crate::schema::Vectorizer;
use crate::store::FailureKind;
use crate::upload::RetryPolicy;

const APP_DIR: &str = ".catalog-kb";
const CONFIG_FILE: &str = "config.toml";

pub const ENV_WEAVIATE_URL: &str = "WEAVIATE_URL";
pub const ENV_WEAVIATE_API_KEY: &str = "WEAVIATE_API_KEY";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_BEDROCK_MODEL: &str = "BEDROCK_MODEL_ID";
pub const ENV_AWS_ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub vectorizer: Vectorizer,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub limits: SizeLimits,
    #[serde(default)]
    pub collections: CollectionNames,
    /// Only ever taken from the environment.
    #[serde(skip)]
    pub credentials: Option<AwsCredentials>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    /// Submission attempts per record, including the first.
    pub max_attempts: u32,
    pub backoff_secs: u64,
    /// Failure kinds that are worth another attempt.
    pub retry_on: Vec<FailureKind>,
    /// Pause between records.
    pub pause_ms: u64,
    pub profile: Profile,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_secs: 5,
            retry_on: vec![FailureKind::Timeout],
            pause_ms: 0,
            profile: Profile::Full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionNames {
    pub datasets: String,
    pub relationships: String,
    pub domain_tags: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            datasets: RecordKind::Dataset.default_collection().to_string(),
            relationships: RecordKind::Relationship.default_collection().to_string(),
            domain_tags: RecordKind::DomainTag.default_collection().to_string(),
        }
    }
}

impl CollectionNames {
    #[inline]
    pub fn for_kind(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Dataset => &self.datasets,
            RecordKind::Relationship => &self.relationships,
            RecordKind::DomainTag => &self.domain_tags,
        }
    }

    #[inline]
    pub fn all(&self) -> [&str; 3] {
        [&self.datasets, &self.relationships, &self.domain_tags]
    }
}

/// Credentials forwarded to the store for its vectorizer module.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for AwsCredentials {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid vectorizer setting '{0}': {1} (cannot be empty)")]
    InvalidVectorizer(&'static str, String),
    #[error("Invalid attempt count: {0} (must be between 1 and 10)")]
    InvalidMaxAttempts(u32),
    #[error("Invalid retry backoff: {0} (must be at most 300 seconds)")]
    InvalidBackoff(u64),
    #[error("Invalid pause between records: {0} (must be at most 60000 ms)")]
    InvalidPause(u64),
    #[error("Invalid size limit for {0}: {1} (must be at least 1)")]
    InvalidLimit(&'static str, usize),
    #[error("Invalid collection name: '{0}' (must start with an uppercase letter and contain only letters, digits and '_')")]
    InvalidCollectionName(String),
    #[error("Collection name '{0}' is used for more than one record kind")]
    DuplicateCollectionName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at `base_dir`.
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// `~/.catalog-kb`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(APP_DIR))
            .or_else(|| dirs::data_dir().map(|data| data.join("catalog-kb")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the settings file, apply environment overrides and validate.
    #[inline]
    pub fn resolve() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to locate configuration directory")?;
        let mut config = Self::load(&config_dir)?;
        config
            .apply_env(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE)
    }

    /// Override settings from environment variables. `lookup` returns the
    /// value of a variable; blank values are ignored.
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = var(ENV_WEAVIATE_URL) {
            self.store.set_url(&url)?;
        }
        if let Some(key) = var(ENV_WEAVIATE_API_KEY) {
            self.store.api_key = Some(key);
        }
        if let Some(region) = var(ENV_AWS_REGION) {
            self.vectorizer.region = region;
        }
        if let Some(model) = var(ENV_BEDROCK_MODEL) {
            self.vectorizer.model = model;
        }
        if let (Some(access_key_id), Some(secret_access_key)) =
            (var(ENV_AWS_ACCESS_KEY), var(ENV_AWS_SECRET_KEY))
        {
            self.credentials = Some(AwsCredentials {
                access_key_id,
                secret_access_key,
            });
        }

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.upload.validate()?;
        validate_vectorizer(&self.vectorizer)?;
        self.validate_limits()?;
        self.validate_collections()?;
        Ok(())
    }

    #[inline]
    pub fn store_url(&self) -> Result<Url, ConfigError> {
        self.store.url()
    }

    #[inline]
    pub fn set_vectorizer(
        &mut self,
        module: String,
        model: String,
        region: String,
    ) -> Result<(), ConfigError> {
        let vectorizer = Vectorizer {
            module,
            model,
            region,
        };
        validate_vectorizer(&vectorizer)?;
        self.vectorizer = vectorizer;
        Ok(())
    }

    fn validate_limits(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        for (name, value) in [
            ("description", limits.description),
            ("business_purpose", limits.business_purpose),
            ("column_semantics", limits.column_semantics),
            ("tags", limits.tags),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidLimit(name, value));
            }
        }
        Ok(())
    }

    fn validate_collections(&self) -> Result<(), ConfigError> {
        let names = self.collections.all();
        for (index, name) in names.iter().enumerate() {
            validate_collection_name(name)?;
            if names[..index].contains(name) {
                return Err(ConfigError::DuplicateCollectionName((*name).to_string()));
            }
        }
        Ok(())
    }
}

fn validate_vectorizer(vectorizer: &Vectorizer) -> Result<(), ConfigError> {
    for (name, value) in [
        ("module", &vectorizer.module),
        ("model", &vectorizer.model),
        ("region", &vectorizer.region),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidVectorizer(name, value.clone()));
        }
    }
    Ok(())
}

/// Collection names follow the store's class naming rules.
#[inline]
pub fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCollectionName(name.to_string()))
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Take protocol, host and port from a full URL such as
    /// `https://weaviate.example.com`.
    pub fn set_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let parsed = Url::parse(url.trim()).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;

        self.set_protocol(parsed.scheme().to_string())?;
        self.set_host(host)?;
        self.set_port(port)
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = StoreConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_timeout_secs(&mut self, timeout_secs: u64) -> Result<(), ConfigError> {
        if !(1..=600).contains(&timeout_secs) {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }
        self.timeout_secs = timeout_secs;
        Ok(())
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        if self.backoff_secs > 300 {
            return Err(ConfigError::InvalidBackoff(self.backoff_secs));
        }
        if self.pause_ms > 60_000 {
            return Err(ConfigError::InvalidPause(self.pause_ms));
        }
        Ok(())
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) -> Result<(), ConfigError> {
        if !(1..=10).contains(&max_attempts) {
            return Err(ConfigError::InvalidMaxAttempts(max_attempts));
        }
        self.max_attempts = max_attempts;
        Ok(())
    }

    pub fn set_backoff_secs(&mut self, backoff_secs: u64) -> Result<(), ConfigError> {
        if backoff_secs > 300 {
            return Err(ConfigError::InvalidBackoff(backoff_secs));
        }
        self.backoff_secs = backoff_secs;
        Ok(())
    }

    pub fn set_pause_ms(&mut self, pause_ms: u64) -> Result<(), ConfigError> {
        if pause_ms > 60_000 {
            return Err(ConfigError::InvalidPause(pause_ms));
        }
        self.pause_ms = pause_ms;
        Ok(())
    }

    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_secs(self.backoff_secs),
            retry_on: self.retry_on.clone(),
            pause: Duration::from_millis(self.pause_ms),
        }
    }
}
