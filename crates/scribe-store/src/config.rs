//! Configuration: a TOML file overridden by `SCRIBE_*` environment variables.
//!
//! Key material may be given inline or as a path through the matching
//! `*_FILE` variable (or `*_file` key in the TOML file). Inline values win.

use scribe_chain::Chain;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ENV_DATABASE_URL: &str = "SCRIBE_DATABASE_URL";
pub const ENV_PUBLIC_KEY: &str = "SCRIBE_PUBLIC_KEY";
pub const ENV_PRIVATE_KEY: &str = "SCRIBE_PRIVATE_KEY";
pub const ENV_PASSPHRASE: &str = "SCRIBE_PRIVATE_KEY_PASSPHRASE";
pub const ENV_SYSTEM_ID: &str = "SCRIBE_SYSTEM_ID";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SCRIBE_REQUEST_TIMEOUT_MS";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://scribe.db";
pub const DEFAULT_SYSTEM_ID: &str = "scribe";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} is not configured")]
    Missing(&'static str),
}

/// Layout of the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database_url: Option<String>,
    system_id: Option<String>,
    public_key: Option<String>,
    public_key_file: Option<PathBuf>,
    private_key: Option<String>,
    private_key_file: Option<PathBuf>,
    private_key_passphrase: Option<String>,
    request_timeout_ms: Option<u64>,
}

/// Resolved settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ScribeConfig {
    pub database_url: String,
    pub system_id: String,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub private_key_passphrase: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            system_id: DEFAULT_SYSTEM_ID.to_string(),
            public_key: None,
            private_key: None,
            private_key_passphrase: None,
            request_timeout: None,
        }
    }
}

impl fmt::Debug for ScribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ScribeConfig")
            .field("database_url", &self.database_url)
            .field("system_id", &self.system_id)
            .field("public_key", &self.public_key.as_ref().map(|_| "<set>"))
            .field("private_key", &redact(&self.private_key))
            .field("private_key_passphrase", &redact(&self.private_key_passphrase))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ScribeConfig {
    /// Load from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let text = path.map(read).transpose()?;
        Self::from_sources(text.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve settings from TOML text and an environment lookup.
    pub fn from_sources<F>(toml_text: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match toml_text {
            Some(text) => toml::from_str(text)?,
            None => FileConfig::default(),
        };
        let env = |key: &str| env(key).filter(|value| !value.is_empty());

        let database_url = env(ENV_DATABASE_URL)
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let system_id = env(ENV_SYSTEM_ID)
            .or(file.system_id)
            .unwrap_or_else(|| DEFAULT_SYSTEM_ID.to_string());

        let public_key = secret(&env, ENV_PUBLIC_KEY, file.public_key, file.public_key_file)?;
        let private_key = secret(&env, ENV_PRIVATE_KEY, file.private_key, file.private_key_file)?;
        let private_key_passphrase = env(ENV_PASSPHRASE).or(file.private_key_passphrase);

        let request_timeout_ms = match env(ENV_REQUEST_TIMEOUT_MS) {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue {
                    key: ENV_REQUEST_TIMEOUT_MS,
                    value,
                }
            })?),
            None => file.request_timeout_ms,
        };

        let config = Self {
            database_url,
            system_id,
            public_key,
            private_key,
            private_key_passphrase,
            request_timeout: request_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };
        debug!(?config, "resolved configuration");
        Ok(config)
    }

    /// Whether signing keys are configured.
    pub fn can_sign(&self) -> bool {
        self.private_key.is_some() && self.private_key_passphrase.is_some()
    }

    /// Build a chain engine from the configured keys.
    ///
    /// The public key is required. Signing is enabled when both a private
    /// key and a passphrase are present.
    pub fn chain(&self) -> Result<Chain, ConfigError> {
        let public_key = self
            .public_key
            .as_ref()
            .ok_or(ConfigError::Missing(ENV_PUBLIC_KEY))?;

        let mut chain = Chain::init(public_key.clone(), vec![]);
        if let (Some(private_key), Some(passphrase)) = (&self.private_key, &self.private_key_passphrase) {
            chain.set_auth(private_key.clone(), passphrase.clone());
        }
        Ok(chain)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Inline env value, then `<KEY>_FILE`, then the file's inline value, then
/// the file's path.
fn secret<F>(
    env: &F,
    key: &str,
    inline: Option<String>,
    file_path: Option<PathBuf>,
) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(key) {
        return Ok(Some(value));
    }
    if let Some(path) = env(&format!("{key}_FILE")) {
        return read(Path::new(&path)).map(Some);
    }
    if inline.is_some() {
        return Ok(inline);
    }
    file_path.map(|path| read(&path)).transpose()
}
