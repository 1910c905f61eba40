//! Configuration: Vault connection settings from the environment, and an
//! optional TOML file that adds logging settings and file-backed bundles.
//!
//! ```toml
//! [vault]
//! address = "https://vault.internal:8200"
//! namespace = "platform"
//! kv_version = "v2"
//!
//! [logging]
//! level = "debug"
//! json = true
//!
//! [bundles.local-dev]
//! certificate = "/etc/tls/dev.crt"
//! private_key = "/etc/tls/dev.key"
//! ca_certificate = "/etc/tls/ca.crt"
//! ```

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vault_ssl_bundle_core::{BundleError, KvVersion, VAULT_MARKER};

pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";
pub const ENV_VAULT_NAMESPACE: &str = "VAULT_NAMESPACE";
pub const ENV_VAULT_HTTP_TIMEOUT_SECS: &str = "VAULT_HTTP_TIMEOUT_SECS";
pub const ENV_VAULT_CA_BUNDLE: &str = "VAULT_CA_BUNDLE";
pub const ENV_VAULT_KV_VERSION: &str = "VAULT_KV_VERSION";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {name}: {message}")]
    InvalidEnv { name: &'static str, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to load bundle '{name}': {source}")]
    Bundle { name: String, source: BundleError },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_timeout_secs() -> u64 {
    defaults::VAULT_HTTP_TIMEOUT.as_secs()
}

/// Where and how to reach Vault
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    /// Base URL, e.g. `https://vault.internal:8200`
    pub address: String,
    /// Falls back to `VAULT_TOKEN` when absent from the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// PEM bundle of extra roots for verifying Vault's own certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<PathBuf>,
    #[serde(default)]
    pub kv_version: KvVersion,
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("namespace", &self.namespace)
            .field("timeout_secs", &self.timeout_secs)
            .field("ca_bundle", &self.ca_bundle)
            .field("kv_version", &self.kv_version)
            .finish()
    }
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: Some(token.into()),
            namespace: None,
            timeout_secs: default_timeout_secs(),
            ca_bundle: None,
            kv_version: KvVersion::default(),
        }
    }

    /// Read `VAULT_ADDR`, `VAULT_TOKEN` and the optional `VAULT_*` settings
    /// from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = non_empty(&lookup, ENV_VAULT_ADDR).ok_or(ConfigError::MissingEnv(ENV_VAULT_ADDR))?;
        let token = non_empty(&lookup, ENV_VAULT_TOKEN).ok_or(ConfigError::MissingEnv(ENV_VAULT_TOKEN))?;

        let timeout_secs = match non_empty(&lookup, ENV_VAULT_HTTP_TIMEOUT_SECS) {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnv {
                name: ENV_VAULT_HTTP_TIMEOUT_SECS,
                message: e.to_string(),
            })?,
            None => default_timeout_secs(),
        };

        let kv_version = match non_empty(&lookup, ENV_VAULT_KV_VERSION) {
            Some(raw) => parse_kv_version(&raw)?,
            None => KvVersion::default(),
        };

        let config = Self {
            address,
            token: Some(token),
            namespace: non_empty(&lookup, ENV_VAULT_NAMESPACE),
            timeout_secs,
            ca_bundle: non_empty(&lookup, ENV_VAULT_CA_BUNDLE).map(PathBuf::from),
            kv_version,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fill token and namespace from the environment where the file left
    /// them out.
    pub fn with_env_fallbacks<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.token.is_none() {
            self.token = non_empty(&lookup, ENV_VAULT_TOKEN);
        }
        if self.namespace.is_none() {
            self.namespace = non_empty(&lookup, ENV_VAULT_NAMESPACE);
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let address = self.address.trim();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Vault address '{}' must start with http:// or https://",
                self.address
            )));
        }
        if self.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "Vault token is required (set [vault].token or {})",
                ENV_VAULT_TOKEN
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Vault timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_kv_version(raw: &str) -> Result<KvVersion> {
    match raw.to_ascii_lowercase().as_str() {
        "auto" => Ok(KvVersion::Auto),
        "1" | "v1" => Ok(KvVersion::V1),
        "2" | "v2" => Ok(KvVersion::V2),
        other => Err(ConfigError::InvalidEnv {
            name: ENV_VAULT_KV_VERSION,
            message: format!("expected auto, v1 or v2, got '{}'", other),
        }),
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    defaults::LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// PEM files backing a non-Vault bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PemBundleFiles {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<PathBuf>,
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundlesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File-backed bundles served by the default provider
    #[serde(default)]
    pub bundles: HashMap<String, PemBundleFiles>,
}

impl BundlesConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that hold without consulting the environment. A missing Vault
    /// token is only reported once the client is built.
    pub fn validate(&self) -> Result<()> {
        if let Some(vault) = &self.vault {
            let address = vault.address.trim();
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "Vault address '{}' must start with http:// or https://",
                    vault.address
                )));
            }
        }

        for (name, files) in &self.bundles {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Bundle name cannot be empty".to_string(),
                ));
            }
            if name.starts_with(VAULT_MARKER) {
                return Err(ConfigError::Validation(format!(
                    "Bundle '{}' uses the reserved '{}' prefix; Vault bundles are loaded on demand",
                    name, VAULT_MARKER
                )));
            }
            if files.certificate.as_os_str().is_empty() || files.private_key.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Bundle '{}' needs both certificate and private_key paths",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_vault_config_from_env() {
        let config = VaultConfig::from_lookup(env(&[
            ("VAULT_ADDR", "https://vault.internal:8200"),
            ("VAULT_TOKEN", "s.abc"),
            ("VAULT_NAMESPACE", "platform"),
            ("VAULT_HTTP_TIMEOUT_SECS", "5"),
            ("VAULT_KV_VERSION", "v2"),
        ]))
        .unwrap();

        assert_eq!(config.address, "https://vault.internal:8200");
        assert_eq!(config.token.as_deref(), Some("s.abc"));
        assert_eq!(config.namespace.as_deref(), Some("platform"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.kv_version, KvVersion::V2);
        assert!(config.ca_bundle.is_none());
    }

    #[test]
    fn test_vault_config_from_env_defaults() {
        let config = VaultConfig::from_lookup(env(&[
            ("VAULT_ADDR", "http://127.0.0.1:8200"),
            ("VAULT_TOKEN", "root"),
            ("VAULT_NAMESPACE", "  "),
        ]))
        .unwrap();

        assert_eq!(config.timeout(), defaults::VAULT_HTTP_TIMEOUT);
        assert_eq!(config.kv_version, KvVersion::Auto);
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_vault_config_missing_env() {
        let err = VaultConfig::from_lookup(env(&[("VAULT_TOKEN", "root")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("VAULT_ADDR")));

        let err = VaultConfig::from_lookup(env(&[("VAULT_ADDR", "http://vault")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("VAULT_TOKEN")));
    }

    #[test]
    fn test_vault_config_invalid_env() {
        let err = VaultConfig::from_lookup(env(&[
            ("VAULT_ADDR", "http://vault"),
            ("VAULT_TOKEN", "root"),
            ("VAULT_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "VAULT_HTTP_TIMEOUT_SECS",
                ..
            }
        ));

        let err = VaultConfig::from_lookup(env(&[
            ("VAULT_ADDR", "vault.internal"),
            ("VAULT_TOKEN", "root"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_vault_config_debug_redacts_token() {
        let config = VaultConfig::new("http://vault", "s.very-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_env_fallbacks_only_fill_gaps() {
        let mut config = VaultConfig::new("http://vault", "from-file");
        config.token = None;
        let config = config.with_env_fallbacks(env(&[
            ("VAULT_TOKEN", "from-env"),
            ("VAULT_NAMESPACE", "team-a"),
        ]));
        assert_eq!(config.token.as_deref(), Some("from-env"));
        assert_eq!(config.namespace.as_deref(), Some("team-a"));

        let config = VaultConfig::new("http://vault", "from-file")
            .with_env_fallbacks(env(&[("VAULT_TOKEN", "from-env")]));
        assert_eq!(config.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = BundlesConfig::parse(
            r#"
[vault]
address = "https://vault.internal:8200"
kv_version = "v1"
timeout_secs = 3

[logging]
level = "debug"
json = true

[bundles.local-dev]
certificate = "/etc/tls/dev.crt"
private_key = "/etc/tls/dev.key"
"#,
        )
        .unwrap();

        let vault = config.vault.unwrap();
        assert_eq!(vault.address, "https://vault.internal:8200");
        assert!(vault.token.is_none());
        assert_eq!(vault.kv_version, KvVersion::V1);
        assert_eq!(vault.timeout_secs, 3);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let files = &config.bundles["local-dev"];
        assert_eq!(files.certificate, PathBuf::from("/etc/tls/dev.crt"));
        assert!(files.ca_certificate.is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = BundlesConfig::parse("  \n").unwrap();
        assert_eq!(config, BundlesConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_rejects_vault_prefixed_file_bundle() {
        let err = BundlesConfig::parse(
            r#"
[bundles."vault:secret/web"]
certificate = "a.crt"
private_key = "a.key"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("reserved")));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = BundlesConfig::parse("[vault\naddress = ").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[vault]\naddress = \"http://127.0.0.1:8200\"\ntoken = \"root\"").unwrap();

        let config = BundlesConfig::load_from_file(file.path()).unwrap();
        let vault = config.vault.unwrap();
        assert_eq!(vault.token.as_deref(), Some("root"));
        assert!(vault.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = BundlesConfig::load_from_file("/nonexistent/vault-ssl-bundle.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_, _)));
    }
}
