//! Bundle lookup facade
//!
//! Names carrying the `vault:` marker are served by the registry; everything
//! else goes to an in-memory map of bundles registered up front, typically
//! from PEM files listed in the configuration.

use crate::config::{BundlesConfig, ConfigError, PemBundleFiles, VaultConfig};
use crate::fetcher::SecretFetcher;
use crate::registry::BundleRegistry;
use crate::vault::VaultKvFetcher;
use dashmap::DashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use vault_ssl_bundle_core::{BundleBuilder, BundleError, BundleName, Result, SslBundle};

/// Serves `vault:` names through a [`BundleRegistry`]
#[derive(Clone)]
pub struct VaultProvider {
    registry: Arc<BundleRegistry>,
}

impl VaultProvider {
    pub fn new(registry: Arc<BundleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<BundleRegistry> {
        &self.registry
    }

    pub async fn get(&self, name: &str) -> Result<Arc<SslBundle>> {
        self.registry.get(name).await
    }
}

/// Bundles registered by name ahead of time
#[derive(Default)]
pub struct DefaultProvider {
    bundles: DashMap<String, Arc<SslBundle>>,
    builder: BundleBuilder,
}

impl DefaultProvider {
    pub fn new(builder: BundleBuilder) -> Self {
        Self {
            bundles: DashMap::new(),
            builder,
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<SslBundle>> {
        self.bundles
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BundleError::NoSuchBundle(name.to_string()))
    }

    /// Insert or replace. Returns `true` if a bundle was replaced.
    pub fn register(&self, name: &str, bundle: Arc<SslBundle>) -> bool {
        self.bundles.insert(name.to_string(), bundle).is_some()
    }

    pub fn update(&self, name: &str, bundle: Arc<SslBundle>) -> Result<()> {
        match self.bundles.get_mut(name) {
            Some(mut entry) => {
                *entry = bundle;
                Ok(())
            }
            None => Err(BundleError::NoSuchBundle(name.to_string())),
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        self.bundles.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bundles.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Build a bundle from PEM files on disk and register it under `name`
    pub fn register_pem_files(&self, name: &str, files: &PemBundleFiles) -> Result<Arc<SslBundle>> {
        let certificate = read_pem(&files.certificate)?;
        let private_key = read_pem(&files.private_key)?;
        let ca_certificate = files.ca_certificate.as_deref().map(read_pem).transpose()?;

        let bundle = Arc::new(self.builder.build_from_pem(
            &certificate,
            &private_key,
            ca_certificate.as_deref(),
        )?);
        self.register(name, Arc::clone(&bundle));
        tracing::info!(
            bundle = name,
            certificate = %files.certificate.display(),
            "Registered SSL bundle from PEM files"
        );
        Ok(bundle)
    }
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| BundleError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Which provider answers for a name
#[derive(Clone, Copy)]
pub enum BundleProvider<'a> {
    Vault(&'a VaultProvider),
    Default(&'a DefaultProvider),
}

/// Entry point for applications: resolves any bundle name
pub struct SslBundles {
    vault: VaultProvider,
    default: DefaultProvider,
}

impl SslBundles {
    pub fn new(registry: Arc<BundleRegistry>) -> Self {
        Self {
            vault: VaultProvider::new(registry),
            default: DefaultProvider::default(),
        }
    }

    pub fn with_fetcher(fetcher: Arc<dyn SecretFetcher>) -> Self {
        Self::new(Arc::new(BundleRegistry::new(fetcher)))
    }

    /// Connect to Vault and register every file-backed bundle in `config`.
    ///
    /// Without a `[vault]` section the connection comes from `VAULT_*`
    /// environment variables.
    pub fn from_config(config: &BundlesConfig) -> std::result::Result<Self, ConfigError> {
        let vault_config = match &config.vault {
            Some(vault) => vault
                .clone()
                .with_env_fallbacks(|name| std::env::var(name).ok()),
            None => VaultConfig::from_env()?,
        };
        let fetcher = VaultKvFetcher::new(vault_config)?;
        let bundles = Self::with_fetcher(Arc::new(fetcher));

        let mut names: Vec<&String> = config.bundles.keys().collect();
        names.sort();
        for name in names {
            bundles
                .default
                .register_pem_files(name, &config.bundles[name])
                .map_err(|source| ConfigError::Bundle {
                    name: name.clone(),
                    source,
                })?;
        }
        Ok(bundles)
    }

    pub fn provider_for(&self, name: &str) -> BundleProvider<'_> {
        if BundleName::is_vault(name) {
            BundleProvider::Vault(&self.vault)
        } else {
            BundleProvider::Default(&self.default)
        }
    }

    pub async fn get_bundle(&self, name: &str) -> Result<Arc<SslBundle>> {
        match self.provider_for(name) {
            BundleProvider::Vault(vault) => vault.get(name).await,
            BundleProvider::Default(default) => default.get(name),
        }
    }

    /// Register a bundle under `name`, replacing any existing one
    pub fn register_bundle(&self, name: &str, bundle: SslBundle) -> Result<()> {
        let bundle = Arc::new(bundle);
        match self.provider_for(name) {
            BundleProvider::Vault(vault) => vault.registry().put(name, bundle),
            BundleProvider::Default(default) => {
                default.register(name, bundle);
                Ok(())
            }
        }
    }

    /// Replace a bundle that is already registered or loaded
    pub fn update_bundle(&self, name: &str, bundle: SslBundle) -> Result<()> {
        let bundle = Arc::new(bundle);
        match self.provider_for(name) {
            BundleProvider::Vault(vault) => vault.registry().update(name, bundle),
            BundleProvider::Default(default) => default.update(name, bundle),
        }
    }

    /// Forget `name`. Vault bundles are fetched again on next use.
    pub fn invalidate(&self, name: &str) -> bool {
        match self.provider_for(name) {
            BundleProvider::Vault(vault) => vault.registry().invalidate(name),
            BundleProvider::Default(default) => default.remove(name),
        }
    }

    pub fn registry(&self) -> &Arc<BundleRegistry> {
        self.vault.registry()
    }

    pub fn default_provider(&self) -> &DefaultProvider {
        &self.default
    }
}
