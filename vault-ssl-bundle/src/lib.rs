//! Vault-backed SSL bundles.
//!
//! Resolves names of the form `vault:<path>` into [`SslBundle`]s built from
//! the PEM fields stored at that Vault path. Bundles are loaded on first use
//! and cached until invalidated; concurrent requests for the same name share
//! a single fetch.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use vault_ssl_bundle::{BundlesConfig, SslBundles};
//!
//! let bundles = SslBundles::from_config(&BundlesConfig::default())?;
//! let bundle = bundles.get_bundle("vault:secret/ssl/web").await?;
//! let server_config = bundle.server_config()?;
//! # let _ = server_config;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod defaults;
pub mod fetcher;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod vault;

pub use config::{BundlesConfig, ConfigError, LoggingConfig, PemBundleFiles, VaultConfig};
pub use fetcher::{MemoryFetcher, SecretFetcher};
pub use provider::{BundleProvider, DefaultProvider, SslBundles, VaultProvider};
pub use registry::{BundleEvent, BundleRegistry, BundleState, spawn_renewal_task};
pub use vault::{VaultKvFetcher, install_rustls_crypto_provider};

pub use vault_ssl_bundle_core::*;
