//! Core types for Vault-backed SSL bundles.
//!
//! Turns the PEM fields of a secret-store record into an immutable
//! [`SslBundle`]: an identity store, a trust store, and the rustls key and
//! trust managers derived from them. Fetching and caching live in the
//! `vault-ssl-bundle` crate.

pub mod bundle;
pub mod error;
pub mod info;
pub mod name;
pub mod pem;
pub mod record;

#[cfg(any(test, feature = "test-util"))]
pub mod testdata;

pub use bundle::{
    BundleBuilder, CA_ALIAS, IdentityStore, KEY_ALIAS, KeyManager, LEAF_ALIAS, PROTOCOL,
    SslBundle, TrustManagers, TrustStore,
};
pub use error::{BundleError, FetchError, Result};
pub use info::CertificateInfo;
pub use name::{BundleName, VAULT_MARKER};
pub use crate::pem::ParsedKeyMaterial;
pub use record::{
    CA_CERTIFICATE_FIELD, CERTIFICATE_FIELD, KvVersion, PRIVATE_KEY_FIELD, SecretMaterial,
    SecretRecord,
};
