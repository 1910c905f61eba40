//! Bundle names of the form `vault:<path>`.

use crate::error::{BundleError, Result};
use std::fmt;

/// Protocol marker that routes a bundle name to Vault.
pub const VAULT_MARKER: &str = "vault:";

/// A validated `vault:<path>` bundle name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleName {
    name: String,
}

impl BundleName {
    /// Parse a bundle name, rejecting anything without the `vault:` marker
    /// or with an empty path after it.
    pub fn parse(name: &str) -> Result<Self> {
        match name.strip_prefix(VAULT_MARKER) {
            Some(path) if !path.trim().is_empty() => Ok(Self {
                name: name.to_string(),
            }),
            _ => Err(BundleError::UnsupportedBundleName(name.to_string())),
        }
    }

    /// Whether `name` belongs to the Vault provider.
    ///
    /// Pure prefix check; a name that passes may still fail [`BundleName::parse`]
    /// if its path is empty.
    pub fn is_vault(name: &str) -> bool {
        name.starts_with(VAULT_MARKER)
    }

    /// The full name including the marker
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The secret-store path, passed verbatim to the fetcher
    pub fn path(&self) -> &str {
        &self.name[VAULT_MARKER.len()..]
    }
}

impl fmt::Display for BundleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<&str> for BundleName {
    type Error = BundleError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}
