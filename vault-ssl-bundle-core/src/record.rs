//! Flat secret records as returned by a secret fetcher.
//!
//! A record is a plain `field -> string` map. KV-v2 responses wrap the
//! fields in an extra `data` object; [`SecretRecord::from_response_data`]
//! removes that layer so the rest of the pipeline only ever sees the flat
//! shape with underscore field names.

use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Leaf certificate PEM
pub const CERTIFICATE_FIELD: &str = "certificate";
/// Private key PEM (PKCS#8, PKCS#1 RSA or SEC1 EC)
pub const PRIVATE_KEY_FIELD: &str = "private_key";
/// Optional CA certificate PEM (may be a chain)
pub const CA_CERTIFICATE_FIELD: &str = "ca_certificate";

/// How the `data` object of a secret-store response is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvVersion {
    /// Unwrap `data.data` when the response looks like KV-v2 (has `metadata`)
    #[default]
    Auto,
    /// Fields sit directly in `data`
    V1,
    /// Fields sit in `data.data`
    V2,
}

/// Flat mapping from field name to string value for one secret path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRecord {
    fields: HashMap<String, String>,
}

impl SecretRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Normalize the `data` object of a secret-store response into a flat record.
    ///
    /// Non-string values are dropped. Returns `None` when `data` is not an
    /// object (or the KV-v2 `data.data` layer is missing or null, which is how
    /// Vault reports a soft-deleted version).
    pub fn from_response_data(data: &Value, version: KvVersion) -> Option<Self> {
        let outer = data.as_object()?;
        let fields = match version {
            KvVersion::V1 => outer,
            KvVersion::V2 => outer.get("data")?.as_object()?,
            KvVersion::Auto => match (outer.get("data"), outer.get("metadata")) {
                (Some(Value::Object(inner)), Some(Value::Object(_))) => inner,
                (Some(Value::Null), Some(Value::Object(_))) => return None,
                _ => outer,
            },
        };
        Some(Self::from_map(fields))
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect();
        Self { fields }
    }

    /// Extract the certificate material, failing with
    /// [`BundleError::MissingSecretData`] when a required field is absent or blank.
    pub fn material(&self, path: &str) -> Result<SecretMaterial> {
        let certificate = self.required(CERTIFICATE_FIELD, path)?;
        let private_key = self.required(PRIVATE_KEY_FIELD, path)?;
        let ca_certificate = self
            .get(CA_CERTIFICATE_FIELD)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string);

        Ok(SecretMaterial {
            certificate,
            private_key,
            ca_certificate,
        })
    }

    fn required(&self, field: &str, path: &str) -> Result<String> {
        match self.get(field) {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            Some(_) => Err(BundleError::missing(path, format!("field '{field}' is empty"))),
            None => Err(BundleError::missing(path, format!("field '{field}' is missing"))),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SecretRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// PEM text extracted from a record, validated for presence only
#[derive(Clone)]
pub struct SecretMaterial {
    pub certificate: String,
    pub private_key: String,
    pub ca_certificate: Option<String>,
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("certificate", &self.certificate)
            .field("private_key", &"<redacted>")
            .field("ca_certificate", &self.ca_certificate)
            .finish()
    }
}
