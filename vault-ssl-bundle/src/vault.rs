//! HashiCorp Vault KV fetcher

use crate::config::{ConfigError, VaultConfig};
use crate::fetcher::SecretFetcher;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fs;
use vault_ssl_bundle_core::{FetchError, KvVersion, SecretRecord};

/// Install the aws-lc-rs provider as the process default if nothing else
/// has claimed the slot.
pub fn install_rustls_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Reads secrets with `GET {address}/v1/{path}`
pub struct VaultKvFetcher {
    client: Client,
    address: String,
    token: String,
    namespace: Option<String>,
    kv_version: KvVersion,
}

impl std::fmt::Debug for VaultKvFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKvFetcher")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("kv_version", &self.kv_version)
            .finish_non_exhaustive()
    }
}

impl VaultKvFetcher {
    pub fn new(config: VaultConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        install_rustls_crypto_provider();

        let mut builder = Client::builder().timeout(config.timeout());
        if let Some(path) = &config.ca_bundle {
            let pem = fs::read(path).map_err(|e| ConfigError::FileRead(path.clone(), e))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ConfigError::HttpClient(format!("invalid CA bundle: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            address: config.address.trim().trim_end_matches('/').to_string(),
            token: config.token.unwrap_or_default(),
            namespace: config.namespace,
            kv_version: config.kv_version,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(VaultConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretFetcher for VaultKvFetcher {
    async fn read(&self, path: &str) -> Result<Option<SecretRecord>, FetchError> {
        let mut request = self
            .client
            .get(self.url(path))
            .header("X-Vault-Token", &self.token);
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(path, "Vault has no secret at path");
                Ok(None)
            }
            status if status.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Decode(e.to_string()))?;
                Ok(body
                    .get("data")
                    .and_then(|data| SecretRecord::from_response_data(data, self.kv_version)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(path, status = status.as_u16(), "Vault read failed");
                Err(FetchError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
