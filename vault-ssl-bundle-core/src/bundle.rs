//! Bundle construction: identity store, trust store and the rustls managers
//! derived from them.
//!
//! A built [`SslBundle`] is immutable. Refreshing a bundle means building a
//! new one and swapping the `Arc` held by the registry; TLS configs created
//! from the old instance keep working.

use crate::error::{BundleError, Result};
use crate::info::CertificateInfo;
use crate::pem::{self, ParsedKeyMaterial};
use rustls::client::{ResolvesClientCert, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig, SignatureScheme};
use std::fmt;
use std::sync::Arc;

/// Protocol tag exposed by every bundle
pub const PROTOCOL: &str = "TLS";

/// Alias of the private key entry in the identity store
pub const KEY_ALIAS: &str = "vault-ssl";
/// Alias of the leaf certificate in the trust store
pub const LEAF_ALIAS: &str = "vault-cert";
/// Alias prefix of CA certificates in the trust store
pub const CA_ALIAS: &str = "vault-ca";

/// Private key plus its certificate chain, leaf first
pub struct IdentityStore {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl IdentityStore {
    fn new(
        leaf: CertificateDer<'static>,
        key: PrivateKeyDer<'static>,
        ca_certificates: &[CertificateDer<'static>],
    ) -> Self {
        let mut chain = Vec::with_capacity(1 + ca_certificates.len());
        chain.push(leaf);
        chain.extend(ca_certificates.iter().cloned());
        Self { chain, key }
    }

    /// Alias the key entry is stored under
    pub fn alias(&self) -> &'static str {
        KEY_ALIAS
    }

    /// Certificate chain, leaf first
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// The bundle's own certificate
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    /// Private key matching the leaf, PKCS#8 or SEC1
    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityStore")
            .field("alias", &KEY_ALIAS)
            .field("chain_len", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Trust anchors: CA certificates (if any) and always the leaf itself
#[derive(Debug)]
pub struct TrustStore {
    entries: Vec<(String, CertificateDer<'static>)>,
    roots: Arc<RootCertStore>,
}

impl TrustStore {
    fn new(
        leaf: &CertificateDer<'static>,
        ca_certificates: &[CertificateDer<'static>],
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(1 + ca_certificates.len());
        for (i, ca) in ca_certificates.iter().enumerate() {
            let alias = if i == 0 {
                CA_ALIAS.to_string()
            } else {
                format!("{CA_ALIAS}-{i}")
            };
            entries.push((alias, ca.clone()));
        }
        // The leaf is always trusted so self-issued certificates verify
        // without a separate CA.
        if !ca_certificates.contains(leaf) {
            entries.push((LEAF_ALIAS.to_string(), leaf.clone()));
        }

        let mut roots = RootCertStore::empty();
        for (alias, cert) in &entries {
            roots.add(cert.clone()).map_err(|e| {
                BundleError::MalformedCertificate(format!("trust anchor '{alias}': {e}"))
            })?;
        }

        Ok(Self {
            entries,
            roots: Arc::new(roots),
        })
    }

    /// Number of trust anchors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry aliases: [`CA_ALIAS`] and its numbered siblings, then [`LEAF_ALIAS`]
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(alias, _)| alias.as_str())
    }

    /// Anchor certificates in the same order as [`aliases`](Self::aliases)
    pub fn certificates(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.entries.iter().map(|(_, cert)| cert)
    }

    /// Look up one anchor by alias
    pub fn certificate(&self, alias: &str) -> Option<&CertificateDer<'static>> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, cert)| cert)
    }

    /// Anchors in rustls form
    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }

    /// All anchors as concatenated PEM
    pub fn to_pem(&self) -> String {
        self.certificates().map(pem::encode_certificate).collect()
    }
}

/// Presents the bundle identity on both sides of a handshake
#[derive(Debug)]
pub struct KeyManager {
    certified_key: Arc<CertifiedKey>,
}

impl KeyManager {
    fn new(identity: &IdentityStore, provider: &CryptoProvider) -> Result<Self> {
        let signing_key = pem::load_signing_key(identity.private_key(), provider)?;
        let certified_key = CertifiedKey::new(identity.certificate_chain().to_vec(), signing_key);
        certified_key
            .keys_match()
            .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?;

        Ok(Self {
            certified_key: Arc::new(certified_key),
        })
    }

    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified_key)
    }
}

impl ResolvesServerCert for KeyManager {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.certified_key())
    }
}

impl ResolvesClientCert for KeyManager {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(self.certified_key())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Peer verifiers built from the trust store
#[derive(Debug, Clone)]
pub struct TrustManagers {
    /// Verifies servers when this bundle is used by a client
    pub server_verifier: Arc<WebPkiServerVerifier>,
    /// Verifies clients when this bundle is used by a server with mTLS
    pub client_verifier: Arc<dyn ClientCertVerifier>,
}

impl TrustManagers {
    fn new(trust: &TrustStore, provider: &Arc<CryptoProvider>) -> Result<Self> {
        let server_verifier =
            WebPkiServerVerifier::builder_with_provider(trust.roots(), Arc::clone(provider))
                .build()
                .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?;
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(trust.roots(), Arc::clone(provider))
                .build()
                .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?;

        Ok(Self {
            server_verifier,
            client_verifier,
        })
    }
}

/// An identity and trust pair sufficient to configure one side of a TLS connection
pub struct SslBundle {
    identity: IdentityStore,
    trust: TrustStore,
    key_manager: Arc<KeyManager>,
    trust_managers: TrustManagers,
    info: CertificateInfo,
    provider: Arc<CryptoProvider>,
}

impl SslBundle {
    /// Always `"TLS"`; protocol versions and ciphers are left to rustls defaults
    pub fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn trust(&self) -> &TrustStore {
        &self.trust
    }

    pub fn key_manager(&self) -> Arc<KeyManager> {
        Arc::clone(&self.key_manager)
    }

    pub fn trust_managers(&self) -> &TrustManagers {
        &self.trust_managers
    }

    /// Metadata of the leaf certificate
    pub fn certificate_info(&self) -> &CertificateInfo {
        &self.info
    }

    /// Server config presenting this bundle's identity, without client auth
    pub fn server_config(&self) -> Result<ServerConfig> {
        let config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?
            .with_no_client_auth()
            .with_cert_resolver(self.key_manager());
        Ok(config)
    }

    /// Server config that requires clients to present a certificate trusted
    /// by this bundle's trust store
    pub fn server_config_mtls(&self) -> Result<ServerConfig> {
        let config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?
            .with_client_cert_verifier(Arc::clone(&self.trust_managers.client_verifier))
            .with_cert_resolver(self.key_manager());
        Ok(config)
    }

    /// Client config trusting this bundle's trust store and presenting its
    /// identity when the server asks for a client certificate
    pub fn client_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| BundleError::ManagerInitializationFailure(e.to_string()))?
            .with_webpki_verifier(Arc::clone(&self.trust_managers.server_verifier))
            .with_client_cert_resolver(self.key_manager());
        Ok(config)
    }
}

impl fmt::Debug for SslBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslBundle")
            .field("protocol", &PROTOCOL)
            .field("subject", &self.info.subject)
            .field("identity", &self.identity)
            .field("trust_entries", &self.trust.len())
            .finish()
    }
}

/// Assembles [`SslBundle`]s from decoded key material
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    provider: Arc<CryptoProvider>,
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
    }
}

impl BundleBuilder {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Build a bundle. Nothing is returned unless every store and manager
    /// was constructed.
    pub fn build(&self, material: ParsedKeyMaterial) -> Result<SslBundle> {
        let ParsedKeyMaterial {
            certificate,
            private_key,
            ca_certificates,
        } = material;

        let info = CertificateInfo::from_der(&certificate)?;
        let trust = TrustStore::new(&certificate, &ca_certificates)?;
        let identity = IdentityStore::new(certificate, private_key, &ca_certificates);
        let key_manager = KeyManager::new(&identity, &self.provider)?;
        let trust_managers = TrustManagers::new(&trust, &self.provider)?;

        Ok(SslBundle {
            identity,
            trust,
            key_manager: Arc::new(key_manager),
            trust_managers,
            info,
            provider: Arc::clone(&self.provider),
        })
    }

    /// Decode PEM text and build in one step
    pub fn build_from_pem(
        &self,
        certificate: &str,
        private_key: &str,
        ca_certificate: Option<&str>,
    ) -> Result<SslBundle> {
        let material = ParsedKeyMaterial {
            certificate: pem::decode_certificate(certificate)?,
            private_key: pem::decode_private_key(private_key)?,
            ca_certificates: pem::decode_ca_certificates(ca_certificate)?,
        };
        self.build(material)
    }
}
