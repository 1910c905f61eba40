//! Test certificates and secret records.
//!
//! Identities are generated with rcgen. A fixed RSA key is also checked in,
//! both as PKCS#1 and PKCS#8, with a matching self-signed certificate.
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for dependents.

use crate::bundle::{BundleBuilder, SslBundle};
use crate::record::{CA_CERTIFICATE_FIELD, CERTIFICATE_FIELD, PRIVATE_KEY_FIELD, SecretRecord};
use time::{Duration, OffsetDateTime};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use serde_json::json;

pub const RSA_PKCS1_KEY: &str = include_str!("../testdata/rsa_pkcs1.pem");
pub const RSA_PKCS8_KEY: &str = include_str!("../testdata/rsa_pkcs8.pem");
pub const RSA_CERT: &str = include_str!("../testdata/rsa_cert.pem");

pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: Vec<u8>,
}

pub fn self_signed(domain: &str) -> TestCert {
    self_signed_with_params(CertificateParams::new(vec![domain.to_string()]).unwrap())
}

pub fn self_signed_with_params(params: CertificateParams) -> TestCert {
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    TestCert {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        cert_der: cert.der().to_vec(),
    }
}

/// Self-signed certificate valid from yesterday until `days` from now
pub fn expiring_in(days: i64) -> TestCert {
    let mut params = CertificateParams::new(vec!["expiring.vault.test".to_string()]).unwrap();
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(days);
    self_signed_with_params(params)
}

pub struct TestCa {
    pub cert: TestCert,
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    pub fn generate() -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Vault SSL Bundle Test CA");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        let cert = TestCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            cert_der: cert.der().to_vec(),
        };

        Self {
            cert,
            issuer: Issuer::new(params, key),
        }
    }

    pub fn issue(&self, domain: &str) -> TestCert {
        let params = CertificateParams::new(vec![domain.to_string()]).unwrap();
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        TestCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            cert_der: cert.der().to_vec(),
        }
    }
}

pub fn record_from(cert: &TestCert, ca_pem: Option<&str>) -> SecretRecord {
    let mut record = SecretRecord::new()
        .with(CERTIFICATE_FIELD, cert.cert_pem.clone())
        .with(PRIVATE_KEY_FIELD, cert.key_pem.clone());
    if let Some(ca) = ca_pem {
        record.insert(CA_CERTIFICATE_FIELD, ca);
    }
    record
}

/// Record holding a fresh self-signed identity for `domain`
pub fn record(domain: &str) -> SecretRecord {
    record_from(&self_signed(domain), None)
}

/// The same fields as [`record_from`], as the JSON object Vault stores
pub fn fields(cert: &TestCert, ca: Option<&TestCert>) -> serde_json::Value {
    let mut fields = json!({
        CERTIFICATE_FIELD: cert.cert_pem,
        PRIVATE_KEY_FIELD: cert.key_pem,
    });
    if let Some(ca) = ca {
        fields[CA_CERTIFICATE_FIELD] = json!(ca.cert_pem);
    }
    fields
}

pub fn bundle(domain: &str) -> SslBundle {
    let cert = self_signed(domain);
    BundleBuilder::default()
        .build_from_pem(&cert.cert_pem, &cert.key_pem, None)
        .unwrap()
}
