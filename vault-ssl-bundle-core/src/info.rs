//! Leaf certificate metadata

use crate::error::{BundleError, Result};
use rustls::pki_types::CertificateDer;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use x509_parser::prelude::*;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Information about a bundle's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number as colon-separated hex
    pub serial: String,
    /// Start of the validity period
    pub not_before: SystemTime,
    /// When the certificate expires
    pub not_after: SystemTime,
    /// Whether subject and issuer are the same
    pub is_self_signed: bool,
}

impl CertificateInfo {
    pub fn from_der(der: &CertificateDer<'_>) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| BundleError::MalformedCertificate(e.to_string()))?;
        let validity = cert.validity();

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: to_system_time(validity.not_before.timestamp()),
            not_after: to_system_time(validity.not_after.timestamp()),
            // Self-signed certificates have the same issuer and subject
            is_self_signed: cert.issuer() == cert.subject(),
        })
    }

    /// Check if certificate is expired
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.not_after
    }

    /// Check if the certificate expires within `window`
    pub fn needs_renewal(&self, window: Duration) -> bool {
        SystemTime::now() + window > self.not_after
    }

    /// Days until expiry, negative once expired
    pub fn days_until_expiry(&self) -> i64 {
        match self.not_after.duration_since(SystemTime::now()) {
            Ok(duration) => (duration.as_secs() / SECS_PER_DAY) as i64,
            Err(e) => -((e.duration().as_secs() / SECS_PER_DAY) as i64),
        }
    }
}

fn to_system_time(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pem::decode_certificate;
    use crate::testdata;
    use rcgen::CertificateParams;
    use ::time::OffsetDateTime;

    fn cert_expiring_in(days: i64) -> CertificateInfo {
        let mut params = CertificateParams::new(vec!["expiry.vault.test".to_string()]).unwrap();
        let now = OffsetDateTime::now_utc();
        params.not_before = now - ::time::Duration::days(400);
        params.not_after = now + ::time::Duration::days(days);
        let cert = testdata::self_signed_with_params(params);
        CertificateInfo::from_der(&decode_certificate(&cert.cert_pem).unwrap()).unwrap()
    }

    #[test]
    fn test_self_signed_detection() {
        let cert = testdata::self_signed("server-a.vault.test");
        let info = CertificateInfo::from_der(&decode_certificate(&cert.cert_pem).unwrap()).unwrap();
        assert!(info.is_self_signed);
        assert!(!info.is_expired());

        let ca = testdata::TestCa::generate();
        let leaf = ca.issue("leaf.vault.test");
        let info = CertificateInfo::from_der(&decode_certificate(&leaf.cert_pem).unwrap()).unwrap();
        assert!(!info.is_self_signed);
        assert!(info.issuer.contains("Vault SSL Bundle Test CA"));
    }

    #[test]
    fn test_fixture_subject() {
        let info = CertificateInfo::from_der(&decode_certificate(testdata::RSA_CERT).unwrap()).unwrap();
        assert!(info.subject.contains("legacy.vault.test"));
        assert!(!info.serial.is_empty());
    }

    #[test]
    fn test_needs_renewal_window() {
        let thirty_days = Duration::from_secs(30 * SECS_PER_DAY);

        assert!(cert_expiring_in(20).needs_renewal(thirty_days));
        assert!(!cert_expiring_in(60).needs_renewal(thirty_days));
    }

    #[test]
    fn test_expired_certificate() {
        let info = cert_expiring_in(-5);
        assert!(info.is_expired());
        assert!(info.needs_renewal(Duration::ZERO));
        let days = info.days_until_expiry();
        assert!((-6..=-4).contains(&days), "Expected ~-5 days, got {}", days);
    }

    #[test]
    fn test_days_until_expiry() {
        let days = cert_expiring_in(45).days_until_expiry();
        assert!((44..=45).contains(&days), "Expected ~45 days, got {}", days);
    }

    #[test]
    fn test_negative_timestamps() {
        assert_eq!(to_system_time(-10), UNIX_EPOCH - Duration::from_secs(10));
        assert_eq!(to_system_time(10), UNIX_EPOCH + Duration::from_secs(10));
    }
}
