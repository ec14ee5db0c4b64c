#![forbid(unsafe_code)]

//! X.509 certificate inspection.
//!
//! Only what signing needs: the subject public key, the validity window,
//! and a printable summary.  No chain building or revocation checks are
//! performed; the certificate is embedded as-is for the relying party.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use der::{Decode, Encode};
use rsa::RsaPublicKey;
use serde::Serialize;
use spki::DecodePublicKey;
use x509_cert::Certificate;
use xmlseal_core::Error;

/// Human-readable description of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    /// Serial number as upper-case hex.
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
    pub currently_valid: bool,
}

pub(crate) fn parse(der: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))
}

/// The certificate's subject public key, if it is an RSA key.
pub(crate) fn rsa_public_key(cert: &Certificate) -> Option<RsaPublicKey> {
    let spki_der = cert.tbs_certificate.subject_public_key_info.to_der().ok()?;
    RsaPublicKey::from_public_key_der(&spki_der).ok()
}

/// The RSA public key of a DER-encoded certificate.
pub fn certificate_public_key(der: &[u8]) -> Result<RsaPublicKey, Error> {
    let cert = parse(der)?;
    rsa_public_key(&cert)
        .ok_or_else(|| Error::Certificate("certificate does not carry an RSA public key".into()))
}

/// Whether `at` lies within the certificate's notBefore..=notAfter window.
pub(crate) fn is_valid_at(cert: &Certificate, at: SystemTime) -> bool {
    let validity = &cert.tbs_certificate.validity;
    let at = at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    validity.not_before.to_unix_duration() <= at && at <= validity.not_after.to_unix_duration()
}

/// Summarize a DER-encoded certificate against the current time.
pub fn summarize(der: &[u8]) -> Result<CertificateSummary, Error> {
    let cert = parse(der)?;
    let tbs = &cert.tbs_certificate;
    Ok(CertificateSummary {
        subject: tbs.subject.to_string(),
        issuer: tbs.issuer.to_string(),
        serial: tbs
            .serial_number
            .as_bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect(),
        not_before: tbs.validity.not_before.to_date_time().to_string(),
        not_after: tbs.validity.not_after.to_date_time().to_string(),
        currently_valid: is_valid_at(&cert, SystemTime::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(&path).unwrap_or_else(|e| panic!("{path}: {e}"))
    }

    #[test]
    fn test_summary_of_self_signed_cert() {
        let summary = summarize(&fixture("rsa-test-cert.der")).unwrap();
        assert_eq!(summary.subject, "CN=xmlseal test signer");
        assert_eq!(summary.subject, summary.issuer);
        assert_eq!(summary.serial, "1BF163B0599CFC5F7321660BDB8A1FF5CE07E1BE");
        assert!(summary.not_before.starts_with("2026-10-17T"));
        assert!(summary.not_after.starts_with("2126-09-23T"));
    }

    #[test]
    fn test_leaf_issued_by_ca() {
        let summary = summarize(&fixture("rsa-chain-leaf.der")).unwrap();
        assert_eq!(summary.subject, "CN=xmlseal leaf");
        assert_eq!(summary.issuer, "CN=xmlseal test CA");
    }

    #[test]
    fn test_validity_window() {
        let cert = parse(&fixture("rsa-test-cert.der")).unwrap();
        let inside = UNIX_EPOCH + Duration::from_secs(4_102_444_800); // 2100-01-01
        let before = UNIX_EPOCH + Duration::from_secs(1_577_836_800); // 2020-01-01
        assert!(is_valid_at(&cert, inside));
        assert!(!is_valid_at(&cert, before));
    }

    #[test]
    fn test_rsa_public_key_extracted() {
        let cert = parse(&fixture("rsa-test-cert.der")).unwrap();
        let key = rsa_public_key(&cert).unwrap();
        assert_eq!(rsa::traits::PublicKeyParts::size(&key), 256);
    }

    #[test]
    fn test_certificate_public_key_matches_private_key() {
        use pkcs8::DecodePrivateKey;
        let private = rsa::RsaPrivateKey::from_pkcs8_der(&fixture("rsa-test-key.der")).unwrap();
        let public = certificate_public_key(&fixture("rsa-test-cert.der")).unwrap();
        assert_eq!(public, private.to_public_key());
    }

    #[test]
    fn test_garbage_is_certificate_error() {
        assert!(matches!(summarize(b"nope"), Err(Error::Certificate(_))));
    }

    #[test]
    fn test_summary_serializes() {
        let summary = summarize(&fixture("rsa-test-cert.der")).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["subject"], "CN=xmlseal test signer");
        assert!(json["currently_valid"].is_boolean());
    }
}
