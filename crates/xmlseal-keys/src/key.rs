#![forbid(unsafe_code)]

//! Key types and data structures.

use rsa::RsaPrivateKey;
use xmlseal_core::Error;
use xmlseal_crypto::SigningKey;

use crate::x509::{self, CertificateSummary};

/// Everything one signing operation needs from a key store.
///
/// Owned by a single signing call and dropped when it returns; the RSA key
/// is zeroized on drop.
pub struct KeyMaterial {
    pub private_key: RsaPrivateKey,
    /// DER-encoded end-entity certificate.
    pub certificate: Vec<u8>,
    /// DER-encoded CA certificates, in container order.  May be empty.
    pub ca_certificates: Vec<Vec<u8>>,
    /// Whether the current time lies within the end-entity certificate's
    /// validity period.
    pub certificate_is_valid: bool,
}

impl KeyMaterial {
    /// The private key in the form the signature algorithms take.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::Rsa(self.private_key.clone())
    }

    /// The public half, for verifying what was just signed.
    pub fn verification_key(&self) -> SigningKey {
        SigningKey::RsaPublic(self.private_key.to_public_key())
    }

    pub fn certificate_summary(&self) -> Result<CertificateSummary, Error> {
        x509::summarize(&self.certificate)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"<redacted>")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("ca_certificates", &self.ca_certificates.len())
            .field("certificate_is_valid", &self.certificate_is_valid)
            .finish()
    }
}
