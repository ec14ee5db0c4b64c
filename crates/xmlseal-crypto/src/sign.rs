#![forbid(unsafe_code)]

//! Signature algorithms.  Only RSA PKCS#1 v1.5 with SHA-256 is offered.

use rsa::{RsaPrivateKey, RsaPublicKey};
use signature::SignatureEncoding;
use xmlseal_core::{algorithm, Error};

/// Key material for signature operations.
pub enum SigningKey {
    Rsa(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
}

impl SigningKey {
    pub fn public_key(&self) -> RsaPublicKey {
        match self {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningKey::Rsa(_) => f.write_str("SigningKey::Rsa(..)"),
            SigningKey::RsaPublic(_) => f.write_str("SigningKey::RsaPublic(..)"),
        }
    }
}

pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    /// `Ok(false)` means the signature does not match; `Err` means it could
    /// not be checked at all.
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    match uri {
        algorithm::RSA_SHA256 => Ok(Box::new(RsaPkcs1v15Sha256)),
        _ => Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    }
}

struct RsaPkcs1v15Sha256;

impl SignatureAlgorithm for RsaPkcs1v15Sha256 {
    fn uri(&self) -> &'static str {
        algorithm::RSA_SHA256
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::Rsa(private_key) = key else {
            return Err(Error::Crypto("RSA private key required for signing".into()));
        };
        let sk = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key.clone());
        let sig = sk
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))?;
        Ok(sig.to_vec())
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(key.public_key());
        Ok(vk.verify(data, &sig).is_ok())
    }
}
