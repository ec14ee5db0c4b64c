#![forbid(unsafe_code)]

//! Digest (hash) algorithms.

use digest::Digest;
use xmlseal_core::{algorithm, Error};

/// An incremental hash identified by its XML-DSig algorithm URI.
pub trait DigestAlgorithm: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn uri(&self) -> &'static str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    match uri {
        algorithm::SHA256 => Ok(Box::<Sha256Digest>::default()),
        _ => Err(Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}"))),
    }
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

#[derive(Default)]
struct Sha256Digest {
    inner: sha2::Sha256,
}

impl DigestAlgorithm for Sha256Digest {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        Digest::finalize(self.inner).to_vec()
    }

    fn uri(&self) -> &'static str {
        algorithm::SHA256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_answer() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        let hex: String = result.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = from_uri(algorithm::SHA256).unwrap();
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.uri(), algorithm::SHA256);
        assert_eq!(hasher.finalize(), digest(algorithm::SHA256, b"hello").unwrap());
    }

    #[test]
    fn test_sha1_not_offered() {
        let err = digest("http://www.w3.org/2000/09/xmldsig#sha1", b"x")
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }
}
