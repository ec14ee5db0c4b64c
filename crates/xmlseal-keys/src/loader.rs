#![forbid(unsafe_code)]

//! Key material extraction from PKCS#12 containers.

use std::time::SystemTime;

use pkcs8::der::Decode;
use pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use xmlseal_core::Error;

use crate::key::KeyMaterial;
use crate::x509;

/// Extract the signing key, its certificate and the CA chain from a
/// PKCS#12 container.
///
/// An empty `passphrase` means "no passphrase"; a store that was protected
/// with a real one still fails with [`Error::WrongPassphrase`].
pub fn extract(pfx: &[u8], passphrase: &str) -> Result<KeyMaterial, Error> {
    if pfx.is_empty() {
        return Err(Error::InvalidInput("PKCS#12 data is empty".into()));
    }

    let contents = xmlseal_pkcs12::parse_pkcs12(pfx, passphrase)?;

    let key_der = contents.private_keys.first().ok_or(Error::NoPrivateKey)?;
    if contents.private_keys.len() > 1 {
        tracing::warn!(
            keys = contents.private_keys.len(),
            "key store holds more than one private key, using the first"
        );
    }
    let private_key = load_rsa_private_key(key_der)?;

    let (certificate, ca_certificates) =
        split_chain(&private_key, contents.certificates.clone())?;

    let leaf = x509::parse(&certificate)?;
    let certificate_is_valid = x509::is_valid_at(&leaf, SystemTime::now());
    if !certificate_is_valid {
        tracing::warn!(
            not_before = %leaf.tbs_certificate.validity.not_before.to_date_time(),
            not_after = %leaf.tbs_certificate.validity.not_after.to_date_time(),
            "signing certificate is outside its validity period"
        );
    }

    tracing::debug!(
        ca_certificates = ca_certificates.len(),
        certificate_is_valid,
        "extracted key material"
    );

    Ok(KeyMaterial {
        private_key,
        certificate,
        ca_certificates,
        certificate_is_valid,
    })
}

/// Decode a PKCS#8 private key, accepting RSA only.
fn load_rsa_private_key(der: &[u8]) -> Result<RsaPrivateKey, Error> {
    let info = pkcs8::PrivateKeyInfo::from_der(der)
        .map_err(|e| Error::InvalidKeyStore(format!("malformed PKCS#8 private key: {e}")))?;
    if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
        return Err(Error::InvalidKeyStore(format!(
            "unsupported private key algorithm {} (only RSA keys can sign)",
            info.algorithm.oid
        )));
    }
    RsaPrivateKey::from_pkcs8_der(der)
        .map_err(|e| Error::InvalidKeyStore(format!("malformed RSA private key: {e}")))
}

/// Separate the certificate belonging to `key` from the rest.
///
/// Certificates that fail to parse are kept in the chain untouched; only
/// the end-entity certificate has to be understood.
fn split_chain(
    key: &RsaPrivateKey,
    certificates: Vec<Vec<u8>>,
) -> Result<(Vec<u8>, Vec<Vec<u8>>), Error> {
    let public = key.to_public_key();
    let leaf_index = certificates
        .iter()
        .position(|der| {
            x509::parse(der)
                .ok()
                .and_then(|cert| x509::rsa_public_key(&cert))
                .is_some_and(|pk| pk == public)
        })
        .ok_or(Error::NoCertificate)?;

    let mut chain = certificates;
    let leaf = chain.remove(leaf_index);
    Ok((leaf, chain))
}
