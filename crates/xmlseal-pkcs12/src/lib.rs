#![forbid(unsafe_code)]

//! PKCS#12 (.p12/.pfx) decoding for xmlseal.
//!
//! Handles the encryption schemes found in practice:
//! - legacy PKCS#12 PBE: SHA-1 with 3-key or 2-key triple DES, 128-bit or
//!   40-bit RC2 (OpenSSL 1.x defaults, Windows exports)
//! - PBES2: PBKDF2 (HMAC-SHA1 or HMAC-SHA256) with AES-128/192/256-CBC
//!   (OpenSSL 3.x defaults)
//!
//! The integrity MAC may use SHA-1 or SHA-256.  A MAC mismatch is reported
//! as [`Error::WrongPassphrase`](xmlseal_core::Error::WrongPassphrase);
//! anything that cannot be decoded is
//! [`Error::InvalidKeyStore`](xmlseal_core::Error::InvalidKeyStore).

mod kdf;
mod parse;

use zeroize::Zeroizing;

/// Contents extracted from a PKCS#12 file.
pub struct Pkcs12Contents {
    /// PKCS#8 DER-encoded private keys, in container order.
    pub private_keys: Vec<Zeroizing<Vec<u8>>>,
    /// DER-encoded X.509 certificates, in container order.
    pub certificates: Vec<Vec<u8>>,
}

impl std::fmt::Debug for Pkcs12Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkcs12Contents")
            .field("private_keys", &self.private_keys.len())
            .field("certificates", &self.certificates.len())
            .finish()
    }
}

/// Parse a PKCS#12 file, decrypting with the given password.
///
/// An empty password is tried both as an absent password and as an empty
/// string, since producers disagree on how to encode it.
pub fn parse_pkcs12(data: &[u8], password: &str) -> Result<Pkcs12Contents, xmlseal_core::Error> {
    parse::parse_pfx(data, password)
}
