#![forbid(unsafe_code)]

//! Cryptographic primitives used by xmlseal signatures: SHA-256 digests
//! and RSA PKCS#1 v1.5 signatures, both looked up by algorithm URI.

pub mod digest;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};
