#![forbid(unsafe_code)]

//! Signing key material for xmlseal.
//!
//! Turns a PKCS#12 container into a [`KeyMaterial`]: the RSA private key,
//! the end-entity certificate that belongs to it, the remaining
//! certificates as the CA chain, and whether the end-entity certificate is
//! currently within its validity period.

pub mod key;
pub mod loader;
pub mod x509;

pub use key::KeyMaterial;
pub use loader::extract;
pub use x509::{certificate_public_key, summarize, CertificateSummary};
