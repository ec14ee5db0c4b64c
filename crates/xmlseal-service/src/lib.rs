#![forbid(unsafe_code)]

//! The signing service around the XML-DSig core.
//!
//! [`Signer`] is the inbound surface: `sign` takes XML, a PKCS#12 store and
//! its passphrase and returns a [`SigningResult`]; `download` returns a
//! previously signed document by handle.  Signed documents live in an
//! [`ArtifactStore`] until their retention period runs out and a sweep
//! removes them.

pub mod config;
pub mod package;
pub mod signer;
pub mod store;

pub use config::SignerConfig;
pub use package::{ResultPackager, SigningResult};
pub use signer::Signer;
pub use store::{ArtifactHandle, ArtifactLease, ArtifactStore};
