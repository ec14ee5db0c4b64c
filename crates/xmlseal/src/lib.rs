#![forbid(unsafe_code)]

//! Enveloped XML-DSig signing with keys from PKCS#12 stores.
//!
//! ```no_run
//! use xmlseal::{Signer, SignerConfig};
//!
//! let signer = Signer::new(SignerConfig::default())?;
//! let pfx = std::fs::read("signer.p12")?;
//! let result = signer.sign(b"<Invoice><Amount>100</Amount></Invoice>", &pfx, "test123")?;
//! println!("{}", result.handle);
//! # Ok::<(), xmlseal::core::Error>(())
//! ```

pub use xmlseal_c14n as c14n;
pub use xmlseal_core as core;
pub use xmlseal_crypto as crypto;
pub use xmlseal_dsig as dsig;
pub use xmlseal_keys as keys;
pub use xmlseal_pkcs12 as pkcs12;
pub use xmlseal_service as service;
pub use xmlseal_transforms as transforms;
pub use xmlseal_xml as xml;

pub use xmlseal_core::{Error, ErrorCode};
pub use xmlseal_service::{Signer, SignerConfig, SigningResult};
