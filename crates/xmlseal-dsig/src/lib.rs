#![forbid(unsafe_code)]

//! Enveloped XML Digital Signature (XML-DSig) creation and verification.
//!
//! Signing is two-phase: [`template::insert_placeholder`] puts an empty
//! `ds:Signature` skeleton at the front of the document element, then a
//! [`SignatureEngine`] fills in the digest, the signature value and the
//! certificates, rendering the signature once per step from a typed
//! [`SignatureTemplate`].

pub mod sign;
pub mod template;
pub mod verify;

pub use sign::{sign_document, EngineState, SignatureEngine};
pub use template::{insert_placeholder, ReferenceTemplate, SignatureTemplate};
pub use verify::{verify, VerifyResult};
