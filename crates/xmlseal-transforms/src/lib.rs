#![forbid(unsafe_code)]

//! Reference transforms for xmlseal.
//!
//! A reference carries an ordered list of transforms; the data selected by
//! the reference URI is pushed through them and the final octets are what
//! gets digested.

pub mod enveloped;
pub mod pipeline;

pub use enveloped::EnvelopedSignatureTransform;
pub use pipeline::{transform_from_uri, C14nTransform, Transform, TransformData, TransformPipeline};
