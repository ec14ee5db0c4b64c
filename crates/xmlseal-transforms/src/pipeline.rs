#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::enveloped::EnvelopedSignatureTransform;
use roxmltree::NodeId;
use xmlseal_c14n::C14nMode;
use xmlseal_core::{algorithm, Error};
use xmlseal_xml::NodeSet;

/// Data flowing through the transform pipeline.
#[derive(Debug)]
pub enum TransformData {
    /// A document plus the subset of its nodes still selected.
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Octets, typically the output of canonicalization.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, applying inclusive C14N to an XML node set.
    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml { xml_text, node_set } => {
                xmlseal_c14n::canonicalize(&xml_text, C14nMode::Inclusive, node_set.as_ref())
            }
        }
    }
}

/// A single reference transform.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// Transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        self.transforms
            .iter()
            .try_fold(input, |data, transform| transform.execute(data))
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.uri())
    }
}

/// Build the transform named by `uri`.  `signature` is the `Signature`
/// element the reference belongs to, needed by the enveloped transform.
pub fn transform_from_uri(uri: &str, signature: NodeId) -> Result<Box<dyn Transform>, Error> {
    if uri == algorithm::ENVELOPED_SIGNATURE {
        return Ok(Box::new(EnvelopedSignatureTransform::new(signature)));
    }
    match C14nMode::from_uri(uri) {
        Some(mode) => Ok(Box::new(C14nTransform::new(mode))),
        None => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
}

impl C14nTransform {
    pub fn new(mode: C14nMode) -> Self {
        Self { mode }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let bytes = match input {
            TransformData::Xml { xml_text, node_set } => {
                xmlseal_c14n::canonicalize(&xml_text, self.mode, node_set.as_ref())?
            }
            TransformData::Binary(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| Error::InvalidInput(format!("invalid UTF-8: {e}")))?;
                xmlseal_c14n::canonicalize(text, self.mode, None)?
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_runs_in_order() {
        let xml = r#"<r><!--c--><a   x="1"/></r>"#;
        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(C14nTransform::new(C14nMode::InclusiveWithComments)));
        let out = pipeline
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(out, br#"<r><!--c--><a x="1"></a></r>"#);
        assert_eq!(pipeline.uris().collect::<Vec<_>>(), [algorithm::C14N_WITH_COMMENTS]);
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let err = transform_from_uri("http://www.w3.org/TR/1999/REC-xpath-19991116", NodeId::new(0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_binary_input_is_reparsed() {
        let out = C14nTransform::new(C14nMode::Inclusive)
            .execute(TransformData::Binary(b"<a b='1'/>".to_vec()))
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(out, br#"<a b="1"></a>"#);
    }
}
