#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `Signature` element that contains the reference, together
//! with all of its descendants, from the selected node set.

use crate::pipeline::{Transform, TransformData};
use roxmltree::NodeId;
use xmlseal_core::{algorithm, Error};
use xmlseal_xml::NodeSet;

pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    /// `signature` identifies the element in the document the transform
    /// will receive.  Node ids are stable across re-parses of the same text.
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::XmlStructure(
                "enveloped-signature transform requires XML input".into(),
            ));
        };

        let node_set = {
            let doc = xmlseal_xml::parse(&xml_text)?;
            let signature = doc.get_node(self.signature).ok_or_else(|| {
                Error::XmlStructure("enveloped signature element not found".into())
            })?;
            let mut set = node_set.unwrap_or_else(|| NodeSet::all_without_comments(&doc));
            set.remove_subtree(signature);
            set
        };

        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(node_set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_subtree_excluded() {
        let xml = r#"<Invoice><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X/></ds:Signature><Amount>100</Amount></Invoice>"#;
        let sig_id = {
            let doc = roxmltree::Document::parse(xml).unwrap();
            doc.descendants()
                .find(|n| n.has_tag_name("Signature"))
                .unwrap()
                .id()
        };

        let out = EnvelopedSignatureTransform::new(sig_id)
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(out, b"<Invoice><Amount>100</Amount></Invoice>");
    }

    #[test]
    fn test_binary_input_rejected() {
        let err = EnvelopedSignatureTransform::new(NodeId::new(1))
            .execute(TransformData::Binary(vec![]))
            .unwrap_err();
        assert!(matches!(err, Error::XmlStructure(_)));
    }
}
