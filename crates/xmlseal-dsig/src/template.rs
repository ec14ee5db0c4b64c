#![forbid(unsafe_code)]

//! Typed `ds:Signature` skeleton.
//!
//! The signature is never edited in place.  Each signing step updates the
//! [`SignatureTemplate`] and renders it again, so there is exactly one
//! place that decides what the element looks like.

use xmlseal_core::{algorithm, ns, Error};
use xmlseal_xml::{XmlDocument, XmlWriter};

/// The single `ds:Reference` of an enveloped signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTemplate {
    pub uri: String,
    pub transforms: Vec<&'static str>,
    pub digest_method: &'static str,
    /// Base64 digest, empty until computed.
    pub digest_value: String,
}

/// Contents of a `ds:Signature` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTemplate {
    pub canonicalization_method: &'static str,
    pub signature_method: &'static str,
    pub reference: ReferenceTemplate,
    /// Base64 signature value, empty until signed.
    pub signature_value: String,
    /// Base64 DER certificates, end-entity first.  Rendered as one empty
    /// `ds:X509Certificate` while nothing has been embedded.
    pub certificates: Vec<String>,
}

impl SignatureTemplate {
    /// Enveloped RSA-SHA256 signature over the whole document, canonicalized
    /// with C14N 1.0.
    pub fn enveloped() -> Self {
        Self {
            canonicalization_method: algorithm::C14N,
            signature_method: algorithm::RSA_SHA256,
            reference: ReferenceTemplate {
                uri: String::new(),
                transforms: vec![algorithm::ENVELOPED_SIGNATURE, algorithm::C14N],
                digest_method: algorithm::SHA256,
                digest_value: String::new(),
            },
            signature_value: String::new(),
            certificates: Vec::new(),
        }
    }

    /// Serialize as a `ds:Signature` element that declares its own prefix.
    pub fn render(&self) -> String {
        let mut w = XmlWriter::new();
        let ds_decl = format!("xmlns:{}", ns::DSIG_PREFIX);

        w.start_element(&qname(ns::node::SIGNATURE), &[(ds_decl.as_str(), ns::DSIG)]);

        w.start_element(&qname(ns::node::SIGNED_INFO), &[]);
        algorithm_element(&mut w, ns::node::CANONICALIZATION_METHOD, self.canonicalization_method);
        algorithm_element(&mut w, ns::node::SIGNATURE_METHOD, self.signature_method);

        let reference = &self.reference;
        w.start_element(&qname(ns::node::REFERENCE), &[(ns::attr::URI, reference.uri.as_str())]);
        if !reference.transforms.is_empty() {
            w.start_element(&qname(ns::node::TRANSFORMS), &[]);
            for transform in &reference.transforms {
                algorithm_element(&mut w, ns::node::TRANSFORM, transform);
            }
            w.end_element(&qname(ns::node::TRANSFORMS));
        }
        algorithm_element(&mut w, ns::node::DIGEST_METHOD, reference.digest_method);
        w.text_element(&qname(ns::node::DIGEST_VALUE), &reference.digest_value);
        w.end_element(&qname(ns::node::REFERENCE));
        w.end_element(&qname(ns::node::SIGNED_INFO));

        w.text_element(&qname(ns::node::SIGNATURE_VALUE), &self.signature_value);

        w.start_element(&qname(ns::node::KEY_INFO), &[]);
        w.start_element(&qname(ns::node::X509_DATA), &[]);
        if self.certificates.is_empty() {
            w.text_element(&qname(ns::node::X509_CERTIFICATE), "");
        }
        for cert in &self.certificates {
            w.text_element(&qname(ns::node::X509_CERTIFICATE), cert);
        }
        w.end_element(&qname(ns::node::X509_DATA));
        w.end_element(&qname(ns::node::KEY_INFO));

        w.end_element(&qname(ns::node::SIGNATURE));
        w.into_string()
    }
}

/// Insert an empty enveloped signature as the first child of the document
/// element, replacing `document` with the result.
///
/// The caller keeps its own copy if it still needs the unsigned text.
pub fn insert_placeholder(document: &mut XmlDocument) -> Result<SignatureTemplate, Error> {
    let template = SignatureTemplate::enveloped();
    *document = document.with_first_child(&template.render())?;
    tracing::debug!(bytes = document.text().len(), "inserted signature placeholder");
    Ok(template)
}

fn qname(local: &str) -> String {
    format!("{}:{local}", ns::DSIG_PREFIX)
}

fn algorithm_element(w: &mut XmlWriter, local: &str, uri: &str) {
    let name = qname(local);
    w.start_element(&name, &[(ns::attr::ALGORITHM, uri)]);
    w.end_element(&name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmlseal_xml::{find_child_element, find_child_elements};

    #[test]
    fn test_placeholder_is_first_child() {
        let mut doc = XmlDocument::parse("<Invoice><Amount>100</Amount></Invoice>".into()).unwrap();
        insert_placeholder(&mut doc).unwrap();

        let parsed = doc.parse_doc().unwrap();
        let root = parsed.root_element();
        assert_eq!(root.tag_name().name(), "Invoice");
        let first = root.first_element_child().unwrap();
        assert_eq!(first.tag_name().name(), ns::node::SIGNATURE);
        assert_eq!(first.tag_name().namespace(), Some(ns::DSIG));
        assert!(doc.text().ends_with("<Amount>100</Amount></Invoice>"));
    }

    #[test]
    fn test_placeholder_shape() {
        let mut doc = XmlDocument::parse("<r/>".into()).unwrap();
        insert_placeholder(&mut doc).unwrap();
        let parsed = doc.parse_doc().unwrap();
        let sig = parsed.root_element().first_element_child().unwrap();

        let signed_info = find_child_element(sig, ns::DSIG, ns::node::SIGNED_INFO).unwrap();
        let c14n = find_child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD).unwrap();
        assert_eq!(c14n.attribute(ns::attr::ALGORITHM), Some(algorithm::C14N));
        let method = find_child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD).unwrap();
        assert_eq!(method.attribute(ns::attr::ALGORITHM), Some(algorithm::RSA_SHA256));

        let reference = find_child_element(signed_info, ns::DSIG, ns::node::REFERENCE).unwrap();
        assert_eq!(reference.attribute(ns::attr::URI), Some(""));
        let transforms = find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS).unwrap();
        let uris: Vec<_> = find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM)
            .iter()
            .filter_map(|t| t.attribute(ns::attr::ALGORITHM))
            .collect();
        assert_eq!(uris, [algorithm::ENVELOPED_SIGNATURE, algorithm::C14N]);

        let digest_value = find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE).unwrap();
        assert_eq!(digest_value.text(), None);
        let sig_value = find_child_element(sig, ns::DSIG, ns::node::SIGNATURE_VALUE).unwrap();
        assert_eq!(sig_value.text(), None);

        let key_info = find_child_element(sig, ns::DSIG, ns::node::KEY_INFO).unwrap();
        let x509_data = find_child_element(key_info, ns::DSIG, ns::node::X509_DATA).unwrap();
        let certs = find_child_elements(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE);
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].text(), None);
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        let pristine = XmlDocument::parse(r#"<a xmlns="urn:a" b="1"><c/></a>"#.into()).unwrap();
        let mut first = pristine.clone();
        let mut second = pristine.clone();
        let t1 = insert_placeholder(&mut first).unwrap();
        let t2 = insert_placeholder(&mut second).unwrap();
        assert_eq!(first.text(), second.text());
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_self_closing_root_is_expanded() {
        let mut doc = XmlDocument::parse(r#"<Empty a="1"/>"#.into()).unwrap();
        insert_placeholder(&mut doc).unwrap();
        assert!(doc.text().starts_with(r#"<Empty a="1"><ds:Signature xmlns:ds=""#));
        assert!(doc.text().ends_with("</ds:Signature></Empty>"));
    }

    #[test]
    fn test_render_lists_every_certificate() {
        let mut template = SignatureTemplate::enveloped();
        template.certificates = vec!["AAAA".into(), "BBBB".into()];
        let xml = template.render();
        assert!(xml.contains(
            "<ds:X509Data><ds:X509Certificate>AAAA</ds:X509Certificate>\
             <ds:X509Certificate>BBBB</ds:X509Certificate></ds:X509Data>"
        ));
    }

    #[test]
    fn test_render_is_canonical_shape() {
        let xml = SignatureTemplate::enveloped().render();
        assert!(xml.starts_with(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo>"#
        ));
        assert!(!xml.contains("/>"));
    }
}
