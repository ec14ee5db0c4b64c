#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Locate `<Signature>` and read `<SignedInfo>`: CanonicalizationMethod,
//!    SignatureMethod
//! 2. For each `<Reference>`: run its transforms, compute the digest, compare
//! 3. Take the verification key from the caller or from the first
//!    `<X509Certificate>` in `<KeyInfo>`
//! 4. Canonicalize `<SignedInfo>` and check `<SignatureValue>`
//!
//! Only same-document whole-document references (`URI=""`) are understood.
//! The certificate is not checked against any trust anchor.

use base64::Engine as _;
use xmlseal_c14n::C14nMode;
use xmlseal_core::{ns, Error};
use xmlseal_crypto::SigningKey;
use xmlseal_transforms::{transform_from_uri, TransformData, TransformPipeline};
use xmlseal_xml::{find_child_element, find_child_elements, NodeSet, XmlDocument};

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }
}

/// Verify the first enveloped signature in `xml`.
///
/// When `key` is `None` the public key of the embedded end-entity
/// certificate is used.  A digest or signature mismatch is reported as
/// [`VerifyResult::Invalid`]; a document that cannot be processed at all is
/// an `Err`.
pub fn verify(xml: &str, key: Option<&SigningKey>) -> Result<VerifyResult, Error> {
    let doc = xmlseal_xml::parse(xml)?;

    let sig_node = XmlDocument::find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let c14n_uri = algorithm_of(signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {c14n_uri}")))?;
    let sig_method_uri = algorithm_of(signed_info, ns::node::SIGNATURE_METHOD)?;

    let references = find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
    if references.is_empty() {
        return Err(Error::MissingElement("Reference".into()));
    }
    for reference in references {
        if let VerifyResult::Invalid { reason } = verify_reference(reference, xml, &doc, sig_node)? {
            return Ok(VerifyResult::Invalid {
                reason: format!("Reference digest failed: {reason}"),
            });
        }
    }

    let embedded;
    let key = match key {
        Some(key) => key,
        None => {
            let der = embedded_certificate(sig_node)?;
            embedded = SigningKey::RsaPublic(xmlseal_keys::certificate_public_key(&der)?);
            &embedded
        }
    };

    let signed_info_set = NodeSet::tree_without_comments(signed_info);
    let c14n_signed_info = xmlseal_c14n::canonicalize_doc(&doc, c14n_mode, Some(&signed_info_set))?;

    let sig_value_node = find_child_element(sig_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    let sig_value = decode_base64(sig_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

    let sig_alg = xmlseal_crypto::sign::from_uri(sig_method_uri)?;
    if sig_alg.verify(key, &c14n_signed_info, &sig_value)? {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        })
    }
}

fn verify_reference(
    reference: roxmltree::Node<'_, '_>,
    xml: &str,
    doc: &roxmltree::Document<'_>,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<VerifyResult, Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    if !uri.is_empty() {
        return Err(Error::InvalidInput(format!(
            "unsupported reference URI {uri:?}, only URI=\"\" is understood"
        )));
    }

    let digest_uri = algorithm_of(reference, ns::node::DIGEST_METHOD)?;
    let digest_value_node = find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let expected = decode_base64(digest_value_node.text().unwrap_or(""))
        .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

    let mut pipeline = TransformPipeline::new();
    if let Some(transforms) = find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        for transform in find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM) {
            let uri = transform
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
            pipeline.push(transform_from_uri(uri, sig_node.id())?);
        }
    }
    tracing::debug!(transforms = ?pipeline.uris().collect::<Vec<_>>(), "applying reference transforms");

    let bytes = pipeline
        .execute(TransformData::Xml {
            xml_text: xml.to_owned(),
            node_set: Some(NodeSet::all_without_comments(doc)),
        })?
        .into_binary()?;
    let computed = xmlseal_crypto::digest::digest(digest_uri, &bytes)?;

    if computed == expected {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "expected digest does not match computed digest".into(),
        })
    }
}

fn algorithm_of<'a>(parent: roxmltree::Node<'a, '_>, local: &str) -> Result<&'a str, Error> {
    find_child_element(parent, ns::DSIG, local)
        .ok_or_else(|| Error::MissingElement(local.into()))?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {local}")))
}

fn embedded_certificate(sig_node: roxmltree::Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let text = find_child_element(sig_node, ns::DSIG, ns::node::KEY_INFO)
        .and_then(|ki| find_child_element(ki, ns::DSIG, ns::node::X509_DATA))
        .and_then(|data| find_child_element(data, ns::DSIG, ns::node::X509_CERTIFICATE))
        .and_then(|cert| cert.text())
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::MissingElement("X509Certificate".into()))?;
    decode_base64(text).map_err(|e| Error::Base64(format!("X509Certificate: {e}")))
}

fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::sign_document;
    use xmlseal_keys::KeyMaterial;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(&path).unwrap_or_else(|e| panic!("{path}: {e}"))
    }

    fn test_key() -> KeyMaterial {
        xmlseal_keys::extract(&fixture("rsa-test.p12"), "test123").unwrap()
    }

    fn sign(xml: &str) -> String {
        let km = test_key();
        let doc = XmlDocument::parse(xml.to_owned()).unwrap();
        sign_document(doc, &km.signing_key(), &km.certificate, &km.ca_certificates)
            .unwrap()
            .into_text()
    }

    #[test]
    fn test_roundtrip_with_embedded_certificate() {
        let signed = sign("<Invoice><Amount>100</Amount></Invoice>");
        assert_eq!(verify(&signed, None).unwrap(), VerifyResult::Valid);
    }

    #[test]
    fn test_roundtrip_with_supplied_key() {
        let km = test_key();
        let signed = sign("<Invoice><Amount>100</Amount></Invoice>");
        assert!(verify(&signed, Some(&km.verification_key())).unwrap().is_valid());
    }

    #[test]
    fn test_roundtrip_document_shapes() {
        let cases = [
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- leading comment -->
<p:Order xmlns:p="urn:orders" xmlns="urn:default" id="7">
  <p:Line qty="2">Widget &amp; gadget</p:Line>
  <Note xml:lang="en">  spaced   text  </Note>
  <!-- inner comment -->
  <?pi data?>
</p:Order>
"#,
            r#"<Empty attr="1"/>"#,
            "<r xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"><ds:Other/>\r\n</r>",
            r#"<!DOCTYPE r [<!ENTITY e "entity text">]><r>&e;</r>"#,
        ];
        for xml in cases {
            let signed = sign(xml);
            assert_eq!(verify(&signed, None).unwrap(), VerifyResult::Valid, "{xml}");
        }
    }

    #[test]
    fn test_tampered_body_detected() {
        let signed = sign("<Invoice><Amount>100</Amount></Invoice>");
        let tampered = signed.replace("<Amount>100</Amount>", "<Amount>900</Amount>");
        assert_ne!(signed, tampered);
        match verify(&tampered, None).unwrap() {
            VerifyResult::Invalid { reason } => assert!(reason.contains("digest"), "{reason}"),
            VerifyResult::Valid => panic!("tampered document verified"),
        }
    }

    #[test]
    fn test_every_body_byte_flip_detected() {
        let signed = sign(r#"<Invoice id="1"><Amount>100</Amount></Invoice>"#);
        let sig_start = signed.find("<ds:Signature").unwrap();
        let sig_end = signed.find("</ds:Signature>").unwrap() + "</ds:Signature>".len();
        let flips = ['1', '0', 'A', 'm'];
        for (i, ch) in signed.char_indices() {
            if (sig_start..sig_end).contains(&i) {
                continue;
            }
            let Some(&replacement) = flips.iter().find(|&&r| r != ch && ch.is_alphanumeric()) else {
                continue;
            };
            let mut tampered = signed.clone();
            tampered.replace_range(i..i + ch.len_utf8(), &replacement.to_string());
            match verify(&tampered, None) {
                Ok(VerifyResult::Valid) => panic!("flip at {i} went unnoticed: {tampered}"),
                Ok(VerifyResult::Invalid { .. }) | Err(_) => {}
            }
        }
    }

    #[test]
    fn test_tampered_signed_info_detected() {
        let signed = sign("<a>x</a>");
        let tampered = signed.replace(
            r#"<ds:Reference URI="">"#,
            r#"<ds:Reference URI="" Id="r">"#,
        );
        assert!(!verify(&tampered, None).unwrap().is_valid());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signed = sign("<a>x</a>");
        let other = xmlseal_keys::extract(&fixture("rsa-chain.p12"), "test123").unwrap();
        let result = verify(&signed, Some(&other.verification_key())).unwrap();
        assert_eq!(
            result,
            VerifyResult::Invalid {
                reason: "signature value verification failed".into()
            }
        );
    }

    #[test]
    fn test_attribute_order_does_not_change_digest() {
        let a = sign(r#"<r b="2" a="1" xmlns:z="urn:z" z:c="3"><x/></r>"#);
        let b = sign(r#"<r z:c="3" xmlns:z="urn:z" a="1"   b="2"><x></x></r>"#);
        let digest = |s: &str| {
            let start = s.find("<ds:DigestValue>").unwrap() + "<ds:DigestValue>".len();
            let end = s.find("</ds:DigestValue>").unwrap();
            s[start..end].to_owned()
        };
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn test_unsigned_document() {
        let err = verify("<a/>", None).unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)), "{err:?}");
    }

    #[test]
    fn test_missing_certificate_without_key() {
        let signed = sign("<a/>");
        let start = signed.find("<ds:KeyInfo>").unwrap();
        let end = signed.find("</ds:KeyInfo>").unwrap() + "</ds:KeyInfo>".len();
        let mut stripped = signed.clone();
        stripped.replace_range(start..end, "");
        let err = verify(&stripped, None).unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)), "{err:?}");
        assert!(verify(&stripped, Some(&test_key().verification_key()))
            .unwrap()
            .is_valid());
    }

    // Signed outside this crate (libxml2 C14N + OpenSSL), with a layout
    // the signer never produces: default-namespace Signature placed last,
    // indented SignedInfo, wrapped SignatureValue.
    #[test]
    fn test_accepts_externally_produced_signature() {
        let xml = String::from_utf8(fixture("invoice-signed-external.xml")).unwrap();
        assert_eq!(verify(&xml, None).unwrap(), VerifyResult::Valid);

        let tampered = xml.replace(">100<", ">101<");
        assert!(!verify(&tampered, None).unwrap().is_valid());
    }
}
