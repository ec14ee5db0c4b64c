#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! [`SignatureEngine`] walks a placeholder document through the signing
//! steps in a fixed order:
//!
//! `PlaceholdersInserted → DigestComputed → SignedInfoCanonicalized →
//! Signed → CertificateEmbedded → Complete`
//!
//! Calling a step out of order is an error; a failed step leaves the
//! engine where it was and no signed document is produced.

use base64::Engine as _;
use xmlseal_c14n::C14nMode;
use xmlseal_core::{ns, Error};
use xmlseal_crypto::SigningKey;
use xmlseal_transforms::{transform_from_uri, TransformData, TransformPipeline};
use xmlseal_xml::{find_child_element, is_element_named, NodeSet, XmlDocument};

use crate::template::{insert_placeholder, SignatureTemplate};

/// Where a [`SignatureEngine`] is in the signing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    PlaceholdersInserted,
    DigestComputed,
    SignedInfoCanonicalized,
    Signed,
    CertificateEmbedded,
    Complete,
}

/// Fills an inserted signature placeholder step by step.
#[derive(Debug)]
pub struct SignatureEngine {
    document: XmlDocument,
    template: SignatureTemplate,
    state: EngineState,
    canonical_signed_info: Vec<u8>,
}

impl SignatureEngine {
    /// `document` must be the output of [`insert_placeholder`] and
    /// `template` the value it returned.
    pub fn new(document: XmlDocument, template: SignatureTemplate) -> Self {
        Self {
            document,
            template,
            state: EngineState::PlaceholdersInserted,
            canonical_signed_info: Vec::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn template(&self) -> &SignatureTemplate {
        &self.template
    }

    /// Digest the document as if the signature element were absent.
    pub fn compute_digest(&mut self) -> Result<(), Error> {
        self.expect_state(EngineState::PlaceholdersInserted)?;

        let reference = &self.template.reference;
        if !reference.uri.is_empty() {
            return Err(Error::InvalidInput(format!(
                "only same-document references are supported, got URI {:?}",
                reference.uri
            )));
        }

        let (signature, initial) = {
            let doc = self.document.parse_doc()?;
            let signature = placeholder_signature(&doc)?;
            (signature.id(), NodeSet::all_without_comments(&doc))
        };

        let mut pipeline = TransformPipeline::new();
        for uri in &reference.transforms {
            pipeline.push(transform_from_uri(uri, signature)?);
        }
        let data = pipeline
            .execute(TransformData::Xml {
                xml_text: self.document.text().to_owned(),
                node_set: Some(initial),
            })?
            .into_binary()?;

        let digest = xmlseal_crypto::digest::digest(reference.digest_method, &data)?;
        let digest_value = base64::engine::general_purpose::STANDARD.encode(digest);
        tracing::debug!(
            canonical_bytes = data.len(),
            digest = %digest_value,
            "computed reference digest"
        );

        self.template.reference.digest_value = digest_value;
        self.state = EngineState::DigestComputed;
        Ok(())
    }

    /// Render the digest into the document and canonicalize `SignedInfo`
    /// in the context of its ancestors.
    pub fn canonicalize_signed_info(&mut self) -> Result<(), Error> {
        self.expect_state(EngineState::DigestComputed)?;

        let mode = C14nMode::from_uri(self.template.canonicalization_method).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!(
                "C14N: {}",
                self.template.canonicalization_method
            ))
        })?;

        let document = self.rendered()?;
        let canonical = {
            let doc = document.parse_doc()?;
            let signature = placeholder_signature(&doc)?;
            let signed_info = find_child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
                .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
            let subset = NodeSet::tree_without_comments(signed_info);
            xmlseal_c14n::canonicalize_doc(&doc, mode, Some(&subset))?
        };
        tracing::debug!(canonical_bytes = canonical.len(), "canonicalized SignedInfo");

        self.document = document;
        self.canonical_signed_info = canonical;
        self.state = EngineState::SignedInfoCanonicalized;
        Ok(())
    }

    /// Sign the canonical `SignedInfo` bytes.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), Error> {
        self.expect_state(EngineState::SignedInfoCanonicalized)?;

        let algorithm = xmlseal_crypto::sign::from_uri(self.template.signature_method)?;
        let signature = algorithm.sign(key, &self.canonical_signed_info)?;
        tracing::debug!(signature_bytes = signature.len(), "signed SignedInfo");

        self.template.signature_value = base64::engine::general_purpose::STANDARD.encode(signature);
        self.state = EngineState::Signed;
        Ok(())
    }

    /// Record the end-entity certificate followed by `ca_chain` for
    /// `ds:X509Data`.  An empty chain embeds the certificate alone.
    pub fn embed_certificates(&mut self, certificate: &[u8], ca_chain: &[Vec<u8>]) -> Result<(), Error> {
        self.expect_state(EngineState::Signed)?;
        if certificate.is_empty() {
            return Err(Error::Certificate("end-entity certificate is empty".into()));
        }

        let engine = base64::engine::general_purpose::STANDARD;
        self.template.certificates = std::iter::once(certificate)
            .chain(ca_chain.iter().map(Vec::as_slice))
            .map(|der| engine.encode(der))
            .collect();
        self.state = EngineState::CertificateEmbedded;
        Ok(())
    }

    /// Render the final signature into the document.  The engine stays
    /// in `Complete` afterwards and refuses further steps.
    pub fn finish(&mut self) -> Result<XmlDocument, Error> {
        self.expect_state(EngineState::CertificateEmbedded)?;
        let signed = self.rendered()?;
        self.state = EngineState::Complete;
        tracing::debug!(bytes = signed.text().len(), "signature complete");
        Ok(signed)
    }

    /// Run every remaining step.
    pub fn run(
        mut self,
        key: &SigningKey,
        certificate: &[u8],
        ca_chain: &[Vec<u8>],
    ) -> Result<XmlDocument, Error> {
        self.compute_digest()?;
        self.canonicalize_signed_info()?;
        self.sign(key)?;
        self.embed_certificates(certificate, ca_chain)?;
        self.finish()
    }

    fn expect_state(&self, expected: EngineState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Crypto(format!(
                "signing step requires state {expected:?}, engine is in {:?}",
                self.state
            )))
        }
    }

    /// The current document with the signature element re-rendered from
    /// the template.
    fn rendered(&self) -> Result<XmlDocument, Error> {
        let range = {
            let doc = self.document.parse_doc()?;
            placeholder_signature(&doc)?.range()
        };
        self.document.with_replaced(range, &self.template.render())
    }
}

/// Sign `document` with an enveloped signature and return the signed
/// document.  `ca_chain` may be empty.
pub fn sign_document(
    mut document: XmlDocument,
    key: &SigningKey,
    certificate: &[u8],
    ca_chain: &[Vec<u8>],
) -> Result<XmlDocument, Error> {
    let template = insert_placeholder(&mut document)?;
    SignatureEngine::new(document, template).run(key, certificate, ca_chain)
}

/// The `ds:Signature` placed first under the document element.
fn placeholder_signature<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    doc.root_element()
        .first_element_child()
        .filter(|n| is_element_named(n, ns::DSIG, ns::node::SIGNATURE))
        .ok_or_else(|| Error::MissingElement("Signature as first child of the document element".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use xmlseal_core::algorithm;
    use xmlseal_keys::KeyMaterial;

    fn fixture(name: &str) -> Vec<u8> {
        let path = format!("{}/../../test-data/{name}", env!("CARGO_MANIFEST_DIR"));
        std::fs::read(&path).unwrap_or_else(|e| panic!("{path}: {e}"))
    }

    fn test_key() -> KeyMaterial {
        xmlseal_keys::extract(&fixture("rsa-test.p12"), "test123").unwrap()
    }

    fn placeholder(xml: &str) -> SignatureEngine {
        let mut doc = XmlDocument::parse(xml.to_owned()).unwrap();
        let template = insert_placeholder(&mut doc).unwrap();
        SignatureEngine::new(doc, template)
    }

    #[test]
    fn test_states_advance_in_order() {
        let km = test_key();
        let mut engine = placeholder("<Invoice><Amount>100</Amount></Invoice>");
        assert_eq!(engine.state(), EngineState::PlaceholdersInserted);
        engine.compute_digest().unwrap();
        assert_eq!(engine.state(), EngineState::DigestComputed);
        assert!(!engine.template().reference.digest_value.is_empty());
        engine.canonicalize_signed_info().unwrap();
        assert_eq!(engine.state(), EngineState::SignedInfoCanonicalized);
        engine.sign(&km.signing_key()).unwrap();
        assert_eq!(engine.state(), EngineState::Signed);
        engine.embed_certificates(&km.certificate, &[]).unwrap();
        assert_eq!(engine.state(), EngineState::CertificateEmbedded);
        let signed = engine.finish().unwrap();
        assert_eq!(engine.state(), EngineState::Complete);
        assert!(signed.text().contains("<ds:SignatureValue>"));
        assert!(engine.finish().is_err());
        assert!(engine.embed_certificates(&km.certificate, &[]).is_err());
        assert_eq!(engine.state(), EngineState::Complete);
    }

    #[test]
    fn test_out_of_order_step_rejected() {
        let km = test_key();
        let mut engine = placeholder("<a/>");
        assert!(engine.sign(&km.signing_key()).is_err());
        assert!(engine.canonicalize_signed_info().is_err());
        assert_eq!(engine.state(), EngineState::PlaceholdersInserted);
    }

    #[test]
    fn test_digest_ignores_signature_element() {
        // SHA-256 of "<Invoice><Amount>100</Amount></Invoice>"
        let mut engine = placeholder("<Invoice><Amount>100</Amount></Invoice>");
        engine.compute_digest().unwrap();
        let expected = xmlseal_crypto::digest::digest(
            algorithm::SHA256,
            b"<Invoice><Amount>100</Amount></Invoice>",
        )
        .unwrap();
        assert_eq!(
            engine.template().reference.digest_value,
            base64::engine::general_purpose::STANDARD.encode(expected)
        );
    }

    #[test]
    fn test_signed_info_inherits_namespaces() {
        let mut engine = placeholder(r#"<Doc xmlns="urn:doc"><v>1</v></Doc>"#);
        engine.compute_digest().unwrap();
        engine.canonicalize_signed_info().unwrap();
        let canonical = String::from_utf8(engine.canonical_signed_info.clone()).unwrap();
        assert!(canonical.starts_with(
            r#"<ds:SignedInfo xmlns="urn:doc" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#
        ));
    }

    #[test]
    fn test_sign_document_embeds_chain() {
        let km = xmlseal_keys::extract(&fixture("rsa-chain.p12"), "test123").unwrap();
        let doc = XmlDocument::parse("<r><x>1</x></r>".into()).unwrap();
        let signed =
            sign_document(doc, &km.signing_key(), &km.certificate, &km.ca_certificates).unwrap();
        let engine = base64::engine::general_purpose::STANDARD;
        let leaf = engine.encode(fixture("rsa-chain-leaf.der"));
        let ca = engine.encode(fixture("rsa-chain-ca.der"));
        assert!(signed.text().contains(&format!(
            "<ds:X509Certificate>{leaf}</ds:X509Certificate><ds:X509Certificate>{ca}</ds:X509Certificate>"
        )));
    }

    #[test]
    fn test_missing_placeholder_is_reported() {
        let doc = XmlDocument::parse("<r><x/></r>".into()).unwrap();
        let mut engine = SignatureEngine::new(doc, SignatureTemplate::enveloped());
        let err = engine.compute_digest().unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)), "{err:?}");
    }

    fn signed_values(signed: &XmlDocument) -> (String, String) {
        let doc = signed.parse_doc().unwrap();
        let text = |local: &str| {
            XmlDocument::find_element(&doc, ns::DSIG, local)
                .and_then(|n| n.text())
                .unwrap_or("")
                .to_owned()
        };
        (text(ns::node::DIGEST_VALUE), text(ns::node::SIGNATURE_VALUE))
    }

    // Expected values were computed independently: libxml2 C14N over the
    // same placeholder document, then `openssl dgst -sha256 -sign` over the
    // canonical SignedInfo.
    #[test]
    fn test_invoice_signature_matches_reference_values() {
        let km = test_key();
        let doc = XmlDocument::parse("<Invoice><Amount>100</Amount></Invoice>".into()).unwrap();
        let signed = sign_document(doc, &km.signing_key(), &km.certificate, &[]).unwrap();

        let (digest, signature) = signed_values(&signed);
        assert_eq!(digest, "K0XbC1vGHedflFI9TomexaSkDbtkKnD0nFX9SbFfot0=");
        assert_eq!(
            signature,
            "Bdb9xsFqtQ+/8/0hN5WoAKZwSmgMZsmJdWVOr0Y4uQJgXothVVz/9rnDeDqJuvzjt0nINOVxI0ur8F1euv6HXRBFFPhkzCcIH1d4e4cY/b6h/fN3oxqMrvI23soggLTq2CfmC2U2PnSyc5o6U2mHdV4e/cFPuRequzgyYnr7pZn1y/GiGGMxLcIwMUgOJEPaRVKEurLcAapgB2eg1Txp3uTzcEjVxINUmxUq+1iZ4ZTKpR7JogLq3OTGYnO/RNO2angeFixDtK3VkTLZoym+dbMoPmYxRROd9FPqEWM+Zbi5gGSAyh76ImFl8x/Kd7xHvJK7uwdb7Tb2QVUqJsEuHA=="
        );
    }

    #[test]
    fn test_dtd_and_namespaces_match_reference_values() {
        let xml = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<!DOCTYPE inv:Invoice [\n",
            "<!ATTLIST inv:Invoice currency CDATA \"BRL\">\n",
            "<!ATTLIST inv:Line id ID #IMPLIED>\n",
            "]>\n",
            "<!-- issued -->\n",
            "<inv:Invoice xmlns:inv=\"urn:invoice\" xmlns=\"urn:default\" xml:lang=\"pt-BR\" z=\"1\" a=\"2\">\n",
            "  <inv:Line id=\"  L1 \" qty='3'>caf&#233; &lt;x&gt;</inv:Line>\n",
            "  <Note xmlns=\"\"/>\n",
            "</inv:Invoice>\n",
        );
        let km = test_key();
        let doc = XmlDocument::parse(xml.into()).unwrap();
        let signed = sign_document(doc, &km.signing_key(), &km.certificate, &[]).unwrap();

        let (digest, signature) = signed_values(&signed);
        assert_eq!(digest, "p6WClkTS4dqzCfSjYz75HM8NCLm0L0CiskuIdk6n08A=");
        assert_eq!(
            signature,
            "tdb465F1bRM9U0Mk9VE4aeXi4aLJo143jKvhtfZZHMIY9kpw1qumLRIlX98GTLq2ua5TyONrYpTEMq3cNFOZrlmB/E1gmpeJoV6s7XhJhT6j0YzzQ4wHYFAqsxEaVbrK5ThBj+JrXmkynAhBTdSSx5kVUk1N/vg9SlpvTGCZ77I49M4vQmU4bQmGWNCA6PXE50SnGUVz4q/5VSasfw65C01dfhLtRUGC8JPfKLaPBvSvRO1Kn8q5mJqmuuhmsb/L3ZcGi8h+t+nUJpcimH+FHbVGA5NDqURZ6cILSg0YkbbHwJWLUMAxH+kB7XKWVhzMkvpZRNy+pKNdc+F7x6VnRg=="
        );
    }
}
