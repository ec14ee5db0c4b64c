#![forbid(unsafe_code)]

//! Packaging of a signed document for the caller.

use std::io::{Read, Write};
use std::path::PathBuf;

use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use xmlseal_core::Error;
use xmlseal_xml::XmlDocument;

use crate::store::{ArtifactHandle, ArtifactStore};

/// What a successful `sign` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningResult {
    /// The signed document, gzip-compressed then base64-encoded.
    pub base64_gzip_xml: String,
    /// Where the signed document was written.
    pub signed_xml_path: PathBuf,
    /// Handle for retrieving the signed document later.
    pub handle: ArtifactHandle,
}

/// Stores signed documents and builds the compressed payload.
#[derive(Debug, Clone, Copy)]
pub struct ResultPackager<'a> {
    store: &'a ArtifactStore,
}

impl<'a> ResultPackager<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    /// The document text is stored exactly as produced by the signer.
    pub fn package(&self, signed: &XmlDocument) -> Result<SigningResult, Error> {
        let text = signed.text();
        let base64_gzip_xml = compress(text)?;
        let (handle, signed_xml_path) = self.store.put(text.as_bytes())?;
        tracing::debug!(
            %handle,
            xml_bytes = text.len(),
            payload_bytes = base64_gzip_xml.len(),
            "packaged signed document"
        );
        Ok(SigningResult {
            base64_gzip_xml,
            signed_xml_path,
            handle,
        })
    }
}

/// Gzip `xml` and base64-encode the result.  The gzip header carries no
/// timestamp, so equal input gives equal output.
pub fn compress(xml: &str) -> Result<String, Error> {
    let mut gz = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    gz.write_all(xml.as_bytes())?;
    let compressed = gz.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverse of [`compress`].
pub fn decompress(payload: &str) -> Result<String, Error> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Base64(e.to_string()))?;
    let mut xml = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut xml)
        .map_err(|e| Error::InvalidInput(format!("payload is not gzip-compressed UTF-8: {e}")))?;
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_compress_is_gzip() {
        let payload = compress("<Invoice><Amount>100</Amount></Invoice>").unwrap();
        let raw = base64::engine::general_purpose::STANDARD.decode(&payload).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(
            decompress(&payload).unwrap(),
            "<Invoice><Amount>100</Amount></Invoice>"
        );
    }

    #[test]
    fn test_compress_is_deterministic() {
        assert_eq!(compress("<a/>").unwrap(), compress("<a/>").unwrap());
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(matches!(decompress("***"), Err(Error::Base64(_))));
        let not_gzip = base64::engine::general_purpose::STANDARD.encode(b"plain");
        assert!(matches!(decompress(&not_gzip), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_package_stores_and_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        let doc = XmlDocument::parse("<r>\u{e9}</r>".into()).unwrap();

        let result = ResultPackager::new(&store).package(&doc).unwrap();
        assert_eq!(std::fs::read_to_string(&result.signed_xml_path).unwrap(), "<r>\u{e9}</r>");
        assert_eq!(decompress(&result.base64_gzip_xml).unwrap(), "<r>\u{e9}</r>");
        assert_eq!(store.read(result.handle).unwrap(), "<r>\u{e9}</r>".as_bytes());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["base64GzipXml"].is_string());
        assert!(json["signedXmlPath"].is_string());
        assert_eq!(json["handle"], result.handle.to_string());
    }
}
