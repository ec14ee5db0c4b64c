#![forbid(unsafe_code)]

use serde::Serialize;

/// Errors produced by the xmlseal signing pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("document has no root element")]
    NoRootElement,

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid PKCS#12 key store: {0}")]
    InvalidKeyStore(String),

    #[error("wrong passphrase for PKCS#12 key store")]
    WrongPassphrase,

    #[error("PKCS#12 key store contains no usable certificate")]
    NoCertificate,

    #[error("PKCS#12 key store contains no private key")]
    NoPrivateKey,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category reported next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    InvalidKeyStore,
    XmlStructure,
    CryptoFailure,
    IoFailure,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::InvalidKeyStore => "invalid_key_store",
            Self::XmlStructure => "xml_structure",
            Self::CryptoFailure => "crypto_failure",
            Self::IoFailure => "io_failure",
            Self::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// The category this error is reported under.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) | Self::XmlParse(_) => ErrorCode::InvalidInput,
            Self::InvalidKeyStore(_)
            | Self::WrongPassphrase
            | Self::NoCertificate
            | Self::NoPrivateKey => ErrorCode::InvalidKeyStore,
            Self::NoRootElement
            | Self::XmlStructure(_)
            | Self::MissingElement(_)
            | Self::MissingAttribute(_) => ErrorCode::XmlStructure,
            Self::UnsupportedAlgorithm(_)
            | Self::Crypto(_)
            | Self::Certificate(_)
            | Self::Base64(_)
            | Self::SignatureInvalid(_)
            | Self::DigestMismatch(_) => ErrorCode::CryptoFailure,
            Self::Io(_) => ErrorCode::IoFailure,
            Self::NotFound(_) => ErrorCode::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_store_errors_share_code() {
        for err in [
            Error::InvalidKeyStore("bad BER".into()),
            Error::WrongPassphrase,
            Error::NoCertificate,
            Error::NoPrivateKey,
        ] {
            assert_eq!(err.code(), ErrorCode::InvalidKeyStore, "{err}");
        }
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), ErrorCode::IoFailure);
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::XmlStructure).unwrap();
        assert_eq!(json, "\"xml_structure\"");
        assert_eq!(ErrorCode::CryptoFailure.to_string(), "crypto_failure");
    }
}
