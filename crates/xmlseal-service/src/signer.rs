#![forbid(unsafe_code)]

use std::sync::Arc;

use uuid::Uuid;
use xmlseal_core::Error;
use xmlseal_dsig::VerifyResult;
use xmlseal_xml::XmlDocument;

use crate::config::SignerConfig;
use crate::package::{ResultPackager, SigningResult};
use crate::store::{ArtifactHandle, ArtifactStore};

/// Signs XML documents with keys from PKCS#12 stores.
///
/// A `Signer` holds no per-request state and can be shared between threads.
/// Key material lives only for the duration of one [`Signer::sign`] call.
#[derive(Debug, Clone)]
pub struct Signer {
    config: SignerConfig,
    store: Arc<ArtifactStore>,
}

impl Signer {
    pub fn new(config: SignerConfig) -> Result<Self, Error> {
        config.validate()?;
        let store = ArtifactStore::open(&config.output_dir, config.retention)?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Sign `xml` with the key in `pfx`, store the result and return the
    /// compressed payload together with its handle.
    ///
    /// Nothing is written unless every step, including the optional
    /// verification of the new signature, succeeds.
    pub fn sign(&self, xml: &[u8], pfx: &[u8], passphrase: &str) -> Result<SigningResult, Error> {
        let span = tracing::info_span!("sign", request_id = %Uuid::new_v4());
        let _guard = span.enter();

        if xml.is_empty() {
            return Err(Error::InvalidInput("XML document is missing".into()));
        }
        if pfx.is_empty() {
            return Err(Error::InvalidInput("PKCS#12 key store is missing".into()));
        }

        let document = XmlDocument::parse_bytes(xml)?;
        let signed = {
            let key = xmlseal_keys::extract(pfx, passphrase)?;
            if !key.certificate_is_valid && self.config.require_valid_certificate {
                return Err(Error::Certificate(
                    "signing certificate is outside its validity period".into(),
                ));
            }

            let ca_chain: &[Vec<u8>] = if self.config.embed_ca_chain {
                &key.ca_certificates
            } else {
                &[]
            };
            let signed = xmlseal_dsig::sign_document(
                document,
                &key.signing_key(),
                &key.certificate,
                ca_chain,
            )?;

            if self.config.verify_after_sign {
                match xmlseal_dsig::verify(signed.text(), Some(&key.verification_key()))? {
                    VerifyResult::Valid => tracing::debug!("signature verified"),
                    VerifyResult::Invalid { reason } => {
                        return Err(Error::SignatureInvalid(format!(
                            "freshly created signature did not verify: {reason}"
                        )));
                    }
                }
            }
            signed
        };

        let result = ResultPackager::new(&self.store).package(&signed)?;
        tracing::info!(
            handle = %result.handle,
            bytes = signed.text().len(),
            "signed document stored"
        );
        Ok(result)
    }

    /// Return a stored signed document.  Any handle that does not name a
    /// live artifact, including ones that are not handles at all, is
    /// [`Error::NotFound`].
    pub fn download(&self, handle: &str) -> Result<Vec<u8>, Error> {
        let handle: ArtifactHandle = handle.trim().parse()?;
        self.store.read(handle)
    }

    /// Start the periodic sweep of expired documents on the current tokio
    /// runtime.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.store).spawn_sweeper(self.config.sweep_interval)
    }
}
