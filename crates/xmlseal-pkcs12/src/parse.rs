#![forbid(unsafe_code)]

//! BER parsing of PKCS#12 (PFX) structures (RFC 7292).
//!
//! PKCS#12 files are BER, not strict DER, so everything goes through
//! `yasna::parse_ber`.

use tracing::debug;
use xmlseal_core::Error;
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Error, ASN1ErrorKind, BERReader, Tag};
use zeroize::Zeroizing;

use crate::kdf::{self, Pbes2Cipher, Pkcs12Pbe, Prf};
use crate::Pkcs12Contents;

// PKCS#7 content types
const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

// PKCS#12 bag types
const OID_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 1];
const OID_PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
const OID_CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
const OID_X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];

// Legacy PBE
const OID_PBE_SHA1_RC2_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 5];
const OID_PBE_SHA1_RC2_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 6];
const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
const OID_PBE_SHA1_2DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 4];

// PBES2
const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];
const OID_AES_128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
const OID_AES_192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
const OID_AES_256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];

// MAC digests
const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

fn invalid() -> ASN1Error {
    ASN1Error::new(ASN1ErrorKind::Invalid)
}

#[derive(Debug)]
enum EncryptionAlgorithm {
    Pkcs12Pbe {
        scheme: Pkcs12Pbe,
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        prf: Prf,
        cipher: Pbes2Cipher,
        iv: Vec<u8>,
    },
    Unsupported(ObjectIdentifier),
}

#[derive(Debug, Clone, Copy)]
enum MacHashAlgorithm {
    Sha1,
    Sha256,
}

struct MacData {
    digest_algorithm: MacHashAlgorithm,
    digest_value: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

enum ContentInfo {
    Data(Vec<u8>),
    EncryptedData {
        algorithm: EncryptionAlgorithm,
        ciphertext: Vec<u8>,
    },
}

enum SafeBag {
    Key(Zeroizing<Vec<u8>>),
    ShroudedKey {
        algorithm: EncryptionAlgorithm,
        ciphertext: Vec<u8>,
    },
    Cert(Vec<u8>),
    Other,
}

/// The password in the two encodings the schemes need.
struct Password<'a> {
    /// UTF-8, for PBKDF2.
    utf8: &'a [u8],
    /// BMPString, for the PKCS#12 KDF.
    bmp: Zeroizing<Vec<u8>>,
}

pub fn parse_pfx(data: &[u8], password: &str) -> Result<Pkcs12Contents, Error> {
    if data.is_empty() {
        return Err(Error::InvalidKeyStore("PKCS#12 data is empty".into()));
    }

    let (auth_safe_data, mac_data) = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            let version = r.next().read_u32()?;
            if version != 3 {
                return Err(invalid());
            }
            let auth_safe_data = parse_outer_content_info(r.next())?;
            let mac_data = r.read_optional(parse_mac_data)?;
            Ok((auth_safe_data, mac_data))
        })
    })
    .map_err(|e| Error::InvalidKeyStore(format!("failed to parse PFX: {e}")))?;

    let mut candidates = kdf::bmp_candidates(password);
    let bmp = match &mac_data {
        Some(mac) => {
            let index = candidates
                .iter()
                .position(|bmp| mac_matches(mac, &auth_safe_data, bmp))
                .ok_or(Error::WrongPassphrase)?;
            candidates.swap_remove(index)
        }
        None => {
            debug!("PKCS#12 container has no integrity MAC");
            candidates.swap_remove(0)
        }
    };
    let password = Password {
        utf8: password.as_bytes(),
        bmp,
    };

    let content_infos = yasna::parse_ber(&auth_safe_data, |r| {
        r.collect_sequence_of(parse_content_info)
    })
    .map_err(|e| Error::InvalidKeyStore(format!("failed to parse authenticated safe: {e}")))?;

    let mut contents = Pkcs12Contents {
        private_keys: Vec::new(),
        certificates: Vec::new(),
    };

    for ci in content_infos {
        let bags_data = match ci {
            ContentInfo::Data(data) => Zeroizing::new(data),
            ContentInfo::EncryptedData {
                algorithm,
                ciphertext,
            } => decrypt(&algorithm, &ciphertext, &password)?,
        };

        let bags = yasna::parse_ber(&bags_data, |r| r.collect_sequence_of(parse_safe_bag))
            .map_err(|e| Error::InvalidKeyStore(format!("failed to parse safe contents: {e}")))?;

        for bag in bags {
            match bag {
                SafeBag::Key(pkcs8_der) => contents.private_keys.push(pkcs8_der),
                SafeBag::ShroudedKey {
                    algorithm,
                    ciphertext,
                } => contents
                    .private_keys
                    .push(decrypt(&algorithm, &ciphertext, &password)?),
                SafeBag::Cert(cert_der) => contents.certificates.push(cert_der),
                SafeBag::Other => debug!("skipping unsupported PKCS#12 bag"),
            }
        }
    }

    debug!(
        keys = contents.private_keys.len(),
        certificates = contents.certificates.len(),
        "decoded PKCS#12 container"
    );
    Ok(contents)
}

/// The PFX `authSafe`: a ContentInfo of type data wrapping an OCTET STRING.
fn parse_outer_content_info(r: BERReader<'_, '_>) -> Result<Vec<u8>, ASN1Error> {
    r.read_sequence(|r| {
        if r.next().read_oid()? != oid(OID_DATA) {
            return Err(invalid());
        }
        r.next().read_tagged(Tag::context(0), |r| r.read_bytes())
    })
}

fn parse_content_info(r: BERReader<'_, '_>) -> Result<ContentInfo, ASN1Error> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;

        if content_type == oid(OID_DATA) {
            let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
            Ok(ContentInfo::Data(data))
        } else if content_type == oid(OID_ENCRYPTED_DATA) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let _version = r.next().read_u32()?;
                    r.next().read_sequence(|r| {
                        let _content_type = r.next().read_oid()?;
                        let algorithm = parse_encryption_algorithm(r.next())?;
                        let ciphertext = r
                            .next()
                            .read_tagged_implicit(Tag::context(0), |r| r.read_bytes())?;
                        Ok(ContentInfo::EncryptedData {
                            algorithm,
                            ciphertext,
                        })
                    })
                })
            })
        } else {
            Err(invalid())
        }
    })
}

fn parse_safe_bag(r: BERReader<'_, '_>) -> Result<SafeBag, ASN1Error> {
    r.read_sequence(|r| {
        let bag_type = r.next().read_oid()?;

        let bag = if bag_type == oid(OID_KEY_BAG) {
            let der = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            SafeBag::Key(Zeroizing::new(der))
        } else if bag_type == oid(OID_PKCS8_SHROUDED_KEY_BAG) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let algorithm = parse_encryption_algorithm(r.next())?;
                    let ciphertext = r.next().read_bytes()?;
                    Ok(SafeBag::ShroudedKey {
                        algorithm,
                        ciphertext,
                    })
                })
            })?
        } else if bag_type == oid(OID_CERT_BAG) {
            let cert = r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    if r.next().read_oid()? != oid(OID_X509_CERTIFICATE) {
                        let _value = r.next().read_der()?;
                        return Ok(None);
                    }
                    r.next()
                        .read_tagged(Tag::context(0), |r| r.read_bytes())
                        .map(Some)
                })
            })?;
            cert.map_or(SafeBag::Other, SafeBag::Cert)
        } else {
            let _value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            SafeBag::Other
        };

        // bagAttributes (friendlyName, localKeyId) are not needed
        let _attrs = r.read_optional(|r| r.read_der())?;
        Ok(bag)
    })
}

fn parse_encryption_algorithm(r: BERReader<'_, '_>) -> Result<EncryptionAlgorithm, ASN1Error> {
    r.read_sequence(|r| {
        let alg_oid = r.next().read_oid()?;

        let legacy = [
            (OID_PBE_SHA1_3DES, Pkcs12Pbe::Sha1And3KeyTripleDes),
            (OID_PBE_SHA1_2DES, Pkcs12Pbe::Sha1And2KeyTripleDes),
            (OID_PBE_SHA1_RC2_128, Pkcs12Pbe::Sha1And128BitRc2),
            (OID_PBE_SHA1_RC2_40, Pkcs12Pbe::Sha1And40BitRc2),
        ]
        .into_iter()
        .find(|(o, _)| alg_oid == oid(o));

        if let Some((_, scheme)) = legacy {
            // pkcs-12PbeParams: SEQUENCE { salt OCTET STRING, iterations INTEGER }
            r.next().read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u32()?;
                Ok(EncryptionAlgorithm::Pkcs12Pbe {
                    scheme,
                    salt,
                    iterations,
                })
            })
        } else if alg_oid == oid(OID_PBES2) {
            r.next().read_sequence(parse_pbes2_params)
        } else {
            let _params = r.read_optional(|r| r.read_der())?;
            Ok(EncryptionAlgorithm::Unsupported(alg_oid))
        }
    })
}

/// PBES2-params: SEQUENCE { keyDerivationFunc, encryptionScheme }
fn parse_pbes2_params(r: &mut yasna::BERReaderSeq<'_, '_>) -> Result<EncryptionAlgorithm, ASN1Error> {
    let (salt, iterations, prf) = r.next().read_sequence(|r| {
        if r.next().read_oid()? != oid(OID_PBKDF2) {
            return Err(invalid());
        }
        // PBKDF2-params: SEQUENCE { salt, iterationCount, keyLength OPTIONAL, prf DEFAULT hmacWithSHA1 }
        r.next().read_sequence(|r| {
            let salt = r.next().read_bytes()?;
            let iterations = r.next().read_u32()?;
            let _key_length = r.read_optional(|r| r.read_u32())?;
            let prf = r
                .read_optional(|r| {
                    r.read_sequence(|r| {
                        let prf_oid = r.next().read_oid()?;
                        r.read_optional(|r| r.read_null())?;
                        if prf_oid == oid(OID_HMAC_SHA256) {
                            Ok(Prf::HmacSha256)
                        } else if prf_oid == oid(OID_HMAC_SHA1) {
                            Ok(Prf::HmacSha1)
                        } else {
                            Err(invalid())
                        }
                    })
                })?
                .unwrap_or(Prf::HmacSha1);
            Ok((salt, iterations, prf))
        })
    })?;

    let (cipher, iv) = r.next().read_sequence(|r| {
        let enc_oid = r.next().read_oid()?;
        let cipher = if enc_oid == oid(OID_AES_128_CBC) {
            Pbes2Cipher::Aes128Cbc
        } else if enc_oid == oid(OID_AES_192_CBC) {
            Pbes2Cipher::Aes192Cbc
        } else if enc_oid == oid(OID_AES_256_CBC) {
            Pbes2Cipher::Aes256Cbc
        } else {
            return Err(invalid());
        };
        let iv = r.next().read_bytes()?;
        Ok((cipher, iv))
    })?;

    Ok(EncryptionAlgorithm::Pbes2 {
        salt,
        iterations,
        prf,
        cipher,
        iv,
    })
}

fn parse_mac_data(r: BERReader<'_, '_>) -> Result<MacData, ASN1Error> {
    r.read_sequence(|r| {
        // DigestInfo: SEQUENCE { digestAlgorithm, digest }
        let (digest_algorithm, digest_value) = r.next().read_sequence(|r| {
            let alg = r.next().read_sequence(|r| {
                let hash_oid = r.next().read_oid()?;
                r.read_optional(|r| r.read_null())?;
                if hash_oid == oid(OID_SHA256) {
                    Ok(MacHashAlgorithm::Sha256)
                } else if hash_oid == oid(OID_SHA1) {
                    Ok(MacHashAlgorithm::Sha1)
                } else {
                    Err(invalid())
                }
            })?;
            let digest = r.next().read_bytes()?;
            Ok((alg, digest))
        })?;

        let salt = r.next().read_bytes()?;
        let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);

        Ok(MacData {
            digest_algorithm,
            digest_value,
            salt,
            iterations,
        })
    })
}

fn mac_matches(mac: &MacData, auth_safe_data: &[u8], bmp_password: &[u8]) -> bool {
    match mac.digest_algorithm {
        MacHashAlgorithm::Sha1 => {
            let key = kdf::pkcs12_kdf_sha1(kdf::ID_MAC, bmp_password, &mac.salt, mac.iterations, 20);
            kdf::hmac_sha1_matches(&key, auth_safe_data, &mac.digest_value)
        }
        MacHashAlgorithm::Sha256 => {
            let key = kdf::pkcs12_kdf_sha256(kdf::ID_MAC, bmp_password, &mac.salt, mac.iterations, 32);
            kdf::hmac_sha256_matches(&key, auth_safe_data, &mac.digest_value)
        }
    }
}

fn decrypt(
    algorithm: &EncryptionAlgorithm,
    ciphertext: &[u8],
    password: &Password<'_>,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    match algorithm {
        EncryptionAlgorithm::Pkcs12Pbe {
            scheme,
            salt,
            iterations,
        } => kdf::decrypt_pkcs12_pbe(*scheme, ciphertext, &password.bmp, salt, *iterations),
        EncryptionAlgorithm::Pbes2 {
            salt,
            iterations,
            prf,
            cipher,
            iv,
        } => kdf::decrypt_pbes2(*cipher, *prf, ciphertext, password.utf8, salt, *iterations, iv),
        EncryptionAlgorithm::Unsupported(alg) => Err(Error::InvalidKeyStore(format!(
            "unsupported PKCS#12 encryption algorithm {alg}"
        ))),
    }
}
