#![forbid(unsafe_code)]

//! Key derivation, MAC and decryption for PKCS#12.
//!
//! Two key derivation paths:
//! 1. the PKCS#12 KDF (RFC 7292 Appendix B), used for the integrity MAC
//!    key and for legacy PBE key/IV material
//! 2. PBKDF2, used by PBES2

use cipher::block_padding::Pkcs7;
use cipher::{BlockCipher, BlockDecryptMut, InnerIvInit, KeyInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::digest::FixedOutputReset;
use sha2::{Digest, Sha256};
use xmlseal_core::Error;
use zeroize::Zeroizing;

/// PKCS#12 KDF diversifier values (RFC 7292 Appendix B.3).
pub const ID_KEY: u8 = 1;
pub const ID_IV: u8 = 2;
pub const ID_MAC: u8 = 3;

/// Block size `v` of the hashes used with the PKCS#12 KDF, in bytes.
const KDF_BLOCK: usize = 64;

pub fn pkcs12_kdf_sha1(id: u8, password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Zeroizing<Vec<u8>> {
    pkcs12_kdf::<Sha1>(id, password, salt, iterations, len)
}

pub fn pkcs12_kdf_sha256(id: u8, password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Zeroizing<Vec<u8>> {
    pkcs12_kdf::<Sha256>(id, password, salt, iterations, len)
}

/// RFC 7292 Appendix B.2.  `password` is already BMP-encoded.
fn pkcs12_kdf<D>(id: u8, password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Zeroizing<Vec<u8>>
where
    D: Digest + FixedOutputReset,
{
    let diversifier = [id; KDF_BLOCK];

    // I = S || P, each repeated to a multiple of v
    let mut input = Zeroizing::new(fill_blocks(salt));
    input.extend_from_slice(&fill_blocks(password));

    let mut out = Zeroizing::new(Vec::with_capacity(len + <D as Digest>::output_size()));
    let mut hasher = D::new();
    loop {
        Digest::update(&mut hasher, diversifier);
        Digest::update(&mut hasher, input.as_slice());
        let mut a = hasher.finalize_reset();
        for _ in 1..iterations {
            Digest::update(&mut hasher, &a);
            a = hasher.finalize_reset();
        }
        out.extend_from_slice(&a);
        if out.len() >= len {
            break;
        }

        // I_j = (I_j + B + 1) mod 2^(8v), B = A repeated to v bytes
        let b = fill_blocks(&a);
        for block in input.chunks_mut(KDF_BLOCK) {
            add_with_carry(block, &b);
        }
    }
    out.truncate(len);
    out
}

/// Repeat `data` to fill a whole number of KDF blocks.  Empty stays empty.
fn fill_blocks(data: &[u8]) -> Vec<u8> {
    let len = data.len().div_ceil(KDF_BLOCK) * KDF_BLOCK;
    data.iter().copied().cycle().take(len).collect()
}

/// `block = block + b + 1`, big-endian, discarding the final carry.
fn add_with_carry(block: &mut [u8], b: &[u8]) {
    let mut carry: u16 = 1;
    for (x, y) in block.iter_mut().zip(b).rev() {
        let sum = u16::from(*x) + u16::from(*y) + carry;
        *x = sum as u8;
        carry = sum >> 8;
    }
}

/// BMPString encodings a password may have been derived from.
///
/// A non-empty password is UTF-16BE plus a two-byte terminator.  An empty
/// password is ambiguous: some producers treat it as absent (no bytes),
/// others encode the terminator alone.  Both are returned, absent first.
pub fn bmp_candidates(password: &str) -> Vec<Zeroizing<Vec<u8>>> {
    if password.is_empty() {
        return vec![Zeroizing::new(Vec::new()), Zeroizing::new(vec![0, 0])];
    }
    let mut bmp = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
    for unit in password.encode_utf16() {
        bmp.extend_from_slice(&unit.to_be_bytes());
    }
    bmp.extend_from_slice(&[0, 0]);
    vec![bmp]
}

/// Constant-time check of an HMAC-SHA1 tag.
pub fn hmac_sha1_matches(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    <Hmac<Sha1> as Mac>::new_from_slice(key).is_ok_and(|mut mac| {
        mac.update(data);
        mac.verify_slice(expected).is_ok()
    })
}

/// Constant-time check of an HMAC-SHA256 tag.
pub fn hmac_sha256_matches(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    <Hmac<Sha256> as Mac>::new_from_slice(key).is_ok_and(|mut mac| {
        mac.update(data);
        mac.verify_slice(expected).is_ok()
    })
}

/// Legacy PKCS#12 PBE schemes (RFC 7292 Appendix C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkcs12Pbe {
    Sha1And3KeyTripleDes,
    Sha1And2KeyTripleDes,
    Sha1And128BitRc2,
    Sha1And40BitRc2,
}

impl Pkcs12Pbe {
    fn key_len(self) -> usize {
        match self {
            Self::Sha1And3KeyTripleDes => 24,
            Self::Sha1And2KeyTripleDes | Self::Sha1And128BitRc2 => 16,
            Self::Sha1And40BitRc2 => 5,
        }
    }
}

/// Decrypt with a legacy PBE scheme.  Key and IV come from the SHA-1
/// PKCS#12 KDF over the BMP-encoded password.
pub fn decrypt_pkcs12_pbe(
    scheme: Pkcs12Pbe,
    ciphertext: &[u8],
    bmp_password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let key = pkcs12_kdf_sha1(ID_KEY, bmp_password, salt, iterations, scheme.key_len());
    let iv = pkcs12_kdf_sha1(ID_IV, bmp_password, salt, iterations, 8);

    match scheme {
        Pkcs12Pbe::Sha1And3KeyTripleDes => cbc_decrypt(init::<des::TdesEde3>(&key)?, &iv, ciphertext),
        Pkcs12Pbe::Sha1And2KeyTripleDes => cbc_decrypt(init::<des::TdesEde2>(&key)?, &iv, ciphertext),
        Pkcs12Pbe::Sha1And128BitRc2 | Pkcs12Pbe::Sha1And40BitRc2 => {
            let rc2 = rc2::Rc2::new_with_eff_key_len(&key, key.len() * 8);
            cbc_decrypt(rc2, &iv, ciphertext)
        }
    }
}

/// PBKDF2 pseudo-random functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    HmacSha1,
    HmacSha256,
}

/// PBES2 encryption schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes2Cipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl Pbes2Cipher {
    fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }
}

/// Decrypt with PBES2.  PBKDF2 takes the password as raw UTF-8.
pub fn decrypt_pbes2(
    cipher: Pbes2Cipher,
    prf: Prf,
    ciphertext: &[u8],
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    iv: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut key = Zeroizing::new(vec![0u8; cipher.key_len()]);
    match prf {
        Prf::HmacSha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut key),
        Prf::HmacSha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key),
    }

    match cipher {
        Pbes2Cipher::Aes128Cbc => cbc_decrypt(init::<aes::Aes128>(&key)?, iv, ciphertext),
        Pbes2Cipher::Aes192Cbc => cbc_decrypt(init::<aes::Aes192>(&key)?, iv, ciphertext),
        Pbes2Cipher::Aes256Cbc => cbc_decrypt(init::<aes::Aes256>(&key)?, iv, ciphertext),
    }
}

fn init<C: KeyInit>(key: &[u8]) -> Result<C, Error> {
    C::new_from_slice(key).map_err(|_| Error::InvalidKeyStore("derived key has the wrong length".into()))
}

/// CBC decryption with PKCS#7 unpadding.  Bad padding means the key was
/// derived from the wrong password.
fn cbc_decrypt<C>(cipher: C, iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error>
where
    C: BlockDecryptMut + BlockCipher,
{
    let decryptor = cbc::Decryptor::<C>::inner_iv_slice_init(cipher, iv)
        .map_err(|_| Error::InvalidKeyStore("encryption IV has the wrong length".into()))?;
    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let plain_len = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| Error::WrongPassphrase)?
        .len();
    buf.truncate(plain_len);
    Ok(buf)
}
