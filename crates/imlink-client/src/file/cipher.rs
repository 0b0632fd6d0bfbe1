//! Asset encryption and integrity metadata.
//!
//! The receiving protocol addresses each encrypted blob by the metadata it
//! declares, so every buffer is described three ways: length, Adler-32
//! checksum (seeded 0, not the usual 1), and MD5 digest. Encryption is
//! AES-128-ECB with PKCS#7 padding and no initialization vector, fixed by
//! the provider's transfer protocol.

use adler32::RollingAdler32;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes128;
use rand::RngCore;

use imlink_core::error::{LinkError, LinkResult};

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

pub const KEY_LEN: usize = 16;

/// Length, checksum, and digest of one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferMeta {
    pub len: u32,
    /// Adler-32 over the full buffer, from seed 0.
    pub checksum: u32,
    /// Lowercase hex MD5.
    pub digest: String,
}

impl BufferMeta {
    pub fn of(data: &[u8]) -> Self {
        let mut adler = RollingAdler32::from_value(0);
        adler.update_buffer(data);
        Self {
            len: data.len() as u32,
            checksum: adler.hash(),
            digest: hex::encode(md5::compute(data).0),
        }
    }
}

/// One encrypted asset: the ciphertext plus metadata describing both sides
/// of the encryption.
#[derive(Debug, Clone)]
pub struct EncryptedAsset {
    pub key: [u8; KEY_LEN],
    pub plain: BufferMeta,
    pub cipher: BufferMeta,
    pub ciphertext: Vec<u8>,
}

/// Encrypt one asset, generating a fresh key when none is supplied.
///
/// Deterministic given the same key: identical plaintext and key always
/// yield identical ciphertext and metadata.
pub fn encrypt_asset(data: &[u8], key: Option<[u8; KEY_LEN]>) -> EncryptedAsset {
    let key = key.unwrap_or_else(generate_key);
    let ciphertext = Aes128EcbEnc::new((&key).into()).encrypt_padded_vec_mut::<Pkcs7>(data);
    EncryptedAsset {
        key,
        plain: BufferMeta::of(data),
        cipher: BufferMeta::of(&ciphertext),
        ciphertext,
    }
}

/// Inverse of [`encrypt_asset`] for a known key.
pub fn decrypt_asset(key: &[u8; KEY_LEN], ciphertext: &[u8]) -> LinkResult<Vec<u8>> {
    Aes128EcbDec::new(key.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| LinkError::Codec(format!("asset decrypt: {e}")))
}

pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
