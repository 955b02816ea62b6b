//! AES-256-CBC encryption for individual field values.
//!
//! Wire format: `<iv_hex>:<ciphertext_hex>`. A fresh IV is drawn for every
//! call, so equal plaintexts never produce equal ciphertexts.

use crate::{DatabaseError, DatabaseResult};
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use std::fmt;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV size for AES-CBC (128 bits = 16 bytes).
pub const IV_SIZE: usize = 16;

/// Key size for AES-256 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

const DELIMITER: char = ':';

/// Generate a random IV for encryption.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Derive the fixed-size key from the shared secret.
///
/// The secret's bytes are copied into a zeroed buffer: longer secrets are
/// truncated, shorter ones are zero-padded.
pub fn derive_key(secret: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    let len = secret.len().min(KEY_SIZE);
    key[..len].copy_from_slice(&secret[..len]);
    key
}

fn invalid_data() -> DatabaseError {
    DatabaseError::Encryption("invalid encrypted data".to_string())
}

/// Encrypts and decrypts field values with a key derived from the shared secret.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; KEY_SIZE],
}

impl FieldCipher {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: derive_key(secret.as_ref()),
        }
    }

    /// Encrypt `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> DatabaseResult<String> {
        self.encrypt_with_iv(&generate_iv(), plaintext)
    }

    fn encrypt_with_iv(&self, iv: &[u8; IV_SIZE], plaintext: &str) -> DatabaseResult<String> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, iv)
            .map_err(|e| DatabaseError::Encryption(e.to_string()))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            DELIMITER,
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a wire value produced by [`FieldCipher::encrypt`].
    ///
    /// Malformed input, a wrong key or corrupted ciphertext all fail with
    /// `DatabaseError::Encryption`; garbage is never returned silently.
    pub fn decrypt(&self, wire: &str) -> DatabaseResult<String> {
        let (iv_hex, ciphertext_hex) = wire.split_once(DELIMITER).ok_or_else(invalid_data)?;
        if iv_hex.is_empty() || ciphertext_hex.is_empty() {
            return Err(invalid_data());
        }

        let iv = hex::decode(iv_hex).map_err(|_| invalid_data())?;
        if iv.len() != IV_SIZE {
            return Err(invalid_data());
        }
        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| invalid_data())?;

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &iv)
            .map_err(|e| DatabaseError::Encryption(e.to_string()))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| invalid_data())?;

        String::from_utf8(plaintext).map_err(|_| invalid_data())
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldCipher([REDACTED])")
    }
}
