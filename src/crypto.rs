//! Symmetric encryption of stored book files.
//!
//! Blobs are laid out as `magic || version || nonce || ciphertext`, where the
//! ciphertext includes the Poly1305 tag.

use crate::error::{AppError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};

const MAGIC: &[u8; 4] = b"BVF1";
const VERSION: u8 = 1;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC.len() + 1 + NONCE_LEN;

/// Book file cipher built from the configured key.
#[derive(Clone)]
pub struct FileCipher {
    cipher: XChaCha20Poly1305,
}

impl FileCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AppError::Config(format!("Encryption key is not valid base64: {}", e)))?;

        if key.len() != 32 {
            return Err(AppError::Config(format!(
                "Encryption key must decode to 32 bytes, got {}",
                key.len()
            )));
        }

        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| AppError::Config(format!("Invalid encryption key: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Encrypt a plaintext file into a self-describing blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AppError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        output.extend_from_slice(MAGIC);
        output.push(VERSION);
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypt a blob produced by [`FileCipher::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < HEADER_LEN + TAG_LEN {
            return Err(AppError::Crypto("Encrypted file too short".to_string()));
        }
        if &blob[0..4] != MAGIC {
            return Err(AppError::Crypto("Invalid encrypted file (bad magic)".to_string()));
        }
        let version = blob[4];
        if version != VERSION {
            return Err(AppError::Crypto(format!(
                "Unsupported encrypted file version: {}",
                version
            )));
        }

        let nonce = XNonce::from_slice(&blob[5..HEADER_LEN]);
        self.cipher
            .decrypt(nonce, &blob[HEADER_LEN..])
            .map_err(|_| AppError::Crypto("Decryption failed (wrong key?)".to_string()))
    }
}

/// Generate a fresh base64-encoded 32-byte key.
pub fn generate_key() -> String {
    let key = XChaCha20Poly1305::generate_key(&mut OsRng);
    STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = FileCipher::from_base64(&generate_key()).unwrap();
        let plaintext = b"%PDF-1.7 chapter one".to_vec();

        let blob = cipher.encrypt(&plaintext).unwrap();
        assert_ne!(&blob[HEADER_LEN..], plaintext.as_slice());
        assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let cipher = FileCipher::from_base64(&generate_key()).unwrap();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = FileCipher::from_base64(&generate_key())
            .unwrap()
            .encrypt(b"secret")
            .unwrap();
        let other = FileCipher::from_base64(&generate_key()).unwrap();
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let cipher = FileCipher::from_base64(&generate_key()).unwrap();
        let mut blob = cipher.encrypt(b"secret").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(cipher.decrypt(&blob).is_err());
        assert!(cipher.decrypt(b"BVF1").is_err());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(FileCipher::from_base64("not base64!").is_err());
        assert!(FileCipher::from_base64(&STANDARD.encode([0u8; 16])).is_err());
    }
}
