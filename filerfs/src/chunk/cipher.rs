//! AES-256-GCM chunk decryption. Stored ciphertext is `nonce || sealed`.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::{FilerError, FilerResult};

pub const NONCE_SIZE: usize = 12;

pub fn decrypt(file_id: &str, data: &[u8], key: &[u8]) -> FilerResult<Vec<u8>> {
    let fail = |reason: String| FilerError::Decrypt {
        file_id: file_id.to_string(),
        reason,
    };
    if data.len() < NONCE_SIZE {
        return Err(fail(format!("ciphertext too short: {} bytes", data.len())));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| fail(e.to_string()))?;
    let (nonce, sealed) = data.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| fail("authentication failed".into()))
}

#[cfg(test)]
pub(crate) fn encrypt(data: &[u8], key: &[u8]) -> Vec<u8> {
    use rand::Rng;

    let cipher = Aes256Gcm::new_from_slice(key).unwrap();
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill(&mut nonce);
    let sealed = cipher.encrypt(Nonce::from_slice(&nonce), data).unwrap();
    let mut out = nonce.to_vec();
    out.extend_from_slice(&sealed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrypt_sealed_chunk() {
        let key = [7u8; 32];
        let sealed = encrypt(b"hello chunk", &key);
        assert_eq!(decrypt("3,01", &sealed, &key).unwrap(), b"hello chunk");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(b"hello chunk", &[7u8; 32]);
        let err = decrypt("3,01", &sealed, &[8u8; 32]).unwrap_err();
        assert!(matches!(err, FilerError::Decrypt { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_short_or_bad_key() {
        assert!(decrypt("3,01", b"short", &[7u8; 32]).is_err());
        assert!(decrypt("3,01", &[0u8; 40], &[7u8; 5]).is_err());
    }
}
