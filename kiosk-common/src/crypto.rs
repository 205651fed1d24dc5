//! At-rest password cipher
//!
//! Encrypted values are stored as `ENC:<ivHex>:<ciphertextHex>`: AES-256-CBC
//! with PKCS#7 padding, the key being SHA-256 of the configured secret and the
//! IV 16 random bytes. Values without the prefix are plaintext.

use crate::{Error, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Marker prefix of encrypted values
pub const ENCRYPTED_PREFIX: &str = "ENC:";

const IV_LEN: usize = 16;

fn derive_key(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

/// True when the value carries the encrypted marker
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypt a plaintext password with the given secret
pub fn encrypt(plain: &str, secret: &str) -> Result<String> {
    if secret.is_empty() {
        return Err(Error::Crypto("secret key is required for encryption".to_string()));
    }

    let key = derive_key(secret);
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

    Ok(format!(
        "{}{}:{}",
        ENCRYPTED_PREFIX,
        hex::encode(iv),
        hex::encode(ciphertext)
    ))
}

/// Decrypt a stored value
///
/// Plaintext values are returned unchanged. An encrypted value needs the
/// secret it was written with.
pub fn decrypt(token: &str, secret: Option<&str>) -> Result<String> {
    let Some(body) = token.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(token.to_string());
    };

    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Crypto("secret key is required for decryption".to_string()))?;

    let (iv_hex, data_hex) = body
        .split_once(':')
        .filter(|(_, data)| !data.contains(':'))
        .ok_or_else(|| Error::Crypto("invalid encrypted token format".to_string()))?;

    let iv = hex::decode(iv_hex).map_err(|e| Error::Crypto(format!("invalid IV: {}", e)))?;
    let data =
        hex::decode(data_hex).map_err(|e| Error::Crypto(format!("invalid ciphertext: {}", e)))?;

    let key = derive_key(secret);
    let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| Error::Crypto(format!("invalid IV length: {}", e)))?;
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| Error::Crypto("decryption failed (wrong secret key?)".to_string()))?;

    String::from_utf8(plain).map_err(|_| Error::Crypto("decrypted value is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = encrypt("Opus2008", "kiosk-secret").unwrap();
        assert!(is_encrypted(&token));
        assert_eq!(token.split(':').count(), 3);
        assert_eq!(decrypt(&token, Some("kiosk-secret")).unwrap(), "Opus2008");
    }

    #[test]
    fn test_random_iv_changes_token() {
        let a = encrypt("same", "k").unwrap();
        let b = encrypt("same", "k").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_plaintext_passes_through() {
        assert_eq!(decrypt("plain", None).unwrap(), "plain");
        assert_eq!(decrypt("plain", Some("k")).unwrap(), "plain");
    }

    #[test]
    fn test_encrypted_without_secret_fails() {
        let token = encrypt("pw", "k").unwrap();
        assert!(decrypt(&token, None).is_err());
        assert!(decrypt(&token, Some("")).is_err());
    }

    #[test]
    fn test_wrong_secret_does_not_yield_plaintext() {
        let token = encrypt("pw", "right").unwrap();
        assert_ne!(decrypt(&token, Some("wrong")).ok().as_deref(), Some("pw"));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(decrypt("ENC:zz:00", Some("k")).is_err());
        assert!(decrypt("ENC:00112233", Some("k")).is_err());
        assert!(decrypt("ENC:a:b:c", Some("k")).is_err());
        assert!(encrypt("pw", "").is_err());
    }
}
