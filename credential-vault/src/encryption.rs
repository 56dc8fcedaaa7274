use crate::error::{VaultError, VaultResult};
use crate::key::MasterKey;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypted credential bundle as persisted on the credential row:
/// ciphertext, IV, and authentication tag as separate base64 columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// AES-256-GCM cipher over the vault master key.
///
/// 96-bit random nonces, 128-bit authentication tags. Decryption fails with
/// `AuthenticationFailed` on any tamper or wrong key; it never returns
/// unauthenticated plaintext.
pub struct VaultCipher {
    cipher: Aes256Gcm,
}

impl VaultCipher {
    pub fn new(key: &MasterKey) -> VaultResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.bytes())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a payload, returning separate ciphertext / IV / tag.
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<SealedSecret> {
        let mut iv_bytes = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv_bytes);
        let nonce = Nonce::from_slice(&iv_bytes);

        // aes-gcm appends the 16-byte tag; split it off for separate storage
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;

        if sealed.len() < TAG_LEN {
            return Err(VaultError::EncryptionFailed);
        }
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(SealedSecret {
            ciphertext: BASE64.encode(&sealed),
            iv: BASE64.encode(iv_bytes),
            tag: BASE64.encode(&tag),
        })
    }

    /// Decrypt and verify a sealed secret.
    ///
    /// Any bit flipped in ciphertext, IV, or tag makes this fail with
    /// `AuthenticationFailed` rather than yield garbage.
    pub fn open(&self, sealed: &SealedSecret) -> VaultResult<Vec<u8>> {
        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|e| VaultError::InvalidEncoding(e.to_string()))?;
        let iv = BASE64
            .decode(&sealed.iv)
            .map_err(|e| VaultError::InvalidEncoding(e.to_string()))?;
        let tag = BASE64
            .decode(&sealed.tag)
            .map_err(|e| VaultError::InvalidEncoding(e.to_string()))?;

        if iv.len() != IV_LEN {
            return Err(VaultError::InvalidIvLength(iv.len()));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::InvalidTagLength(tag.len()));
        }

        let nonce = Nonce::from_slice(&iv);
        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);

        self.cipher
            .decrypt(nonce, combined.as_slice())
            .map_err(|_| VaultError::AuthenticationFailed)
    }
}
