use crate::error::{VaultError, VaultResult};
use rand::RngCore;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable holding the 256-bit master key as 64 hex characters.
pub const MASTER_KEY_ENV: &str = "VAULT_MASTER_KEY";

/// Well-known key used when no master key is configured. Never valid in
/// production; `from_env` refuses it when `ENVIRONMENT=production`.
const DEV_ONLY_KEY_HEX: &str = "6465762d6f6e6c792d6b65792d646f2d6e6f742d7573652d696e2d70726f6421";

/// 256-bit vault master key, zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
    dev_fallback: bool,
}

impl MasterKey {
    /// Parse a 64-character hex string into a master key.
    pub fn from_hex(key_hex: &str) -> VaultResult<Self> {
        if key_hex.len() != 64 {
            return Err(VaultError::InvalidKeyLength {
                expected: 64,
                got: key_hex.len(),
            });
        }

        let mut bytes = hex::decode(key_hex)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;

        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        bytes.zeroize();

        Ok(Self {
            key,
            dev_fallback: false,
        })
    }

    /// Load the key from `VAULT_MASTER_KEY`.
    ///
    /// When the variable is absent a fixed development-only key is substituted
    /// with a loud warning. Production deployments (`ENVIRONMENT=production`)
    /// reject the fallback outright.
    pub fn from_env() -> VaultResult<Self> {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(key_hex) => Self::from_hex(&key_hex),
            Err(_) => {
                let production = std::env::var("ENVIRONMENT")
                    .map(|e| e.eq_ignore_ascii_case("production"))
                    .unwrap_or(false);
                if production {
                    return Err(VaultError::DevKeyInProduction);
                }

                warn!(
                    "{} is not set; using an INSECURE development-only vault key. \
                     Payer credentials encrypted with this key are NOT protected.",
                    MASTER_KEY_ENV
                );
                let mut key = Self::from_hex(DEV_ONLY_KEY_HEX)?;
                key.dev_fallback = true;
                Ok(key)
            }
        }
    }

    /// Whether this key is the insecure development fallback.
    pub fn is_dev_fallback(&self) -> bool {
        self.dev_fallback
    }

    pub(crate) fn bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Generate a fresh random key, hex-encoded for configuration.
    pub fn generate_hex() -> String {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let encoded = hex::encode(key);
        key.zeroize();
        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_parses() {
        let key_hex = MasterKey::generate_hex();
        assert_eq!(key_hex.len(), 64);
        assert!(MasterKey::from_hex(&key_hex).is_ok());
    }

    #[test]
    fn short_key_rejected() {
        let result = MasterKey::from_hex("abcd");
        assert!(matches!(
            result,
            Err(VaultError::InvalidKeyLength { expected: 64, got: 4 })
        ));
    }

    #[test]
    fn non_hex_key_rejected() {
        let bad = "z".repeat(64);
        assert!(matches!(MasterKey::from_hex(&bad), Err(VaultError::InvalidKey(_))));
    }

    #[test]
    fn dev_key_is_valid_hex() {
        let key = MasterKey::from_hex(DEV_ONLY_KEY_HEX).unwrap();
        assert!(!key.is_dev_fallback());
    }
}
