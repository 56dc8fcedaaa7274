use rand::RngCore;

/// Mint a cryptographically random 256-bit token, hex-encoded (64 chars).
pub fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
