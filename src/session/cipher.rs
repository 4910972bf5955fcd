//! Room-key obfuscation: bytewise XOR against the cycled key, shipped as
//! lowercase hex. Deliberately weak; it keeps casual listeners out of a
//! private room and nothing more.

use crate::error::{LinkError, Result};

/// Obfuscate UTF-8 text with the shared key. An empty key degenerates to
/// plain hex.
pub fn obfuscate(plain: &str, key: &str) -> String {
    let key = key.as_bytes();
    if key.is_empty() {
        return hex::encode(plain.as_bytes());
    }
    let mixed: Vec<u8> = plain
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect();
    hex::encode(mixed)
}

/// Invert [`obfuscate`]. Fails with `DecryptFailed` when the text is not
/// hex or the key yields invalid UTF-8.
pub fn deobfuscate(hex_text: &str, key: &str) -> Result<String> {
    let mixed = hex::decode(hex_text).map_err(|_| LinkError::DecryptFailed)?;
    let key = key.as_bytes();
    if key.is_empty() {
        return String::from_utf8(mixed).map_err(|_| LinkError::DecryptFailed);
    }

    let plain: Vec<u8> = mixed
        .iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect();
    String::from_utf8(plain).map_err(|_| LinkError::DecryptFailed)
}

/// Fresh room key: four lowercase hex characters. Short on purpose; the
/// wire budget is tight and the scheme is obfuscation either way.
pub fn generate_key() -> String {
    use rand::Rng;
    format!("{:04x}", rand::rng().random_range(0..0x10000u32))
}
