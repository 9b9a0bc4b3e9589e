//! A proof's secret: normally a fresh random value, but the wire format is a
//! bare string so it can also carry a well-known (NUT-10) spending condition.

use bitcoin::secp256k1::rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::dhke::hash_to_curve;
use crate::error::Error;
use crate::keys::{hex, PublicKey};

/// The secret string carried by a proof, stored canonically as the raw string
/// it was minted with (usually 64 lowercase hex chars over 32 random bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Draw a fresh 32-byte secret, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bitcoin::secp256k1::rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The secret's underlying string form, exactly as stored/transmitted.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize to lowercase hex per the wire convention: a 64-char valid-hex
    /// secret is used as-is; anything else is treated as base64 and re-encoded
    /// as hex over its decoded bytes.
    pub fn to_hex_normalized(&self) -> Result<String, Error> {
        if self.0.len() == 64 && hex::decode(&self.0).is_ok() {
            return Ok(self.0.to_lowercase());
        }
        let decoded = base64_decode(&self.0)?;
        Ok(hex::encode(decoded))
    }

    /// `Y = hash_to_curve(utf8_bytes_of(normalized_hex_string))`, used both to
    /// build blinded messages and to query mint state-check endpoints.
    pub fn y(&self) -> Result<PublicKey, Error> {
        let normalized = self.to_hex_normalized()?;
        hash_to_curve(normalized.as_bytes())
    }

    /// Base64 encoding of this secret's raw bytes, the form stored in event logs.
    pub fn to_base64(&self) -> String {
        base64_encode(self.0.as_bytes())
    }

    /// Inverse of [`Secret::to_base64`].
    pub fn from_base64(s: &str) -> Result<Self, Error> {
        let bytes = base64_decode(s)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| Error::Internal(format!("secret was not utf-8: {e}")))?;
        Ok(Self(s))
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use bitcoin::base64::engine::general_purpose::STANDARD;
    use bitcoin::base64::Engine;
    STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, Error> {
    use bitcoin::base64::engine::general_purpose::STANDARD;
    use bitcoin::base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| Error::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_64_hex_chars() {
        let secret = Secret::generate();
        assert_eq!(secret.as_str().len(), 64);
        assert!(hex::decode(secret.as_str()).is_ok());
    }

    #[test]
    fn test_hex_secret_normalizes_to_itself() {
        let secret = Secret::generate();
        assert_eq!(secret.to_hex_normalized().unwrap(), secret.as_str());
    }

    #[test]
    fn test_non_hex_secret_normalizes_via_base64() {
        // A NUT-10 well-known secret, not 64 hex chars, so it is treated as base64.
        let raw = r#"["P2PK",{"nonce":"abc","data":"02aa"}]"#;
        let encoded = base64_encode(raw.as_bytes());
        let secret = Secret::from(encoded);
        let normalized = secret.to_hex_normalized().unwrap();
        assert_eq!(hex::decode(&normalized).unwrap(), raw.as_bytes());
    }

    #[test]
    fn test_base64_roundtrip() {
        let secret = Secret::generate();
        let encoded = secret.to_base64();
        let decoded = Secret::from_base64(&encoded).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn test_y_is_deterministic() {
        let secret = Secret::generate();
        assert_eq!(secret.y().unwrap(), secret.y().unwrap());
    }
}
