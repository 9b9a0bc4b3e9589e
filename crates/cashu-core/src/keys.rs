//! Compressed secp256k1 key wrappers and keyset-key maps (NUT-01/NUT-02).

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use std::collections::BTreeMap;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::rand::rngs::OsRng;
use bitcoin::secp256k1::{self, Scalar, SECP256K1};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// A compressed secp256k1 public key, as used for mint keys, `B_` and `C`/`C_`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    inner: secp256k1::PublicKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Deref for PublicKey {
    type Target = secp256k1::PublicKey;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<secp256k1::PublicKey> for PublicKey {
    fn from(inner: secp256k1::PublicKey) -> Self {
        Self { inner }
    }
}

impl PublicKey {
    /// Parse from compressed bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::PublicKey::from_slice(slice)?,
        })
    }

    /// Parse from a 66-character hex string (33 compressed bytes).
    pub fn from_hex<S: AsRef<str>>(hex: S) -> Result<Self, Error> {
        let hex: &str = hex.as_ref();
        if hex.len() != 33 * 2 {
            return Err(Error::InvalidPublicKeySize {
                expected: 33,
                found: hex.len() / 2,
            });
        }
        Ok(Self {
            inner: secp256k1::PublicKey::from_str(hex)?,
        })
    }

    /// Compressed 33-byte encoding.
    pub fn to_bytes(&self) -> [u8; 33] {
        self.inner.serialize()
    }

    /// Hex-encoded compressed key.
    pub fn to_hex(&self) -> String {
        self.inner.to_string()
    }

    /// `self + rhs`.
    pub fn combine(&self, rhs: &PublicKey) -> Result<PublicKey, Error> {
        Ok(self.inner.combine(&rhs.inner)?.into())
    }

    /// Scalar multiplication `scalar * self`.
    pub fn mul_tweak(&self, scalar: &Scalar) -> Result<PublicKey, Error> {
        Ok(self.inner.mul_tweak(SECP256K1, scalar)?.into())
    }

    /// Point negation.
    pub fn negate(&self) -> PublicKey {
        self.inner.negate(SECP256K1).into()
    }

    /// Whether the 33-byte encoding starts with a valid compressed prefix
    /// (0x02 or 0x03) -- always true for a successfully parsed key, exposed
    /// for keyset-response validation that inspects raw wire bytes/hex first.
    pub fn has_valid_prefix(bytes: &[u8]) -> bool {
        bytes.len() == 33 && (bytes[0] == 0x02 || bytes[0] == 0x03)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hex)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Self::from_hex(s).map_err(serde::de::Error::custom)
    }
}

/// A secp256k1 secret scalar, used as a blinding factor `r` or a wallet privkey.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: secp256k1::SecretKey,
}

impl Deref for SecretKey {
    type Target = secp256k1::SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<secp256k1::SecretKey> for SecretKey {
    fn from(inner: secp256k1::SecretKey) -> Self {
        Self { inner }
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("inner", &"[REDACTED]")
            .finish()
    }
}

impl SecretKey {
    /// Parse from raw bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::SecretKey::from_slice(slice)?,
        })
    }

    /// Parse from a hex string.
    pub fn from_hex<S: AsRef<str>>(hex: S) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::SecretKey::from_str(hex.as_ref())?,
        })
    }

    /// Draw a fresh random secret key.
    pub fn generate() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut OsRng);
        Self { inner: secret_key }
    }

    /// Hex-encoded secret bytes.
    pub fn to_secret_hex(&self) -> String {
        self.inner.display_secret().to_string()
    }

    /// Raw 32 secret bytes.
    pub fn to_secret_bytes(&self) -> [u8; 32] {
        self.inner.secret_bytes()
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        self.inner.public_key(SECP256K1).into()
    }

    /// As a [`Scalar`] for point-multiplication.
    pub fn as_scalar(&self) -> Scalar {
        Scalar::from(self.inner)
    }

    /// ECDH shared x-coordinate with `their_pubkey`, as used to derive the
    /// NIP-44 conversation key.
    pub fn shared_secret_x(&self, their_pubkey: &PublicKey) -> [u8; 32] {
        let shared = secp256k1::ecdh::shared_secret_point(&their_pubkey.inner, &self.inner);
        let mut x = [0u8; 32];
        x.copy_from_slice(&shared[0..32]);
        x
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for SecretKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_secret_hex())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Self::from_hex(s).map_err(serde::de::Error::custom)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.inner.non_secure_erase();
    }
}

/// Amount -> pubkey map for one keyset, as returned by `GET /v1/keys`.
pub type Keys = BTreeMap<u64, PublicKey>;

/// One version byte (always 0x00 today) + 7 hash bytes, rendered as 16 hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeysetId {
    version: u8,
    id: [u8; 7],
}

impl KeysetId {
    /// Derive a keyset id from its amount->pubkey map per NUT-02:
    /// sort by ascending amount, concatenate compressed pubkeys, SHA-256,
    /// take the first 7 bytes, prefix with the version byte.
    pub fn derive(keys: &Keys) -> Self {
        let pubkeys_concat: Vec<u8> = keys
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = Sha256Hash::hash(&pubkeys_concat).to_byte_array();
        let mut id = [0u8; 7];
        id.copy_from_slice(&hash[0..7]);
        Self { version: 0x00, id }
    }

    /// 8-byte wire encoding (version byte + 7 hash bytes).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = self.version;
        out[1..].copy_from_slice(&self.id);
        out
    }

    /// Parse from the 8-byte wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 8 {
            return Err(Error::InvalidKeyset("keyset id must be 8 bytes".into()));
        }
        let mut id = [0u8; 7];
        id.copy_from_slice(&bytes[1..]);
        Ok(Self {
            version: bytes[0],
            id,
        })
    }
}

impl fmt::Display for KeysetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{}", self.version, hex::encode(self.id))
    }
}

impl FromStr for KeysetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(Error::InvalidKeyset(format!(
                "expected 16 hex chars, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for KeysetId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeysetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Small hex helper so we don't pull in a whole utility crate for two functions.
pub mod hex {
    /// Encode bytes as lowercase hex.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string into bytes.
    pub fn decode(s: impl AsRef<str>) -> Result<Vec<u8>, std::num::ParseIntError> {
        let s = s.as_ref();
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16))
            .collect()
    }
}

/// Standard NUT-00 currency units, plus stablecoins commonly quoted by mints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CurrencyUnit {
    /// Bitcoin.
    Btc,
    /// Satoshi (1e-8 BTC); the conventional default unit for Cashu mints.
    Sat,
    /// Millisatoshi (1e-11 BTC).
    Msat,
    /// US Dollar.
    Usd,
    /// Euro.
    Eur,
    /// Authentication-only tokens (NUT-22).
    Auth,
    /// Any other unit string a mint may quote, preserved verbatim.
    Custom(String),
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyUnit::Btc => write!(f, "btc"),
            CurrencyUnit::Sat => write!(f, "sat"),
            CurrencyUnit::Msat => write!(f, "msat"),
            CurrencyUnit::Usd => write!(f, "usd"),
            CurrencyUnit::Eur => write!(f, "eur"),
            CurrencyUnit::Auth => write!(f, "auth"),
            CurrencyUnit::Custom(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for CurrencyUnit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "btc" => CurrencyUnit::Btc,
            "sat" => CurrencyUnit::Sat,
            "msat" => CurrencyUnit::Msat,
            "usd" => CurrencyUnit::Usd,
            "eur" => CurrencyUnit::Eur,
            "auth" => CurrencyUnit::Auth,
            other => CurrencyUnit::Custom(other.to_string()),
        })
    }
}

impl Serialize for CurrencyUnit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CurrencyUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s).unwrap_or(CurrencyUnit::Custom(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT_KEYSET_ID: &str = "00456a94ab4e1c46";
    const SHORT_KEYSET: &str = r#"
        {
            "1":"03a40f20667ed53513075dc51e715ff2046cad64eb68960632269ba7f0210e38bc",
            "2":"03fd4ce5a16b65576145949e6f99f445f8249fee17c606b688b504a849cdc452de",
            "4":"02648eccfa4c026960966276fa5a4cae46ce0fd432211a4f449bf84f13aa5f8303",
            "8":"02fdfd6796bfeac490cbee12f778f867f0a2c68f6508d17c649759ea0dc3547528"
        }
    "#;

    #[test]
    fn test_keyset_id_derivation() {
        let keys: BTreeMap<String, PublicKey> = serde_json::from_str(SHORT_KEYSET).unwrap();
        let keys: Keys = keys
            .into_iter()
            .map(|(amt, pk)| (amt.parse::<u64>().unwrap(), pk))
            .collect();

        let id = KeysetId::derive(&keys);
        assert_eq!(id, KeysetId::from_str(SHORT_KEYSET_ID).unwrap());
        assert_eq!(id.to_string(), SHORT_KEYSET_ID);
    }

    #[test]
    fn test_keyset_id_roundtrip_bytes() {
        let id = KeysetId::from_str("009a1f293253e41e").unwrap();
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(KeysetId::from_bytes(&bytes).unwrap(), id);
    }

    #[test]
    fn test_public_key_from_hex() {
        assert!(PublicKey::from_hex(
            "02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104"
        )
        .is_ok());
    }
}
