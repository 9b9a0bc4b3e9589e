//! Error types shared across the crypto, codec and keyset primitives.

use thiserror::Error;

/// Errors produced by the cryptographic and codec primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// `hash_to_curve` exhausted its iteration budget without finding a point.
    #[error("no valid curve point found within iteration budget")]
    NoValidPoint,
    /// secp256k1 rejected a key or operation.
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// A public key was not 33 compressed bytes with a 0x02/0x03 prefix.
    #[error("invalid public key: expected {expected} bytes, found {found}")]
    InvalidPublicKeySize {
        /// Expected byte length.
        expected: usize,
        /// Observed byte length.
        found: usize,
    },
    /// Token string did not start with a recognized prefix.
    #[error("invalid token prefix")]
    InvalidPrefix,
    /// Token base64url payload could not be decoded.
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
    /// Token JSON payload (V3) was malformed.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Token CBOR payload (V4) was malformed.
    #[error("invalid cbor: {0}")]
    InvalidCbor(String),
    /// A point encoded on the wire was not a valid compressed secp256k1 point.
    #[error("invalid point")]
    InvalidPoint,
    /// A keyset response failed structural validation.
    #[error("invalid keyset: {0}")]
    InvalidKeyset(String),
    /// A token contained the same proof twice.
    #[error("duplicate proofs in token")]
    DuplicateProofs,
    /// NIP-44 ciphertext HMAC did not match.
    #[error("NIP-44 bad mac")]
    BadMac,
    /// NIP-44 ciphertext version byte was not 0x02.
    #[error("NIP-44 bad version")]
    BadVersion,
    /// NIP-44 declared plaintext length was inconsistent with the padding rule.
    #[error("NIP-44 bad padding")]
    BadPadding,
    /// NIP-44 plaintext length outside the allowed [1, 65535] range.
    #[error("NIP-44 invalid plaintext length: {0}")]
    InvalidPlaintextLength(usize),
    /// Generic invariant violation; indicates a bug rather than bad input.
    #[error("internal error: {0}")]
    Internal(String),
    /// A mint URL failed to parse or normalize.
    #[error("invalid mint url")]
    InvalidMintUrl,
    /// A token carried an unsupported version, multiple mints, or a mixed structure
    /// this crate does not reconstruct.
    #[error("unsupported token")]
    UnsupportedToken,
    /// A V3 token was built with zero proofs.
    #[error("at least one proof is required")]
    ProofsRequired,
    /// A V3 token had no unit and none could be inferred for V4 conversion.
    #[error("token has no unit")]
    UnsupportedUnit,
    /// A token referenced a short keyset id the caller's mint key cache doesn't recognize.
    #[error("unknown keyset id: {0}")]
    UnknownKeysetId(String),
}
