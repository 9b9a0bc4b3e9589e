//! Blind Diffie-Hellman key exchange: hash-to-curve, blinding and unblinding.

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;

use crate::error::Error;
use crate::keys::{PublicKey, SecretKey};

/// Maximum number of counter increments before giving up; exceeding this is
/// probabilistically unreachable (roughly 1 in 2^1000 messages).
const MAX_ITERATIONS: u32 = 1000;

/// Map an arbitrary message to a point on secp256k1.
///
/// Hashes `message || counter` (counter little-endian u32, starting at zero)
/// and interprets the resulting digest as a scalar; the scalar's public point
/// is returned on the first counter for which the digest is a valid secp256k1
/// private key. The counter is incremented on failure.
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let mut counter: u32 = 0;
    while counter < MAX_ITERATIONS {
        let mut bytes_to_hash = Vec::with_capacity(message.len() + 4);
        bytes_to_hash.extend_from_slice(message);
        bytes_to_hash.extend_from_slice(&counter.to_le_bytes());
        let digest: [u8; 32] = Sha256Hash::hash(&bytes_to_hash).to_byte_array();

        if let Ok(candidate) = SecretKey::from_slice(&digest) {
            return Ok(candidate.public_key());
        }
        counter += 1;
    }

    Err(Error::NoValidPoint)
}

/// Blind a secret for the mint: `Y = hash_to_curve(secret)`, `B' = Y + rG`.
///
/// Returns `(B', r)`. If `r` is not supplied a fresh random blinding factor is drawn.
pub fn blind(secret_bytes: &[u8], r: Option<SecretKey>) -> Result<(PublicKey, SecretKey), Error> {
    let y = hash_to_curve(secret_bytes)?;
    let r = r.unwrap_or_else(SecretKey::generate);
    let b_prime = y.combine(&r.public_key())?;
    Ok((b_prime, r))
}

/// Unblind a mint's signature: `C = C' - rK = C' + (-r*K)`.
pub fn unblind(blinded_signature: &PublicKey, r: &SecretKey, mint_pubkey: &PublicKey) -> Result<PublicKey, Error> {
    let r_scalar = r.as_scalar();
    let r_k = mint_pubkey.mul_tweak(&r_scalar)?;
    let neg_r_k = r_k.negate();
    blinded_signature.combine(&neg_r_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::hex;

    #[test]
    fn test_blind_unblind_roundtrip() {
        let secret = b"test secret message";
        let mint_sk = SecretKey::generate();
        let mint_pk = mint_sk.public_key();

        let (blinded, r) = blind(secret, None).unwrap();
        // mint "signs": C_ = k * B_
        let signed = blinded.mul_tweak(&mint_sk.as_scalar()).unwrap();
        let unblinded = unblind(&signed, &r, &mint_pk).unwrap();

        // unblinded must equal k * hash_to_curve(secret)
        let y = hash_to_curve(secret).unwrap();
        let expected = y.mul_tweak(&mint_sk.as_scalar()).unwrap();
        assert_eq!(unblinded, expected);
    }

    #[test]
    fn test_hash_to_curve_deterministic() {
        let a = hash_to_curve(&hex::decode("00").unwrap()).unwrap();
        let b = hash_to_curve(&hex::decode("00").unwrap()).unwrap();
        assert_eq!(a, b);

        let c = hash_to_curve(&hex::decode("01").unwrap()).unwrap();
        assert_ne!(a, c);
    }
}
