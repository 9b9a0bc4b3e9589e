//! Proofs and blinded messages: the spendable atoms of value and the
//! pre-mint intents that become them.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::keys::{CurrencyUnit, KeysetId, PublicKey, SecretKey};
use crate::mint_url::MintUrl;
use crate::secret::Secret;

/// A spendable e-cash token atom. Uniquely identified by `(secret, c)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Amount, in the keyset's unit.
    pub amount: Amount,
    /// The keyset this proof was signed under.
    pub keyset_id: KeysetId,
    /// The secret blinded and signed by the mint.
    pub secret: Secret,
    /// The mint's unblinded signature over `hash_to_curve(secret)`.
    pub c: PublicKey,
    /// The mint this proof is redeemable at.
    pub mint_url: MintUrl,
    /// The unit this proof is denominated in.
    pub unit: CurrencyUnit,
}

impl Proof {
    /// `secret:C`, the identifier used by the spent-proof cache and NUT-07 state checks.
    pub fn id(&self) -> String {
        format!("{}:{}", self.secret.as_str(), self.c.to_hex())
    }
}

/// A bag of proofs, as carried inside a token or passed to `mint.swap`.
pub type Proofs = Vec<Proof>;

/// A not-yet-signed request for a blind signature: `amount`, `keyset_id`, `B'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedMessage {
    /// Requested amount.
    pub amount: Amount,
    /// Keyset to sign under.
    #[serde(rename = "id")]
    pub keyset_id: KeysetId,
    /// Blinded point `B' = Y + rG`.
    #[serde(rename = "B_")]
    pub b: PublicKey,
}

/// The blinding factor paired with the request that produced it, held only
/// until the mint's signature is unblinded (or until a `restore` recovers it).
#[derive(Debug, Clone)]
pub struct PendingBlindedMessage {
    /// The request sent to the mint.
    pub message: BlindedMessage,
    /// The scalar `r` used to blind it.
    pub r: SecretKey,
    /// The secret whose hash-to-curve point was blinded.
    pub secret: Secret,
}

/// The mint's response to a [`BlindedMessage`]: `C' = k*B'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedSignature {
    /// Amount signed for.
    pub amount: Amount,
    /// Keyset the signature was produced under.
    #[serde(rename = "id")]
    pub keyset_id: KeysetId,
    /// Signed point `C'`.
    #[serde(rename = "C_")]
    pub c: PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_proof_id_is_secret_colon_c() {
        let proof = Proof {
            amount: Amount::from_sat(4),
            keyset_id: KeysetId::from_str("009a1f293253e41e").unwrap(),
            secret: Secret::from("abc".to_string()),
            c: PublicKey::from_hex(
                "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
            )
            .unwrap(),
            mint_url: MintUrl::from_str("https://mint.example.com").unwrap(),
            unit: CurrencyUnit::Sat,
        };
        assert_eq!(
            proof.id(),
            "abc:02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea"
        );
    }
}
