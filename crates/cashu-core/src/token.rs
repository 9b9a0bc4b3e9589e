//! Cashu token encoding: V3 (`cashuA…`, base64url JSON) and V4 (`cashuB…`,
//! base64url CBOR), plus the conversions between them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::{general_purpose, GeneralPurpose};
use bitcoin::base64::{alphabet, Engine as _};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::Error;
use crate::keys::{CurrencyUnit, KeysetId, PublicKey};
use crate::mint_url::MintUrl;
use crate::proof::{Proof, Proofs};
use crate::secret::Secret;

fn decode_base64url_indifferent(s: &str) -> Result<Vec<u8>, Error> {
    let decode_config = general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(bitcoin::base64::engine::DecodePaddingMode::Indifferent);
    GeneralPurpose::new(&alphabet::URL_SAFE, decode_config)
        .decode(s)
        .map_err(|e| Error::InvalidBase64(e.to_string()))
}

fn encode_base64url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE.encode(bytes)
}

fn unique_count(proofs: &[Proof]) -> usize {
    proofs
        .iter()
        .map(|p| (p.secret.as_str().to_string(), p.c.to_hex()))
        .collect::<std::collections::HashSet<_>>()
        .len()
}

fn sum_checked(proofs: &[Proof]) -> Result<Amount, Error> {
    if unique_count(proofs) != proofs.len() {
        return Err(Error::DuplicateProofs);
    }
    Ok(proofs.iter().map(|p| p.amount).sum())
}

/// A parsed Cashu token, either on-wire version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `cashuA…`
    V3(TokenV3),
    /// `cashuB…`
    V4(TokenV4),
}

impl Token {
    /// Build a token from a flat proof list, grouping by keyset for the V4 wire format.
    pub fn new(mint_url: MintUrl, proofs: Proofs, memo: Option<String>, unit: CurrencyUnit) -> Self {
        let grouped = proofs.into_iter().fold(HashMap::new(), |mut acc, proof| {
            acc.entry(proof.keyset_id)
                .or_insert_with(Vec::new)
                .push(proof);
            acc
        });
        let token = grouped
            .into_iter()
            .map(|(keyset_id, proofs)| TokenV4Token {
                keyset_id,
                proofs: proofs.into_iter().map(ProofV4::from).collect(),
            })
            .collect();

        Token::V4(TokenV4 {
            mint_url,
            unit,
            memo,
            token,
        })
    }

    /// Reconstruct domain-level [`Proof`]s, filling in the mint url and unit.
    pub fn proofs(&self) -> Proofs {
        match self {
            Token::V3(t) => t.proofs(),
            Token::V4(t) => t.proofs(),
        }
    }

    /// Total value, erroring if the token contains a duplicate `(secret, C)` pair.
    pub fn value(&self) -> Result<Amount, Error> {
        sum_checked(&self.proofs())
    }

    /// Memo, if any.
    pub fn memo(&self) -> Option<&str> {
        match self {
            Token::V3(t) => t.memo.as_deref(),
            Token::V4(t) => t.memo.as_deref(),
        }
    }

    /// Unit, if known. A V3 token without a `unit` field has none.
    pub fn unit(&self) -> Option<CurrencyUnit> {
        match self {
            Token::V3(t) => t.unit.clone(),
            Token::V4(t) => Some(t.unit.clone()),
        }
    }

    /// Mint URL. A multi-mint V3 token (unsupported by this wallet) is rejected.
    pub fn mint_url(&self) -> Result<MintUrl, Error> {
        match self {
            Token::V3(t) => {
                if t.token.len() != 1 {
                    return Err(Error::UnsupportedToken);
                }
                Ok(t.token[0].mint.clone())
            }
            Token::V4(t) => Ok(t.mint_url.clone()),
        }
    }

    /// Re-serialize as a V3 (`cashuA…`) string, downgrading a V4 token if needed.
    pub fn to_v3_string(&self) -> Result<String, Error> {
        let v3 = match self {
            Token::V3(t) => t.clone(),
            Token::V4(t) => TokenV3::try_from(t.clone())?,
        };
        Ok(v3.to_string())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::V3(t) => write!(f, "{t}"),
            Token::V4(t) => write!(f, "{t}"),
        }
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("cashuA") {
            let decoded = decode_base64url_indifferent(rest)?;
            let decoded_str =
                String::from_utf8(decoded).map_err(|e| Error::InvalidBase64(e.to_string()))?;
            Ok(Token::V3(serde_json::from_str(&decoded_str)?))
        } else if let Some(rest) = s.strip_prefix("cashuB") {
            let decoded = decode_base64url_indifferent(rest)?;
            let token: TokenV4 = ciborium::from_reader(&decoded[..])
                .map_err(|e| Error::InvalidCbor(e.to_string()))?;
            Ok(Token::V4(token))
        } else {
            Err(Error::InvalidPrefix)
        }
    }
}

/// One mint's proofs within a V3 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV3Token {
    /// Mint this group of proofs belongs to.
    pub mint: MintUrl,
    /// Proofs, in wire form.
    pub proofs: Vec<ProofV3>,
}

/// `cashuA…` token body: `{ token: [{mint, proofs}], memo?, unit? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV3 {
    /// Proof groups, one per mint (this wallet only reconstructs single-mint tokens).
    pub token: Vec<TokenV3Token>,
    /// Optional memo. Round-trip is not guaranteed across versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Optional unit; absent on very old tokens, treated as unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<CurrencyUnit>,
}

impl TokenV3 {
    /// Build a single-mint V3 token.
    pub fn new(
        mint_url: MintUrl,
        proofs: Proofs,
        memo: Option<String>,
        unit: Option<CurrencyUnit>,
    ) -> Result<Self, Error> {
        if proofs.is_empty() {
            return Err(Error::ProofsRequired);
        }
        Ok(Self {
            token: vec![TokenV3Token {
                mint: mint_url,
                proofs: proofs.into_iter().map(ProofV3::from).collect(),
            }],
            memo,
            unit,
        })
    }

    fn proofs(&self) -> Proofs {
        let unit = self.unit.clone().unwrap_or(CurrencyUnit::Sat);
        self.token
            .iter()
            .flat_map(|t| {
                t.proofs
                    .iter()
                    .map(move |p| p.clone().into_proof(t.mint.clone(), unit.clone()))
            })
            .collect()
    }

    /// Whether this token spans more than one mint (unsupported by this wallet).
    pub fn is_multi_mint(&self) -> bool {
        self.token.len() > 1
    }
}

impl FromStr for TokenV3 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("cashuA").ok_or(Error::InvalidPrefix)?;
        let decoded = decode_base64url_indifferent(rest)?;
        let decoded_str =
            String::from_utf8(decoded).map_err(|e| Error::InvalidBase64(e.to_string()))?;
        Ok(serde_json::from_str(&decoded_str)?)
    }
}

impl fmt::Display for TokenV3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "cashuA{}", encode_base64url(json.as_bytes()))
    }
}

impl TryFrom<TokenV4> for TokenV3 {
    type Error = Error;

    fn try_from(token: TokenV4) -> Result<Self, Self::Error> {
        let proofs: Vec<ProofV3> = token
            .token
            .into_iter()
            .flat_map(|group| {
                let keyset_id = group.keyset_id;
                group.proofs.into_iter().map(move |p| ProofV3 {
                    amount: p.amount,
                    id: keyset_id,
                    secret: p.secret,
                    c: p.c,
                })
            })
            .collect();

        Ok(TokenV3 {
            token: vec![TokenV3Token {
                mint: token.mint_url,
                proofs,
            }],
            memo: token.memo,
            unit: Some(token.unit),
        })
    }
}

/// A V3 proof, as it appears on the wire: amounts and secrets as plain hex/decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofV3 {
    /// Amount.
    pub amount: Amount,
    /// Keyset id.
    pub id: KeysetId,
    /// Secret, hex-normalized on the wire.
    pub secret: Secret,
    /// Unblinded signature.
    #[serde(rename = "C")]
    pub c: PublicKey,
}

impl ProofV3 {
    fn into_proof(self, mint_url: MintUrl, unit: CurrencyUnit) -> Proof {
        Proof {
            amount: self.amount,
            keyset_id: self.id,
            secret: self.secret,
            c: self.c,
            mint_url,
            unit,
        }
    }
}

impl From<Proof> for ProofV3 {
    fn from(proof: Proof) -> Self {
        Self {
            amount: proof.amount,
            id: proof.keyset_id,
            secret: proof.secret,
            c: proof.c,
        }
    }
}

/// `cashuB…` token body, CBOR with single-letter keys to keep the encoding compact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV4 {
    /// Mint url.
    #[serde(rename = "m")]
    pub mint_url: MintUrl,
    /// Unit.
    #[serde(rename = "u")]
    pub unit: CurrencyUnit,
    /// Memo.
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Proofs, grouped by keyset id.
    #[serde(rename = "t")]
    pub token: Vec<TokenV4Token>,
}

impl TokenV4 {
    fn proofs(&self) -> Proofs {
        self.token
            .iter()
            .flat_map(|t| {
                let keyset_id = t.keyset_id;
                let mint_url = self.mint_url.clone();
                let unit = self.unit.clone();
                t.proofs
                    .iter()
                    .map(move |p| p.clone().into_proof(keyset_id, mint_url.clone(), unit.clone()))
            })
            .collect()
    }
}

impl fmt::Display for TokenV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data).map_err(|_| fmt::Error)?;
        write!(f, "cashuB{}", encode_base64url(&data))
    }
}

impl FromStr for TokenV4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("cashuB").ok_or(Error::InvalidPrefix)?;
        let decoded = decode_base64url_indifferent(rest)?;
        ciborium::from_reader(&decoded[..]).map_err(|e| Error::InvalidCbor(e.to_string()))
    }
}

/// One keyset's proofs within a V4 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenV4Token {
    /// Keyset id, CBOR-encoded as its raw 8 bytes.
    #[serde(
        rename = "i",
        serialize_with = "serialize_keyset_id_bytes",
        deserialize_with = "deserialize_keyset_id_bytes"
    )]
    pub keyset_id: KeysetId,
    /// Proofs under this keyset.
    #[serde(rename = "p")]
    pub proofs: Vec<ProofV4>,
}

fn serialize_keyset_id_bytes<S: serde::Serializer>(
    id: &KeysetId,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(&id.to_bytes())
}

fn deserialize_keyset_id_bytes<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<KeysetId, D::Error> {
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    KeysetId::from_bytes(&bytes).map_err(serde::de::Error::custom)
}

/// A V4 proof: amount, secret (still hex on the wire), and `C` as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofV4 {
    /// Amount.
    #[serde(rename = "a")]
    pub amount: Amount,
    /// Secret.
    #[serde(rename = "s")]
    pub secret: Secret,
    /// Unblinded signature, raw compressed bytes.
    #[serde(
        rename = "c",
        serialize_with = "serialize_pubkey_bytes",
        deserialize_with = "deserialize_pubkey_bytes"
    )]
    pub c: PublicKey,
}

fn serialize_pubkey_bytes<S: serde::Serializer>(
    key: &PublicKey,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(&key.to_bytes())
}

fn deserialize_pubkey_bytes<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<PublicKey, D::Error> {
    let bytes = Vec::<u8>::deserialize(deserializer)?;
    PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
}

impl ProofV4 {
    fn into_proof(self, keyset_id: KeysetId, mint_url: MintUrl, unit: CurrencyUnit) -> Proof {
        Proof {
            amount: self.amount,
            keyset_id,
            secret: self.secret,
            c: self.c,
            mint_url,
            unit,
        }
    }
}

impl From<Proof> for ProofV4 {
    fn from(proof: Proof) -> Self {
        Self {
            amount: proof.amount,
            secret: proof.secret,
            c: proof.c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proof(keyset_id: &str, amount: u64, secret: &str, c: &str) -> Proof {
        Proof {
            amount: Amount::from_sat(amount),
            keyset_id: KeysetId::from_str(keyset_id).unwrap(),
            secret: Secret::from(secret.to_string()),
            c: PublicKey::from_hex(c).unwrap(),
            mint_url: MintUrl::from_str("https://8333.space:3338").unwrap(),
            unit: CurrencyUnit::Sat,
        }
    }

    #[test]
    fn test_token_v3_str_round_trip() {
        let proofs = vec![
            sample_proof(
                "009a1f293253e41e",
                2,
                "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
                "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
            ),
            sample_proof(
                "009a1f293253e41e",
                8,
                "fe15109314e61d7756b0f8ee0f23a624acaa3f4e042f61433c728c7057b931be",
                "029e8e5050b890a7d6c0968db16bc1d5d5fa040ea1de284f6ec69d61299f671059",
            ),
        ];
        let token = TokenV3::new(
            MintUrl::from_str("https://8333.space:3338").unwrap(),
            proofs,
            Some("thanks".into()),
            Some(CurrencyUnit::Sat),
        )
        .unwrap();

        let encoded = token.to_string();
        assert!(encoded.starts_with("cashuA"));
        let decoded = TokenV3::from_str(&encoded).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_token_padding_indifferent() {
        let proofs = vec![sample_proof(
            "009a1f293253e41e",
            2,
            "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
            "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
        )];
        let token = TokenV3::new(
            MintUrl::from_str("https://8333.space:3338").unwrap(),
            proofs,
            None,
            Some(CurrencyUnit::Sat),
        )
        .unwrap();
        let padded = token.to_string();
        let unpadded = padded.trim_end_matches('=').to_string();
        assert_ne!(padded, unpadded);
        assert_eq!(TokenV3::from_str(&unpadded).unwrap(), token);
    }

    #[test]
    fn test_token_v4_round_trip_through_new() {
        let proofs = vec![
            sample_proof(
                "009a1f293253e41e",
                1,
                "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
                "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
            ),
            sample_proof(
                "00ad268c4d1f5826",
                4,
                "fe15109314e61d7756b0f8ee0f23a624acaa3f4e042f61433c728c7057b931be",
                "029e8e5050b890a7d6c0968db16bc1d5d5fa040ea1de284f6ec69d61299f671059",
            ),
        ];
        let token = Token::new(
            MintUrl::from_str("http://localhost:3338").unwrap(),
            proofs,
            Some("thank you".into()),
            CurrencyUnit::Sat,
        );
        assert_eq!(token.value().unwrap(), Amount::from_sat(5));

        let encoded = token.to_string();
        assert!(encoded.starts_with("cashuB"));
        let decoded = Token::from_str(&encoded).unwrap();
        assert_eq!(decoded.value().unwrap(), Amount::from_sat(5));
        assert_eq!(decoded.memo(), Some("thank you"));

        // Two distinct keyset groups survive the round trip.
        if let Token::V4(t) = decoded {
            assert_eq!(t.token.len(), 2);
        } else {
            panic!("expected a V4 token");
        }
    }

    #[test]
    fn test_duplicate_proofs_rejected() {
        let proof = sample_proof(
            "009a1f293253e41e",
            10,
            "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
            "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
        );
        let token = Token::new(
            MintUrl::from_str("https://example.com").unwrap(),
            vec![proof.clone(), proof],
            None,
            CurrencyUnit::Sat,
        );
        assert!(matches!(token.value(), Err(Error::DuplicateProofs)));
    }

    #[test]
    fn test_to_v3_string_from_v4() {
        let proofs = vec![sample_proof(
            "009a1f293253e41e",
            2,
            "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
            "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea",
        )];
        let token = Token::new(
            MintUrl::from_str("https://8333.space:3338").unwrap(),
            proofs,
            None,
            CurrencyUnit::Sat,
        );
        let v3 = token.to_v3_string().unwrap();
        assert!(v3.starts_with("cashuA"));
        let parsed = Token::from_str(&v3).unwrap();
        assert_eq!(parsed.value().unwrap(), Amount::from_sat(2));
    }

    #[test]
    fn test_incorrect_prefix_rejected() {
        assert!(matches!(
            Token::from_str("casshuAeyJ0b2tlbiI6W119"),
            Err(Error::InvalidPrefix)
        ));
        assert!(matches!(
            Token::from_str("eyJ0b2tlbiI6W119"),
            Err(Error::InvalidPrefix)
        ));
    }
}
