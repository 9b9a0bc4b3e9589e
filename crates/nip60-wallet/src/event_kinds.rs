//! The three NIP-60 event kinds and their decrypted payload shapes.
//!
//! Kind numbers follow the values in the original Python NIP-60 implementation
//! (`sixty_nuts.types.EventKind`), which also match what this wallet's teacher
//! codebase uses for its own Nostr wallet integration: 37375 (replaceable
//! config), 7375 (token store), 7376 (history). An earlier draft of this
//! wallet's own NIP-60 support used 17375 for the config kind; this crate
//! settles on 37375 and treats 17375 as a legacy kind to migrate away from.

use nostr_sdk::Kind;
use serde::{Deserialize, Serialize};

/// Replaceable wallet-configuration event.
pub const WALLET_CONFIG_KIND: Kind = Kind::Custom(37375);
/// A legacy config kind seen in early NIP-60 deployments; present only so a
/// migration can detect and supersede it.
pub const LEGACY_WALLET_CONFIG_KIND: Kind = Kind::Custom(17375);
/// Append-only token-store event.
pub const TOKEN_KIND: Kind = Kind::Custom(7375);
/// Append-only spending-history event.
pub const HISTORY_KIND: Kind = Kind::Custom(7376);

/// Decrypted payload of a [`WALLET_CONFIG_KIND`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfigPayload {
    /// Trusted mint base URLs.
    pub mints: Vec<String>,
    /// Hex-encoded P2PK private key embedded in the wallet config.
    pub privkey: String,
    /// Preferred currency unit, if the owner has set one.
    #[serde(default)]
    pub unit: Option<String>,
}

/// One proof as stored in a token event: secret is base64, matching the
/// event-log storage convention (hex is reserved for the mint wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProof {
    /// Keyset id, 16 hex chars.
    pub id: String,
    /// Amount.
    pub amount: u64,
    /// Secret, base64-encoded.
    pub secret: String,
    /// Unblinded signature, hex.
    #[serde(rename = "C")]
    pub c: String,
    /// Currency unit, defaulting to `"sat"` for proofs stored before this
    /// field existed (matches the original implementation's fallback).
    #[serde(default = "default_proof_unit")]
    pub unit: String,
}

fn default_proof_unit() -> String {
    "sat".to_string()
}

/// Decrypted payload of a [`TOKEN_KIND`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEventPayload {
    /// Mint these proofs belong to.
    pub mint: String,
    /// Proofs, in the event-log storage form.
    pub proofs: Vec<StoredProof>,
    /// Ids of prior token events this one supersedes.
    #[serde(default)]
    pub del: Vec<String>,
}

/// Direction of a [`HistoryEventPayload`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Funds arrived (mint, redeem, transfer-in).
    In,
    /// Funds left (send, melt, transfer-out).
    Out,
}

/// Decrypted payload of a [`HISTORY_KIND`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEventPayload {
    /// Direction of the movement.
    pub direction: Direction,
    /// Amount moved.
    pub amount: u64,
    /// Unit the amount is denominated in.
    pub unit: String,
    /// Token event ids created by this operation.
    #[serde(default)]
    pub created_token_ids: Vec<String>,
    /// Token event ids destroyed (superseded) by this operation.
    #[serde(default)]
    pub destroyed_token_ids: Vec<String>,
}
