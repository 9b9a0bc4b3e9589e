//! Wire types for the mint's HTTP API (NUT-01 through NUT-09).

use cashu_core::{Amount, BlindedMessage, BlindedSignature, CurrencyUnit, Keys, KeysetId, PublicKey};
use serde::{Deserialize, Serialize};

/// `GET /v1/keys` entry: one keyset's amount->pubkey map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    /// Keyset id.
    pub id: KeysetId,
    /// Currency unit.
    pub unit: CurrencyUnit,
    /// Amount -> public key.
    pub keys: Keys,
}

/// `GET /v1/keys` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keysets returned.
    pub keysets: Vec<KeySet>,
}

/// One entry of `GET /v1/keysets`: metadata without the actual keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetInfo {
    /// Keyset id.
    pub id: KeysetId,
    /// Currency unit.
    pub unit: CurrencyUnit,
    /// Whether the mint is still signing under this keyset.
    pub active: bool,
    /// Input fee rate, parts per thousand.
    #[serde(default, rename = "input_fee_ppk")]
    pub input_fee_ppk: u64,
}

/// `GET /v1/keysets` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Keyset metadata entries.
    pub keysets: Vec<KeysetInfo>,
}

/// `GET /v1/info` response body (only the fields this wallet relies on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintInfo {
    /// Mint's display name.
    pub name: Option<String>,
    /// Implementation version string.
    pub version: Option<String>,
}

/// Lifecycle state of a mint quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    /// Invoice not yet paid.
    Unpaid,
    /// Invoice paid, proofs not yet minted.
    Paid,
    /// Proofs already minted for this quote.
    Issued,
}

/// `POST /v1/mint/quote/bolt11` request body.
#[derive(Debug, Clone, Serialize)]
pub struct MintQuoteRequest {
    /// Requested amount.
    pub amount: Amount,
    /// Requested unit.
    pub unit: CurrencyUnit,
    /// Optional human-readable description shown on the invoice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `POST /v1/mint/quote/bolt11` and `GET /v1/mint/quote/bolt11/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintQuoteResponse {
    /// Quote identifier.
    pub quote: String,
    /// BOLT-11 payment request.
    pub request: String,
    /// Quote lifecycle state.
    pub state: MintQuoteState,
    /// Unix timestamp after which the quote is no longer payable.
    pub expiry: Option<u64>,
}

/// `POST /v1/mint/bolt11` request body.
#[derive(Debug, Clone, Serialize)]
pub struct MintRequest {
    /// Quote to redeem.
    pub quote: String,
    /// Blinded outputs to sign.
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/mint/bolt11` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintResponse {
    /// Blind signatures, one per requested output, in order.
    pub signatures: Vec<BlindedSignature>,
}

/// `POST /v1/melt/quote/bolt11` request body.
#[derive(Debug, Clone, Serialize)]
pub struct MeltQuoteRequest {
    /// Unit the invoice amount is denominated in.
    pub unit: CurrencyUnit,
    /// BOLT-11 invoice to pay.
    pub request: String,
}

/// Lifecycle state of a melt quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeltQuoteState {
    /// Not yet paid.
    Unpaid,
    /// Payment in flight.
    Pending,
    /// Payment confirmed.
    Paid,
}

/// `POST /v1/melt/quote/bolt11` and `GET /v1/melt/quote/bolt11/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeltQuoteResponse {
    /// Quote identifier.
    pub quote: String,
    /// Invoice amount, excluding fees.
    pub amount: Amount,
    /// Lightning routing fee reserve the mint will hold back.
    pub fee_reserve: Amount,
    /// Lifecycle state.
    pub state: MeltQuoteState,
    /// Unix expiry timestamp.
    pub expiry: Option<u64>,
    /// Preimage, present once `state == Paid`.
    pub payment_preimage: Option<String>,
    /// Change signatures returned when the mint overestimated its fee reserve.
    #[serde(default)]
    pub change: Vec<BlindedSignature>,
}

/// `POST /v1/melt/bolt11` request body.
#[derive(Debug, Clone, Serialize)]
pub struct MeltRequest {
    /// Quote to settle.
    pub quote: String,
    /// Proofs to burn.
    pub inputs: Vec<WireProof>,
    /// Blank outputs for NUT-08 fee-overpayment change.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/swap` request body.
#[derive(Debug, Clone, Serialize)]
pub struct SwapRequest {
    /// Proofs to burn.
    pub inputs: Vec<WireProof>,
    /// Blinded outputs to sign in exchange.
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/swap` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResponse {
    /// Blind signatures, one per requested output, in order.
    pub signatures: Vec<BlindedSignature>,
}

/// A proof as sent to the mint: keyset id, amount, secret and `C` as hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireProof {
    /// Amount.
    pub amount: Amount,
    /// Keyset id.
    pub id: KeysetId,
    /// Secret, hex-normalized.
    pub secret: String,
    /// Unblinded signature, hex.
    #[serde(rename = "C")]
    pub c: PublicKey,
}

impl From<&cashu_core::Proof> for WireProof {
    fn from(proof: &cashu_core::Proof) -> Self {
        Self {
            amount: proof.amount,
            id: proof.keyset_id,
            secret: proof
                .secret
                .to_hex_normalized()
                .unwrap_or_else(|_| proof.secret.as_str().to_string()),
            c: proof.c,
        }
    }
}

/// `POST /v1/checkstate` request body: the `Y` values to query.
#[derive(Debug, Clone, Serialize)]
pub struct CheckStateRequest {
    /// Compressed-hex `Y` points, one per proof.
    #[serde(rename = "Ys")]
    pub ys: Vec<String>,
}

/// State of a single proof, per NUT-07.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofState {
    /// Not yet spent.
    Unspent,
    /// Already spent.
    Spent,
    /// A spend is in flight (e.g. a melt awaiting Lightning settlement).
    Pending,
}

/// One entry of a `POST /v1/checkstate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStateEntry {
    /// The `Y` value this state corresponds to.
    #[serde(rename = "Y")]
    pub y: String,
    /// State.
    pub state: ProofState,
}

/// `POST /v1/checkstate` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// States, in the same order as the request's `Ys`.
    pub states: Vec<ProofStateEntry>,
}

/// `POST /v1/restore` request body.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreRequest {
    /// The blinded outputs to look up.
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/restore` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResponse {
    /// Outputs the mint recognized.
    pub outputs: Vec<BlindedMessage>,
    /// Signatures for those outputs, same order.
    pub signatures: Vec<BlindedSignature>,
}
