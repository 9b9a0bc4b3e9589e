//! Wallet-engine error taxonomy.

use thiserror::Error;

/// Errors surfaced by the mint client, relay pool, event manager and wallet engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A crypto or codec primitive rejected its input.
    #[error(transparent)]
    Core(#[from] cashu_core::Error),
    /// The wallet does not hold enough unspent value to satisfy the request.
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount required.
        needed: u64,
        /// Amount actually available.
        available: u64,
    },
    /// A proof selection could not satisfy the requested amount from one mint.
    #[error("insufficient proofs at mint")]
    InsufficientProofs,
    /// A token string failed to parse or referenced unsupported structure.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The mint returned a non-2xx HTTP response.
    #[error("mint http error {status}: {body}")]
    MintHttp {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the caller if large.
        body: String,
    },
    /// A transport-level failure talking to a mint.
    #[error("network error: {0}")]
    Network(String),
    /// A relay WebSocket connection did not complete its handshake in time.
    #[error("relay connection timed out")]
    ConnectionTimeout,
    /// A relay did not send `OK` for a published event in time.
    #[error("relay publish timed out")]
    PublishTimeout,
    /// A proof was already spent, per a mint state check or swap rejection.
    #[error("proof already spent")]
    AlreadySpent,
    /// A mint quote expired before it could be redeemed.
    #[error("quote expired")]
    QuoteExpired,
    /// A Lightning payment failed at the mint.
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    /// The mint rejected an otherwise well-formed operation.
    #[error("mint error: {0}")]
    MintError(String),
    /// A local recovery backup file could not be read or written.
    #[error("backup io error: {0}")]
    Backup(String),
    /// An invariant was violated; indicates a bug rather than bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<nostr_sdk::client::Error> for Error {
    fn from(err: nostr_sdk::client::Error) -> Self {
        Error::Network(err.to_string())
    }
}
