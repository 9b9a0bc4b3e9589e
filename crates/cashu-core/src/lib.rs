#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
//! Cryptographic primitives, NUT-00 token codecs and NIP-44 encryption shared
//! by the NIP-60 wallet: BDHKE blind signatures, keyset ids, and the
//! `cashuA…`/`cashuB…` wire formats.

pub mod amount;
pub mod dhke;
pub mod error;
pub mod keys;
pub mod mint_url;
pub mod nip44;
pub mod proof;
pub mod secret;
pub mod token;

pub use self::amount::Amount;
pub use self::error::Error;
pub use self::keys::{CurrencyUnit, Keys, KeysetId, PublicKey, SecretKey};
pub use self::mint_url::MintUrl;
pub use self::proof::{BlindedMessage, BlindedSignature, PendingBlindedMessage, Proof, Proofs};
pub use self::secret::Secret;
pub use self::token::{ProofV3, ProofV4, Token, TokenV3, TokenV4};
