//! A stateless Chaumian e-cash wallet engine: Cashu mint protocol client and
//! proof bookkeeping with state stored entirely on NIP-60 Nostr event logs.
//! No proof or balance lives only in process memory; every operation
//! reconstructs its view of the wallet from the relay-backed event log
//! before acting, and republishes the result.

pub mod denominations;
pub mod error;
pub mod event_kinds;
pub mod event_manager;
pub mod mint_client;
pub mod mint_types;
pub mod outbound_queue;
pub mod proof_store;
pub mod recovery;
pub mod relay_client;
pub mod relay_pool;
pub mod spent_cache;
pub mod wallet;

pub use error::Error;
pub use event_kinds::{
    Direction, HistoryEventPayload, StoredProof, TokenEventPayload, WalletConfigPayload,
    HISTORY_KIND, LEGACY_WALLET_CONFIG_KIND, TOKEN_KIND, WALLET_CONFIG_KIND,
};
pub use event_manager::EventManager;
pub use mint_client::MintClient;
pub use proof_store::{StateReconstructor, WalletState, PENDING_EVENT_ID};
pub use recovery::RecoveryBackup;
pub use relay_client::RelayClient;
pub use relay_pool::RelayPool;
pub use spent_cache::{CachedState, SpentProofCache};
pub use wallet::Wallet;
