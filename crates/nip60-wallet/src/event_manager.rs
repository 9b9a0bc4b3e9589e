//! Builds, encrypts, publishes and decrypts the three NIP-60 event kinds on
//! top of a [`RelayPool`] (§4.5). Every payload is NIP-44-sealed to the
//! wallet owner's own pubkey (the "self-DM" pattern also used for NUT-27
//! mint backups).

use std::sync::Arc;

use cashu_core::{PublicKey as CashuPublicKey, SecretKey as CashuSecretKey};
use nostr_sdk::{Event, EventBuilder, Keys, Tag};
use tracing::instrument;

use crate::error::Error;
use crate::event_kinds::{
    HistoryEventPayload, TokenEventPayload, WalletConfigPayload, HISTORY_KIND, TOKEN_KIND,
    WALLET_CONFIG_KIND,
};
use crate::relay_pool::{RelayPool, DEFAULT_PRIORITY, HIGH_PRIORITY};

/// A Nostr pubkey is carried x-only (32 bytes); NIP-44 key agreement lifts it
/// to a full point assuming even parity, per NIP-44's own convention.
fn lift_to_cashu_pubkey(pubkey: &nostr_sdk::PublicKey) -> Result<CashuPublicKey, Error> {
    let mut bytes = [0u8; 33];
    bytes[0] = 0x02;
    bytes[1..].copy_from_slice(&pubkey.to_bytes());
    CashuPublicKey::from_slice(&bytes).map_err(Error::Core)
}

fn to_cashu_secret_key(keys: &Keys) -> Result<CashuSecretKey, Error> {
    CashuSecretKey::from_slice(&keys.secret_key().to_secret_bytes()).map_err(Error::Core)
}

fn encrypt_self(keys: &Keys, plaintext: &str) -> Result<String, Error> {
    let sk = to_cashu_secret_key(keys)?;
    let pk = lift_to_cashu_pubkey(&keys.public_key())?;
    cashu_core::nip44::encrypt(plaintext, &sk, &pk).map_err(Error::Core)
}

fn decrypt_self(keys: &Keys, ciphertext: &str) -> Result<String, Error> {
    let sk = to_cashu_secret_key(keys)?;
    let pk = lift_to_cashu_pubkey(&keys.public_key())?;
    cashu_core::nip44::decrypt(ciphertext, &sk, &pk).map_err(Error::Core)
}

/// Owns the signing identity and relay pool, and speaks the NIP-60 payload
/// shapes on top of them.
#[derive(Debug)]
pub struct EventManager {
    keys: Keys,
    pool: Arc<RelayPool>,
}

impl EventManager {
    /// Build a manager bound to `keys` (the wallet's own Nostr identity) and
    /// `pool` (the relay connections to publish to / fetch from).
    pub fn new(keys: Keys, pool: Arc<RelayPool>) -> Self {
        Self { keys, pool }
    }

    /// This wallet's Nostr pubkey.
    pub fn pubkey(&self) -> nostr_sdk::PublicKey {
        self.keys.public_key()
    }

    /// Publish a (replaceable) wallet-config event, encrypted to ourselves.
    #[instrument(skip(self, payload))]
    pub async fn publish_wallet_event(&self, payload: &WalletConfigPayload) -> Result<Event, Error> {
        let plaintext = serde_json::to_string(payload).map_err(|_| Error::Internal("encode wallet config".into()))?;
        let encrypted = encrypt_self(&self.keys, &plaintext)?;

        let mut builder = EventBuilder::new(WALLET_CONFIG_KIND, encrypted).tag(Tag::identifier("wallet"));
        for mint in &payload.mints {
            builder = builder.tag(Tag::custom(nostr_sdk::TagKind::Custom("mint".into()), [mint.clone()]));
        }
        if let Some(unit) = &payload.unit {
            builder = builder.tag(Tag::custom(nostr_sdk::TagKind::Custom("unit".into()), [unit.clone()]));
        }

        let event = builder
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.pool.publish(event.clone(), HIGH_PRIORITY).await;
        Ok(event)
    }

    /// Publish a token-store event carrying `payload`'s proofs, encrypted to
    /// ourselves. Proofs stay visible as pending via the pool until a relay
    /// confirms the publish.
    #[instrument(skip(self, payload))]
    pub async fn publish_token_event(&self, payload: TokenEventPayload) -> Result<Event, Error> {
        let plaintext = serde_json::to_string(&payload).map_err(|_| Error::Internal("encode token event".into()))?;
        let encrypted = encrypt_self(&self.keys, &plaintext)?;

        let mut builder = EventBuilder::new(TOKEN_KIND, encrypted);
        for deleted in &payload.del {
            builder = builder.tag(Tag::event(
                nostr_sdk::EventId::from_hex(deleted).map_err(|e| Error::InvalidToken(e.to_string()))?,
            ));
        }

        let event = builder
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.pool
            .publish_token_event(event.clone(), DEFAULT_PRIORITY, payload, None)
            .await;
        Ok(event)
    }

    /// Publish a NIP-09 deletion for a prior token event, superseding it.
    #[instrument(skip(self))]
    pub async fn delete_token_event(&self, event_id: &str) -> Result<(), Error> {
        let id = nostr_sdk::EventId::from_hex(event_id).map_err(|e| Error::InvalidToken(e.to_string()))?;
        let event = EventBuilder::new(nostr_sdk::Kind::EventDeletion, "")
            .tag(Tag::event(id))
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.pool.publish(event, HIGH_PRIORITY).await;
        Ok(())
    }

    /// Publish a spending-history event, encrypted to ourselves.
    #[instrument(skip(self, payload))]
    pub async fn publish_spending_history(&self, payload: &HistoryEventPayload) -> Result<Event, Error> {
        let plaintext = serde_json::to_string(payload).map_err(|_| Error::Internal("encode history event".into()))?;
        let encrypted = encrypt_self(&self.keys, &plaintext)?;

        let mut builder = EventBuilder::new(HISTORY_KIND, encrypted);
        for created in &payload.created_token_ids {
            builder = builder.tag(Tag::custom(
                nostr_sdk::TagKind::Custom("e".into()),
                [created.clone(), "created".into()],
            ));
        }
        for destroyed in &payload.destroyed_token_ids {
            builder = builder.tag(Tag::custom(
                nostr_sdk::TagKind::Custom("e".into()),
                [destroyed.clone(), "destroyed".into()],
            ));
        }

        let event = builder
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.pool.publish(event.clone(), DEFAULT_PRIORITY).await;
        Ok(event)
    }

    /// Fetch and decrypt every spending-history event authored by us.
    #[instrument(skip(self))]
    pub async fn fetch_spending_history(&self) -> Result<Vec<HistoryEventPayload>, Error> {
        let events = self
            .pool
            .fetch_events_by_author(self.pubkey(), vec![HISTORY_KIND], None)
            .await?;
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let plaintext = match decrypt_self(&self.keys, &event.content) {
                Ok(plaintext) => plaintext,
                Err(err) => {
                    tracing::warn!(event_id = %event.id, error = %err, "dropping history event that failed to decrypt");
                    continue;
                }
            };
            match serde_json::from_str::<HistoryEventPayload>(&plaintext) {
                Ok(payload) => out.push(payload),
                Err(err) => tracing::warn!(event_id = %event.id, error = %err, "dropping malformed history event"),
            }
        }
        Ok(out)
    }

    /// Count live (non-deleted) token events authored by us. Used by callers
    /// that want a cheap health signal without reconstructing full state.
    #[instrument(skip(self))]
    pub async fn count_token_events(&self) -> Result<usize, Error> {
        let events = self
            .pool
            .fetch_events_by_author(self.pubkey(), vec![TOKEN_KIND], None)
            .await?;
        Ok(events.len())
    }

    /// Delete every token event this wallet has ever published. Used by wipe
    /// / reset flows; irreversible once relays process the deletions.
    #[instrument(skip(self))]
    pub async fn clear_all_token_events(&self) -> Result<usize, Error> {
        let events = self
            .pool
            .fetch_events_by_author(self.pubkey(), vec![TOKEN_KIND], None)
            .await?;
        let count = events.len();
        for event in events {
            self.delete_token_event(&event.id.to_hex()).await?;
        }
        Ok(count)
    }

    /// Whether a (non-legacy) wallet-config event already exists for us.
    #[instrument(skip(self))]
    pub async fn check_wallet_event_exists(&self) -> Result<bool, Error> {
        let events = self
            .pool
            .fetch_events_by_author(self.pubkey(), vec![WALLET_CONFIG_KIND], None)
            .await?;
        Ok(!events.is_empty())
    }

    /// Fetch and decrypt every event of `kinds` authored by us, newest first.
    /// Deletion events (`Kind::EventDeletion`) carry plaintext, unencrypted
    /// content per NIP-09 and are passed through unchanged rather than run
    /// through the NIP-44 cipher.
    #[instrument(skip(self))]
    pub async fn fetch_decrypted(&self, kinds: Vec<nostr_sdk::Kind>) -> Result<Vec<(Event, String)>, Error> {
        let mut events = self.pool.fetch_events_by_author(self.pubkey(), kinds, None).await?;
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            if event.kind == nostr_sdk::Kind::EventDeletion {
                let content = event.content.clone();
                out.push((event, content));
                continue;
            }
            match decrypt_self(&self.keys, &event.content) {
                Ok(plaintext) => out.push((event, plaintext)),
                Err(err) => {
                    tracing::warn!(event_id = %event.id, error = %err, "dropping event that failed to decrypt");
                }
            }
        }
        Ok(out)
    }

    /// Proofs still queued for publication but not yet relay-confirmed.
    pub async fn pending_proofs(&self) -> Vec<TokenEventPayload> {
        self.pool.pending_proofs().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lift_pubkey_roundtrips_through_self_dm_cipher() {
        let keys = Keys::generate();
        let sk = to_cashu_secret_key(&keys).unwrap();
        let pk = lift_to_cashu_pubkey(&keys.public_key()).unwrap();

        let encrypted = cashu_core::nip44::encrypt("hello wallet", &sk, &pk).unwrap();
        let decrypted = cashu_core::nip44::decrypt(&encrypted, &sk, &pk).unwrap();
        assert_eq!(decrypted, "hello wallet");
    }
}
