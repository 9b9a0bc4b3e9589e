//! Folds the wallet's encrypted event log into a live, deduplicated proof
//! set (§4.6): the only place in the crate that turns the append-only,
//! eventually-consistent Nostr log into a single coherent view of what the
//! wallet owns right now.

use std::collections::{BTreeMap, HashMap, HashSet};

use std::str::FromStr;

use cashu_core::{CurrencyUnit, KeysetId, MintUrl, Proof, Secret};
use nostr_sdk::Kind;
use tracing::instrument;

use crate::error::Error;
use crate::event_kinds::{StoredProof, TokenEventPayload, WalletConfigPayload, HISTORY_KIND};
use crate::event_kinds::{LEGACY_WALLET_CONFIG_KIND, TOKEN_KIND, WALLET_CONFIG_KIND};
use crate::event_manager::EventManager;
use crate::mint_client::MintClient;
use crate::spent_cache::SpentProofCache;

/// Sentinel event id recorded for proofs that only exist in the outbound
/// queue and have not yet been confirmed by any relay.
pub const PENDING_EVENT_ID: &str = "__pending__";

/// The reconstructed live view of the wallet's proofs.
#[derive(Debug, Clone, Default)]
pub struct WalletState {
    /// Every live proof, deduplicated by `(secret, C)`.
    pub proofs: Vec<Proof>,
    /// Total value per mint.
    pub by_mint: BTreeMap<MintUrl, u64>,
    /// Total value per currency unit.
    pub by_unit: BTreeMap<CurrencyUnit, u64>,
    /// Which Token event (or [`PENDING_EVENT_ID`]) last defined each proof.
    pub proof_to_event_id: HashMap<String, String>,
    /// Decrypted wallet configuration, if a config event was found.
    pub config: Option<WalletConfigPayload>,
}

impl WalletState {
    /// Sum of all live proof amounts, regardless of mint or unit.
    pub fn total_balance(&self) -> u64 {
        self.proofs.iter().map(|p| p.amount.to_sat()).sum()
    }
}

fn stored_proof_to_proof(stored: &StoredProof, mint_url: &MintUrl) -> Result<Proof, Error> {
    let keyset_id = KeysetId::from_str(&stored.id).map_err(Error::Core)?;
    let secret = Secret::from_base64(&stored.secret).map_err(Error::Core)?;
    let c = cashu_core::PublicKey::from_hex(&stored.c).map_err(Error::Core)?;
    let unit: CurrencyUnit = stored.unit.parse().unwrap_or(CurrencyUnit::Sat);

    Ok(Proof {
        amount: cashu_core::Amount::from_sat(stored.amount),
        keyset_id,
        secret,
        c,
        mint_url: mint_url.clone(),
        unit,
    })
}

/// Reconstructs wallet state from the event log, honoring `del`-chain
/// supersession and folding in not-yet-confirmed pending proofs.
#[derive(Debug)]
pub struct StateReconstructor<'a> {
    events: &'a EventManager,
}

impl<'a> StateReconstructor<'a> {
    /// Build a reconstructor reading through `events`.
    pub fn new(events: &'a EventManager) -> Self {
        Self { events }
    }

    /// Run the full fold. When `check_proofs` is set, non-pending proofs are
    /// additionally validated against their mints via `cache`/`client`, and
    /// any found SPENT are dropped from the result.
    #[instrument(skip(self, cache, client))]
    pub async fn fetch_wallet_state(
        &self,
        check_proofs: bool,
        cache: &SpentProofCache,
        client: &MintClient,
    ) -> Result<WalletState, Error> {
        let decrypted = self
            .events
            .fetch_decrypted(vec![
                WALLET_CONFIG_KIND,
                LEGACY_WALLET_CONFIG_KIND,
                TOKEN_KIND,
                HISTORY_KIND,
                Kind::EventDeletion,
            ])
            .await?;
        let pending = self.events.pending_proofs().await;

        let mut state = reconstruct(decrypted, pending)?;

        if check_proofs {
            let non_pending: Vec<Proof> = state
                .proofs
                .iter()
                .filter(|p| state.proof_to_event_id.get(&p.id()).map(String::as_str) != Some(PENDING_EVENT_ID))
                .cloned()
                .collect();
            let states = cache.batch_validate(client, &non_pending).await?;
            state
                .proofs
                .retain(|p| !matches!(states.get(&p.id()), Some(crate::spent_cache::CachedState::Spent)));

            let mut by_mint: BTreeMap<MintUrl, u64> = BTreeMap::new();
            let mut by_unit: BTreeMap<CurrencyUnit, u64> = BTreeMap::new();
            for proof in &state.proofs {
                *by_mint.entry(proof.mint_url.clone()).or_default() += proof.amount.to_sat();
                *by_unit.entry(proof.unit.clone()).or_default() += proof.amount.to_sat();
            }
            state.by_mint = by_mint;
            state.by_unit = by_unit;
        }

        Ok(state)
    }
}

/// Pure fold from decrypted events plus not-yet-confirmed pending payloads
/// into a [`WalletState`], with no network I/O. Split out from
/// [`StateReconstructor::fetch_wallet_state`] so the supersession/dedup
/// algorithm can be exercised directly in tests.
fn reconstruct(
    decrypted: Vec<(nostr_sdk::Event, String)>,
    pending: Vec<TokenEventPayload>,
) -> Result<WalletState, Error> {
    let mut invalid_ids: HashSet<String> = HashSet::new();
    for (event, _) in &decrypted {
        if event.kind == Kind::EventDeletion {
            for tag in event.tags.iter() {
                if let Some(nostr_sdk::TagStandard::Event { event_id, .. }) = tag.as_standardized() {
                    invalid_ids.insert(event_id.to_hex());
                }
            }
        }
    }

    let config = decrypted
        .iter()
        .filter(|(event, _)| event.kind == WALLET_CONFIG_KIND || event.kind == LEGACY_WALLET_CONFIG_KIND)
        .max_by_key(|(event, _)| event.created_at)
        .and_then(|(_, plaintext)| serde_json::from_str::<WalletConfigPayload>(plaintext).ok());

    let mut token_events: Vec<(&nostr_sdk::Event, &String)> = decrypted
        .iter()
        .filter(|(event, _)| event.kind == TOKEN_KIND)
        .map(|(event, plaintext)| (event, plaintext))
        .collect();
    token_events.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut proofs = Vec::new();
    let mut proof_to_event_id = HashMap::new();

    for (event, plaintext) in token_events {
        let event_id = event.id.to_hex();
        if invalid_ids.contains(&event_id) {
            continue;
        }
        let payload: TokenEventPayload = match serde_json::from_str(plaintext) {
            Ok(p) => p,
            Err(_) => continue,
        };
        invalid_ids.extend(payload.del.iter().cloned());
        if invalid_ids.contains(&event_id) {
            continue;
        }

        let mint_url = MintUrl::from_str(&payload.mint).map_err(Error::Core)?;
        for stored in &payload.proofs {
            let key = (stored.secret.clone(), stored.c.clone());
            if !seen.insert(key) {
                continue;
            }
            let proof = match stored_proof_to_proof(stored, &mint_url) {
                Ok(proof) => proof,
                Err(err) => {
                    tracing::warn!(event_id, error = %err, "dropping malformed stored proof");
                    continue;
                }
            };
            proof_to_event_id.insert(proof.id(), event_id.clone());
            proofs.push(proof);
        }
    }

    for payload in &pending {
        let mint_url = MintUrl::from_str(&payload.mint).map_err(Error::Core)?;
        for stored in &payload.proofs {
            let key = (stored.secret.clone(), stored.c.clone());
            if !seen.insert(key) {
                continue;
            }
            let proof = match stored_proof_to_proof(stored, &mint_url) {
                Ok(proof) => proof,
                Err(_) => continue,
            };
            proof_to_event_id.insert(proof.id(), PENDING_EVENT_ID.to_string());
            proofs.push(proof);
        }
    }

    let mut by_mint: BTreeMap<MintUrl, u64> = BTreeMap::new();
    let mut by_unit: BTreeMap<CurrencyUnit, u64> = BTreeMap::new();
    for proof in &proofs {
        *by_mint.entry(proof.mint_url.clone()).or_default() += proof.amount.to_sat();
        *by_unit.entry(proof.unit.clone()).or_default() += proof.amount.to_sat();
    }

    Ok(WalletState {
        proofs,
        by_mint,
        by_unit,
        proof_to_event_id,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Tag};

    const KEYSET_ID: &str = "00456a94ab4e1c46";
    const MINT: &str = "https://mint.example.com";

    fn stored_proof(amount: u64) -> StoredProof {
        StoredProof {
            id: KEYSET_ID.to_string(),
            amount,
            secret: cashu_core::Secret::generate().to_base64(),
            c: "02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104".to_string(),
            unit: "sat".to_string(),
        }
    }

    fn token_event(keys: &Keys, created_at: u64, proofs: Vec<StoredProof>, del: Vec<String>) -> (nostr_sdk::Event, String) {
        let payload = TokenEventPayload { mint: MINT.to_string(), proofs, del };
        let plaintext = serde_json::to_string(&payload).unwrap();
        let event = EventBuilder::new(TOKEN_KIND, plaintext.clone())
            .custom_created_at(nostr_sdk::Timestamp::from(created_at))
            .sign_with_keys(keys)
            .unwrap();
        (event, plaintext)
    }

    fn deletion_event(keys: &Keys, created_at: u64, deletes: nostr_sdk::EventId) -> (nostr_sdk::Event, String) {
        let event = EventBuilder::new(Kind::EventDeletion, "")
            .tag(Tag::event(deletes))
            .custom_created_at(nostr_sdk::Timestamp::from(created_at))
            .sign_with_keys(keys)
            .unwrap();
        (event, String::new())
    }

    #[test]
    fn dedups_proofs_seen_in_multiple_token_events() {
        let keys = Keys::generate();
        let proof = stored_proof(4);
        let e1 = token_event(&keys, 100, vec![proof.clone()], vec![]);
        let e2 = token_event(&keys, 200, vec![proof], vec![]);

        let state = reconstruct(vec![e1, e2], vec![]).unwrap();
        assert_eq!(state.proofs.len(), 1);
        assert_eq!(state.total_balance(), 4);
    }

    #[test]
    fn del_chain_supersedes_older_token_events() {
        let keys = Keys::generate();
        let (old_event, _) = token_event(&keys, 100, vec![stored_proof(8)], vec![]);
        let old_id = old_event.id.to_hex();
        let (new_event, _) = token_event(&keys, 200, vec![stored_proof(8)], vec![old_id]);

        let state = reconstruct(vec![(old_event, String::new()), (new_event, String::new())], vec![]).unwrap();
        assert_eq!(state.proofs.len(), 1);
        assert_eq!(state.total_balance(), 8);
    }

    #[test]
    fn nip09_deletion_event_supersedes_matching_token_event() {
        let keys = Keys::generate();
        let (old_event, _) = token_event(&keys, 100, vec![stored_proof(16)], vec![]);
        let old_id = old_event.id;
        let del = deletion_event(&keys, 200, old_id);

        let state = reconstruct(vec![(old_event, String::new()), del], vec![]).unwrap();
        assert!(state.proofs.is_empty());
    }

    #[test]
    fn pending_proofs_merge_with_sentinel_event_id() {
        let payload = TokenEventPayload {
            mint: MINT.to_string(),
            proofs: vec![stored_proof(2)],
            del: vec![],
        };

        let state = reconstruct(vec![], vec![payload]).unwrap();
        assert_eq!(state.proofs.len(), 1);
        let id = state.proofs[0].id();
        assert_eq!(state.proof_to_event_id.get(&id).map(String::as_str), Some(PENDING_EVENT_ID));
    }

    #[test]
    fn newest_wallet_config_wins() {
        let keys = Keys::generate();
        let old_cfg = WalletConfigPayload { mints: vec!["https://old.example".into()], privkey: "a".into(), unit: None };
        let new_cfg = WalletConfigPayload { mints: vec!["https://new.example".into()], privkey: "b".into(), unit: None };

        let old_event = EventBuilder::new(WALLET_CONFIG_KIND, serde_json::to_string(&old_cfg).unwrap())
            .custom_created_at(nostr_sdk::Timestamp::from(100u64))
            .sign_with_keys(&keys)
            .unwrap();
        let old_plain = serde_json::to_string(&old_cfg).unwrap();
        let new_event = EventBuilder::new(WALLET_CONFIG_KIND, serde_json::to_string(&new_cfg).unwrap())
            .custom_created_at(nostr_sdk::Timestamp::from(200u64))
            .sign_with_keys(&keys)
            .unwrap();
        let new_plain = serde_json::to_string(&new_cfg).unwrap();

        let state = reconstruct(vec![(old_event, old_plain), (new_event, new_plain)], vec![]).unwrap();
        assert_eq!(state.config.unwrap().mints, vec!["https://new.example".to_string()]);
    }
}
