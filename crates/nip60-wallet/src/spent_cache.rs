//! Time-bounded memoization of mint state-check results, plus a permanent
//! set of proof ids already known to be spent.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use cashu_core::{MintUrl, Proof};

use crate::error::Error;
use crate::mint_client::MintClient;
use crate::mint_types::ProofState;

/// How long a cached [`ProofState`] remains trusted before it must be re-checked.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A proof's last known spend state, as reported by a mint's `checkstate` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedState {
    /// Not yet spent, as of the cached check.
    Unspent,
    /// Already spent.
    Spent,
    /// A spend is in flight at the mint.
    Pending,
    /// No cached opinion; a check has never run for this id.
    Unknown,
}

impl From<ProofState> for CachedState {
    fn from(state: ProofState) -> Self {
        match state {
            ProofState::Unspent => CachedState::Unspent,
            ProofState::Spent => CachedState::Spent,
            ProofState::Pending => CachedState::Pending,
        }
    }
}

struct CacheEntry {
    state: CachedState,
    cached_at: Instant,
}

/// Wallet-local cache over `check_state` results. Single writer (the engine),
/// many readers; the `Mutex` is held only long enough to copy out results.
#[derive(Debug, Default)]
pub struct SpentProofCache {
    entries: Mutex<HashMap<String, CacheEntryDebug>>,
    permanent_spent: Mutex<HashSet<String>>,
}

/// `CacheEntry` isn't `Debug` (holds an `Instant`); this newtype satisfies the
/// `#[derive(Debug)]` on the enclosing cache without printing anything useful.
struct CacheEntryDebug(CacheEntry);

impl std::fmt::Debug for CacheEntryDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CacheEntry({:?})", self.0.state)
    }
}

impl SpentProofCache {
    /// A fresh, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Permanently known-spent ids; cleared only via [`SpentProofCache::clear_permanent`].
    pub fn is_permanently_spent(&self, proof_id: &str) -> bool {
        self.permanent_spent
            .lock()
            .expect("spent-proof cache mutex poisoned")
            .contains(proof_id)
    }

    /// Drop the permanent spent set. Exposed for tests and explicit operator recovery;
    /// the wallet engine never calls this during normal operation.
    pub fn clear_permanent(&self) {
        self.permanent_spent
            .lock()
            .expect("spent-proof cache mutex poisoned")
            .clear();
    }

    fn cached(&self, proof_id: &str) -> Option<CachedState> {
        let entries = self.entries.lock().expect("spent-proof cache mutex poisoned");
        entries.get(proof_id).and_then(|entry| {
            (entry.0.cached_at.elapsed() < CACHE_TTL).then_some(entry.0.state)
        })
    }

    fn insert(&self, proof_id: String, state: CachedState) {
        if state == CachedState::Spent {
            self.permanent_spent
                .lock()
                .expect("spent-proof cache mutex poisoned")
                .insert(proof_id.clone());
        }
        self.entries.lock().expect("spent-proof cache mutex poisoned").insert(
            proof_id,
            CacheEntryDebug(CacheEntry {
                state,
                cached_at: Instant::now(),
            }),
        );
    }

    /// Validate `proofs` against their mints, per §4.7:
    /// 1. Skip anything already in the permanent spent set.
    /// 2. Reuse a cache hit younger than [`CACHE_TTL`].
    /// 3. Group the remainder by mint and call `check_state`; cache every result
    ///    and fold newly spent ids into the permanent set.
    ///
    /// An empty input performs no network I/O.
    pub async fn batch_validate(
        &self,
        client: &MintClient,
        proofs: &[Proof],
    ) -> Result<HashMap<String, CachedState>, Error> {
        let mut result = HashMap::new();
        if proofs.is_empty() {
            return Ok(result);
        }

        let mut to_check: HashMap<MintUrl, Vec<&Proof>> = HashMap::new();
        for proof in proofs {
            let id = proof.id();
            if self.is_permanently_spent(&id) {
                result.insert(id, CachedState::Spent);
                continue;
            }
            if let Some(state) = self.cached(&id) {
                result.insert(id, state);
                continue;
            }
            to_check.entry(proof.mint_url.clone()).or_default().push(proof);
        }

        for (mint_url, mint_proofs) in to_check {
            let ys: Vec<String> = mint_proofs
                .iter()
                .map(|p| p.secret.y().map(|y| y.to_hex()))
                .collect::<Result<Vec<_>, _>>()?;
            let response = client.check_state(&mint_url, ys).await?;

            for (proof, entry) in mint_proofs.iter().zip(response.states.iter()) {
                let id = proof.id();
                let state = CachedState::from(entry.state);
                self.insert(id.clone(), state);
                result.insert(id, state);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_spent_persists_across_cache_clear() {
        let cache = SpentProofCache::new();
        cache.insert("secret:c".into(), CachedState::Spent);
        assert!(cache.is_permanently_spent("secret:c"));
        assert!(cache.cached("secret:c").is_some());
    }

    #[test]
    fn test_unspent_entries_are_not_permanent() {
        let cache = SpentProofCache::new();
        cache.insert("secret:c".into(), CachedState::Unspent);
        assert!(!cache.is_permanently_spent("secret:c"));
        assert_eq!(cache.cached("secret:c"), Some(CachedState::Unspent));
    }

    #[test]
    fn test_clear_permanent_forgets_spent_ids() {
        let cache = SpentProofCache::new();
        cache.insert("secret:c".into(), CachedState::Spent);
        cache.clear_permanent();
        assert!(!cache.is_permanently_spent("secret:c"));
    }

    fn fixture_proof(mint_url: &MintUrl) -> Proof {
        use std::str::FromStr;
        Proof {
            amount: cashu_core::Amount::from_sat(4),
            keyset_id: cashu_core::KeysetId::from_str("00456a94ab4e1c46").unwrap(),
            secret: cashu_core::Secret::generate(),
            c: cashu_core::PublicKey::from_hex(
                "02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104",
            )
            .unwrap(),
            mint_url: mint_url.clone(),
            unit: cashu_core::CurrencyUnit::Sat,
        }
    }

    #[tokio::test]
    async fn batch_validate_drops_proofs_the_mint_reports_spent() {
        use std::str::FromStr;

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkstate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"states": [{"Y": "y1", "state": "SPENT"}]}"#)
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let cache = SpentProofCache::new();
        let proof = fixture_proof(&mint_url);
        let proof_id = proof.id();

        let states = cache.batch_validate(&client, &[proof]).await.unwrap();

        assert_eq!(states.get(&proof_id), Some(&CachedState::Spent));
        assert!(cache.is_permanently_spent(&proof_id));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_validate_reuses_permanent_spent_without_a_second_call() {
        use std::str::FromStr;

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkstate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"states": [{"Y": "y1", "state": "SPENT"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let cache = SpentProofCache::new();
        let proof = fixture_proof(&mint_url);

        cache.batch_validate(&client, &[proof.clone()]).await.unwrap();
        cache.batch_validate(&client, &[proof]).await.unwrap();

        mock.assert_async().await;
    }
}
