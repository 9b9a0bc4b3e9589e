//! Top-level wallet engine (§4.9): redeem/send/mint/melt orchestration over
//! the mint client, relay-backed event log and local proof reconstruction.
//! Every call reconstructs its working view of proofs from the Nostr event
//! log before acting, then republishes the result; no proof lives only in
//! process memory once a store completes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cashu_core::{dhke, Amount, CurrencyUnit, MintUrl, PendingBlindedMessage, Proof, Proofs, Secret, Token};
use nostr_sdk::Keys;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::denominations::{self, optimal_split};
use crate::error::Error;
use crate::event_kinds::{Direction, HistoryEventPayload, StoredProof, TokenEventPayload};
use crate::event_manager::EventManager;
use crate::mint_client::{self, MintClient};
use crate::mint_types::{KeySet, MeltQuoteRequest, MeltQuoteState, MintQuoteRequest, MintQuoteState};
use crate::proof_store::{StateReconstructor, WalletState, PENDING_EVENT_ID};
use crate::recovery::RecoveryBackup;
use crate::relay_pool::RelayPool;
use crate::spent_cache::{CachedState, SpentProofCache};

/// Starting interval for mint-quote polling backoff.
const QUOTE_POLL_INITIAL: Duration = Duration::from_secs(1);
/// Cap for mint-quote polling backoff.
const QUOTE_POLL_MAX: Duration = Duration::from_secs(5);
/// Base interval for `store_proofs` publish retry backoff.
const STORE_RETRY_BASE: Duration = Duration::from_secs(10);
/// Maximum `store_proofs` retry attempts.
const STORE_RETRY_MAX: u32 = 5;
/// Default deadline for a transfer's internal mint-quote wait.
const TRANSFER_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Stateless Cashu wallet engine over a NIP-60 event log.
#[derive(Debug)]
pub struct Wallet {
    mint_client: MintClient,
    events: Arc<EventManager>,
    cache: SpentProofCache,
    trusted_mints: Vec<MintUrl>,
    unit: CurrencyUnit,
    lock: AsyncMutex<()>,
}

/// NUT-08 blank-output count: enough to cover any fee-reserve overestimate
/// the mint might return as change. Zero when there's no fee reserve to
/// possibly overpay.
fn blank_output_count(fee_reserve: u64) -> u32 {
    if fee_reserve == 0 {
        return 0;
    }
    ((fee_reserve as f64).log2().ceil() as u32).max(1)
}

impl Wallet {
    /// Build a wallet over an already-connected relay pool, trusting
    /// `trusted_mints` for `auto_swap` destinations and default mint
    /// selection.
    pub fn new(keys: Keys, pool: Arc<RelayPool>, trusted_mints: Vec<MintUrl>, unit: CurrencyUnit) -> Self {
        Self {
            mint_client: MintClient::new(),
            events: Arc::new(EventManager::new(keys, pool)),
            cache: SpentProofCache::new(),
            trusted_mints,
            unit,
            lock: AsyncMutex::new(()),
        }
    }

    /// This wallet's Nostr pubkey.
    pub fn pubkey(&self) -> nostr_sdk::PublicKey {
        self.events.pubkey()
    }

    /// Mints this wallet currently trusts as `auto_swap`/default destinations.
    pub fn trusted_mints(&self) -> &[MintUrl] {
        &self.trusted_mints
    }

    /// The event manager backing this wallet, for callers that need direct
    /// access to history/config publishing (§4.5) beyond the proof lifecycle
    /// operations this engine exposes directly.
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    fn reconstructor(&self) -> StateReconstructor<'_> {
        StateReconstructor::new(&self.events)
    }

    /// Live, mint-validated view of every proof this wallet holds.
    #[instrument(skip(self))]
    pub async fn balance(&self) -> Result<WalletState, Error> {
        self.reconstructor()
            .fetch_wallet_state(true, &self.cache, &self.mint_client)
            .await
    }

    async fn active_keyset(&self, mint_url: &MintUrl, unit: &CurrencyUnit) -> Result<KeySet, Error> {
        let keysets = self.mint_client.get_keysets_info(mint_url).await?;
        let active = keysets
            .into_iter()
            .find(|k| k.active && &k.unit == unit)
            .ok_or_else(|| Error::MintError(format!("no active keyset for unit {unit}")))?;
        self.mint_client.get_keyset(mint_url, active.id).await
    }

    async fn input_fee_ppk(&self, mint_url: &MintUrl, unit: &CurrencyUnit) -> Result<u64, Error> {
        let keysets = self.mint_client.get_keysets_info(mint_url).await?;
        Ok(keysets
            .into_iter()
            .find(|k| &k.unit == unit)
            .map(|k| k.input_fee_ppk)
            .unwrap_or(0))
    }

    /// Build fresh blinded outputs for `amounts`, each with a freshly
    /// generated secret and blinding factor under `keyset`.
    fn blind_outputs(
        amounts: &[u64],
        keyset: &KeySet,
    ) -> Result<(Vec<cashu_core::BlindedMessage>, Vec<PendingBlindedMessage>), Error> {
        let mut outputs = Vec::with_capacity(amounts.len());
        let mut pending = Vec::with_capacity(amounts.len());
        for &amount in amounts {
            let secret = Secret::generate();
            let normalized = secret.to_hex_normalized().map_err(Error::Core)?;
            let (b, r) = dhke::blind(normalized.as_bytes(), None).map_err(Error::Core)?;
            let message = cashu_core::BlindedMessage {
                amount: Amount::from_sat(amount),
                keyset_id: keyset.id,
                b,
            };
            outputs.push(message.clone());
            pending.push(PendingBlindedMessage { message, r, secret });
        }
        Ok((outputs, pending))
    }

    /// Unblind a mint's signatures against the `pending` requests that
    /// produced them, in the same order.
    fn unblind_signatures(
        signatures: &[cashu_core::BlindedSignature],
        pending: &[PendingBlindedMessage],
        keyset: &KeySet,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
    ) -> Result<Proofs, Error> {
        let count = signatures.len().min(pending.len());
        let mut proofs = Vec::with_capacity(count);
        for (signature, request) in signatures[..count].iter().zip(&pending[..count]) {
            let mint_pubkey = keyset
                .keys
                .get(&signature.amount.to_sat())
                .ok_or_else(|| Error::MintError(format!("keyset has no key for amount {}", signature.amount)))?;
            let c = dhke::unblind(&signature.c, &request.r, mint_pubkey).map_err(Error::Core)?;
            proofs.push(Proof {
                amount: signature.amount,
                keyset_id: keyset.id,
                secret: request.secret.clone(),
                c,
                mint_url: mint_url.clone(),
                unit: unit.clone(),
            });
        }
        Ok(proofs)
    }

    fn amounts_from_split(split: &BTreeMap<u64, u64>) -> Vec<u64> {
        let mut amounts = Vec::new();
        for (&denom, &count) in split {
            amounts.extend(std::iter::repeat(denom).take(count as usize));
        }
        amounts.sort_unstable();
        amounts
    }

    fn stored_proof(proof: &Proof) -> StoredProof {
        StoredProof {
            id: proof.keyset_id.to_string(),
            amount: proof.amount.to_sat(),
            secret: proof.secret.to_base64(),
            c: proof.c.to_hex(),
            unit: proof.unit.to_string(),
        }
    }

    /// Select proofs at `mint_url`/`unit` totaling at least `base_amount`
    /// plus the input fee their own count incurs, largest-first. Returns the
    /// selection and the (non-pending) Token event ids it would supersede.
    fn select_proofs(
        state: &WalletState,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        base_amount: u64,
        input_fee_ppk: u64,
    ) -> Result<(Proofs, Vec<String>), Error> {
        let mut candidates: Proofs = state
            .proofs
            .iter()
            .filter(|p| &p.mint_url == mint_url && &p.unit == unit)
            .cloned()
            .collect();
        candidates.sort_by_key(|p| Reverse(p.amount.to_sat()));

        let mut selected = Proofs::new();
        let mut total = 0u64;
        for proof in candidates {
            total += proof.amount.to_sat();
            selected.push(proof);
            let required = base_amount + mint_client::input_fee(selected.len() as u64, input_fee_ppk);
            if total >= required {
                break;
            }
        }
        let required = base_amount + mint_client::input_fee(selected.len() as u64, input_fee_ppk);
        if total < required {
            return Err(Error::InsufficientProofs);
        }

        let event_ids: HashSet<String> = selected
            .iter()
            .filter_map(|p| state.proof_to_event_id.get(&p.id()).cloned())
            .filter(|id| id != PENDING_EVENT_ID)
            .collect();

        Ok((selected, event_ids.into_iter().collect()))
    }

    /// Write a recovery backup, publish `proofs` (all from one mint) as a
    /// Token event superseding `supersedes`, and delete the backup once
    /// publication succeeds. Retries the publish with exponential backoff;
    /// an empty `proofs` with a non-empty `supersedes` still publishes (an
    /// empty token event recording the deletion).
    #[instrument(skip(self, proofs))]
    async fn store_proof_group(&self, mint_url: &MintUrl, proofs: Proofs, supersedes: Vec<String>) -> Result<(), Error> {
        if proofs.is_empty() && supersedes.is_empty() {
            return Ok(());
        }
        let backup = RecoveryBackup::write(&proofs, None)?;

        let payload = TokenEventPayload {
            mint: mint_url.to_string(),
            proofs: proofs.iter().map(Self::stored_proof).collect(),
            del: supersedes,
        };

        let mut attempt = 0;
        let mut delay = STORE_RETRY_BASE;
        loop {
            match self.events.publish_token_event(payload.clone()).await {
                Ok(_) => {
                    backup.confirm()?;
                    return Ok(());
                }
                Err(err) if attempt < STORE_RETRY_MAX => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "retrying token event publish");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Persist `proofs` into the event log: deduplicate against what's
    /// already stored, group by mint, and publish one Token event per group.
    #[instrument(skip(self, proofs))]
    pub async fn store_proofs(&self, proofs: Proofs) -> Result<(), Error> {
        if proofs.is_empty() {
            return Ok(());
        }
        let state = self
            .reconstructor()
            .fetch_wallet_state(false, &self.cache, &self.mint_client)
            .await?;
        let known: HashSet<String> = state.proofs.iter().map(|p| p.id()).collect();

        let mut by_mint: BTreeMap<MintUrl, Proofs> = BTreeMap::new();
        for proof in proofs {
            if known.contains(&proof.id()) {
                continue;
            }
            by_mint.entry(proof.mint_url.clone()).or_default().push(proof);
        }

        for (mint_url, group) in by_mint {
            self.store_proof_group(&mint_url, group, Vec::new()).await?;
        }
        Ok(())
    }

    async fn publish_history(
        &self,
        direction: Direction,
        amount: u64,
        unit: &CurrencyUnit,
        created: Vec<String>,
        destroyed: Vec<String>,
    ) -> Result<(), Error> {
        let payload = HistoryEventPayload {
            direction,
            amount,
            unit: unit.to_string(),
            created_token_ids: created,
            destroyed_token_ids: destroyed,
        };
        self.events.publish_spending_history(&payload).await?;
        Ok(())
    }

    /// Poll a mint quote with exponential backoff (1s, doubling, capped at
    /// 5s) until it's `Paid` or `timeout` elapses.
    async fn await_mint_quote_paid(&self, mint_url: &MintUrl, quote_id: &str, timeout: Duration) -> Result<bool, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut interval = QUOTE_POLL_INITIAL;
        loop {
            let quote = self.mint_client.get_mint_quote(mint_url, quote_id).await?;
            if quote.state == MintQuoteState::Paid {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(QUOTE_POLL_MAX);
        }
    }

    /// Build outputs for `amount`, call `mint.mint`, unblind and store the
    /// result. Returns the amount actually minted.
    async fn mint_from_quote(&self, mint_url: &MintUrl, quote_id: &str, amount: u64, unit: &CurrencyUnit) -> Result<u64, Error> {
        let keyset = self.active_keyset(mint_url, unit).await?;
        let split = optimal_split(amount, &denominations::keyset_denominations(&keyset.keys));
        let amounts = Self::amounts_from_split(&split);
        let (outputs, pending) = Self::blind_outputs(&amounts, &keyset)?;

        let response = self.mint_client.mint(mint_url, quote_id, outputs).await?;
        let proofs = Self::unblind_signatures(&response.signatures, &pending, &keyset, mint_url, unit)?;
        let total: u64 = proofs.iter().map(|p| p.amount.to_sat()).sum();
        self.store_proof_group(mint_url, proofs, Vec::new()).await?;
        Ok(total)
    }

    /// Melt `proofs` (already selected, all at `source_mint`) to settle
    /// `invoice_request`, returning any NUT-08 change as new proofs and
    /// superseding `consumed_event_ids`. Used both by `melt` itself and by
    /// cross-mint transfers.
    async fn melt_proofs(
        &self,
        source_mint: &MintUrl,
        unit: &CurrencyUnit,
        melt_quote_id: &str,
        fee_reserve: u64,
        proofs: &Proofs,
        consumed_event_ids: Vec<String>,
    ) -> Result<bool, Error> {
        let n_blank = blank_output_count(fee_reserve);
        let keyset = self.active_keyset(source_mint, unit).await?;
        let (blank_outputs, blank_pending) = if n_blank > 0 {
            Self::blind_outputs(&vec![0u64; n_blank as usize], &keyset)?
        } else {
            (Vec::new(), Vec::new())
        };

        let response = self.mint_client.melt(source_mint, melt_quote_id, proofs, blank_outputs).await?;
        if response.state != MeltQuoteState::Paid {
            return Ok(false);
        }

        let change = if response.change.is_empty() {
            Proofs::new()
        } else {
            Self::unblind_signatures(&response.change, &blank_pending, &keyset, source_mint, unit)?
        };
        self.store_proof_group(source_mint, change, consumed_event_ids).await?;
        Ok(true)
    }

    /// Melt `proofs` at `source_mint` to pay a mint-quote invoice freshly
    /// created at `destination_mint`, landing the value there instead.
    async fn transfer_proofs(
        &self,
        proofs: Proofs,
        source_mint: MintUrl,
        destination_mint: MintUrl,
        unit: CurrencyUnit,
    ) -> Result<(u64, CurrencyUnit), Error> {
        let total: u64 = proofs.iter().map(|p| p.amount.to_sat()).sum();

        let quote = self
            .mint_client
            .create_mint_quote(
                &destination_mint,
                MintQuoteRequest {
                    amount: Amount::from_sat(total),
                    unit: unit.clone(),
                    description: None,
                },
            )
            .await?;

        let melt_quote = self
            .mint_client
            .create_melt_quote(
                &source_mint,
                MeltQuoteRequest {
                    unit: unit.clone(),
                    request: quote.request.clone(),
                },
            )
            .await?;

        let required = melt_quote.amount.to_sat() + melt_quote.fee_reserve.to_sat();
        if total < required {
            return Err(Error::InsufficientProofs);
        }

        let paid = self
            .melt_proofs(
                &source_mint,
                &unit,
                &melt_quote.quote,
                melt_quote.fee_reserve.to_sat(),
                &proofs,
                Vec::new(),
            )
            .await?;
        if !paid {
            return Err(Error::PaymentFailed("transfer melt did not settle".into()));
        }

        if !self
            .await_mint_quote_paid(&destination_mint, &quote.quote, TRANSFER_POLL_TIMEOUT)
            .await?
        {
            return Err(Error::QuoteExpired);
        }
        let minted = self.mint_from_quote(&destination_mint, &quote.quote, total, &unit).await?;
        self.publish_history(Direction::In, minted, &unit, Vec::new(), Vec::new()).await?;

        Ok((minted, unit))
    }

    /// Parse and redeem a Cashu token, landing its value in this wallet's
    /// state. Returns the total amount and unit now available.
    #[instrument(skip(self, token))]
    pub async fn redeem(&self, token: &str, auto_swap: bool) -> Result<(u64, CurrencyUnit), Error> {
        let _guard = self.lock.lock().await;

        let parsed: Token = token.parse().map_err(Error::Core)?;
        let source_mint = parsed.mint_url().map_err(Error::Core)?;
        let unit = parsed.unit().unwrap_or(CurrencyUnit::Sat);
        let proofs = parsed.proofs();
        if proofs.is_empty() {
            return Err(Error::InvalidToken("token carries no proofs".into()));
        }
        let total: u64 = proofs.iter().map(|p| p.amount.to_sat()).sum();

        let states = self.cache.batch_validate(&self.mint_client, &proofs).await?;
        if proofs
            .iter()
            .any(|p| matches!(states.get(&p.id()), Some(CachedState::Spent)))
        {
            return Err(Error::AlreadySpent);
        }

        let destination_mint = if !auto_swap || self.trusted_mints.contains(&source_mint) {
            source_mint.clone()
        } else {
            self.trusted_mints
                .first()
                .cloned()
                .ok_or_else(|| Error::MintError("no trusted mint configured".into()))?
        };

        if destination_mint != source_mint {
            return self.transfer_proofs(proofs, source_mint, destination_mint, unit).await;
        }

        let ppk = self.input_fee_ppk(&source_mint, &unit).await?;
        let fee = mint_client::input_fee(proofs.len() as u64, ppk);
        let output_total = total
            .checked_sub(fee)
            .ok_or(Error::InsufficientProofs)?;

        let keyset = self.active_keyset(&source_mint, &unit).await?;
        let split = optimal_split(output_total, &denominations::keyset_denominations(&keyset.keys));
        let amounts = Self::amounts_from_split(&split);
        let (outputs, pending) = Self::blind_outputs(&amounts, &keyset)?;

        let response = self.mint_client.swap(&source_mint, &proofs, outputs).await?;
        let new_proofs = Self::unblind_signatures(&response.signatures, &pending, &keyset, &source_mint, &unit)?;

        self.store_proof_group(&source_mint, new_proofs, Vec::new()).await?;
        self.publish_history(Direction::In, total, &unit, Vec::new(), Vec::new()).await?;

        Ok((total, unit))
    }

    /// Select `amount` of `unit` at `target_mint` (or this wallet's
    /// highest-balance mint) and return a serialized V4 token, publishing
    /// the change as a new Token event.
    #[instrument(skip(self))]
    pub async fn send(&self, amount: u64, target_mint: Option<MintUrl>, unit: Option<CurrencyUnit>) -> Result<String, Error> {
        let _guard = self.lock.lock().await;
        let unit = unit.unwrap_or_else(|| self.unit.clone());

        let state = self
            .reconstructor()
            .fetch_wallet_state(true, &self.cache, &self.mint_client)
            .await?;
        if state.total_balance() < amount {
            return Err(Error::InsufficientBalance {
                needed: amount,
                available: state.total_balance(),
            });
        }

        let target_mint = match target_mint {
            Some(mint) => mint,
            None => state
                .by_mint
                .iter()
                .max_by_key(|(_, &total)| total)
                .map(|(mint, _)| mint.clone())
                .ok_or_else(|| Error::MintError("wallet holds no mint".into()))?,
        };

        let at_target: u64 = state
            .proofs
            .iter()
            .filter(|p| p.mint_url == target_mint && p.unit == unit)
            .map(|p| p.amount.to_sat())
            .sum();
        if at_target < amount {
            self.transfer_balance_to_mint(amount - at_target, &target_mint).await?;
        }

        let state = self
            .reconstructor()
            .fetch_wallet_state(false, &self.cache, &self.mint_client)
            .await?;
        let ppk = self.input_fee_ppk(&target_mint, &unit).await?;
        let (selected, consumed_event_ids) = Self::select_proofs(&state, &target_mint, &unit, amount, ppk)?;
        let selected_total: u64 = selected.iter().map(|p| p.amount.to_sat()).sum();
        let fee = mint_client::input_fee(selected.len() as u64, ppk);
        let change_amount = selected_total - amount - fee;

        let keyset = self.active_keyset(&target_mint, &unit).await?;
        let denoms = denominations::keyset_denominations(&keyset.keys);
        let send_split = optimal_split(amount, &denoms);
        let change_split = optimal_split(change_amount, &denoms);

        let mut tagged: Vec<(u64, bool)> = Vec::new();
        for (&denom, &count) in &send_split {
            tagged.extend(std::iter::repeat((denom, true)).take(count as usize));
        }
        for (&denom, &count) in &change_split {
            tagged.extend(std::iter::repeat((denom, false)).take(count as usize));
        }
        tagged.sort_by_key(|&(amt, _)| amt);

        let amounts: Vec<u64> = tagged.iter().map(|&(a, _)| a).collect();
        let (outputs, pending) = Self::blind_outputs(&amounts, &keyset)?;

        let response = self.mint_client.swap(&target_mint, &selected, outputs).await?;
        let new_proofs = Self::unblind_signatures(&response.signatures, &pending, &keyset, &target_mint, &unit)?;

        let mut send_proofs = Proofs::new();
        let mut change_proofs = Proofs::new();
        for (proof, &(_, is_send)) in new_proofs.into_iter().zip(tagged.iter()) {
            if is_send {
                send_proofs.push(proof);
            } else {
                change_proofs.push(proof);
            }
        }

        let token_string = Token::new(target_mint.clone(), send_proofs, None, unit.clone()).to_string();

        self.store_proof_group(&target_mint, change_proofs, consumed_event_ids.clone())
            .await?;
        self.publish_history(Direction::Out, amount, &unit, Vec::new(), consumed_event_ids)
            .await?;

        Ok(token_string)
    }

    /// Request `amount` of `unit` be minted at `mint_url` (or this wallet's
    /// first trusted mint). Returns the BOLT-11 invoice and a background
    /// task that resolves to `true` once the quote is paid and redeemed, or
    /// `false` once `timeout` elapses unpaid.
    #[instrument(skip(self))]
    pub async fn mint(
        self: &Arc<Self>,
        amount: u64,
        unit: CurrencyUnit,
        mint_url: Option<MintUrl>,
        timeout: Duration,
    ) -> Result<(String, JoinHandle<Result<bool, Error>>), Error> {
        let mint_url = mint_url
            .or_else(|| self.trusted_mints.first().cloned())
            .ok_or_else(|| Error::MintError("no mint specified".into()))?;

        let quote = self
            .mint_client
            .create_mint_quote(
                &mint_url,
                MintQuoteRequest {
                    amount: Amount::from_sat(amount),
                    unit: unit.clone(),
                    description: None,
                },
            )
            .await?;

        let invoice = quote.request.clone();
        let wallet = Arc::clone(self);
        let quote_id = quote.quote.clone();

        let task = tokio::spawn(async move {
            if !wallet.await_mint_quote_paid(&mint_url, &quote_id, timeout).await? {
                return Ok(false);
            }
            let _guard = wallet.lock.lock().await;
            let minted = wallet.mint_from_quote(&mint_url, &quote_id, amount, &unit).await?;
            wallet
                .publish_history(Direction::In, minted, &unit, Vec::new(), Vec::new())
                .await?;
            Ok(true)
        });

        Ok((invoice, task))
    }

    /// Pay a BOLT-11 `invoice`, preferring proofs at `target_mint` (or this
    /// wallet's highest-balance mint), transferring balance in first if the
    /// target can't cover amount + fees on its own.
    #[instrument(skip(self, invoice))]
    pub async fn melt(&self, invoice: &str, target_mint: Option<MintUrl>) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let unit = self.unit.clone();

        let state = self
            .reconstructor()
            .fetch_wallet_state(true, &self.cache, &self.mint_client)
            .await?;

        let target_mint = match target_mint {
            Some(mint) => mint,
            None => state
                .by_mint
                .iter()
                .max_by_key(|(_, &total)| total)
                .map(|(mint, _)| mint.clone())
                .ok_or_else(|| Error::MintError("wallet holds no mint".into()))?,
        };

        let melt_quote = self
            .mint_client
            .create_melt_quote(
                &target_mint,
                MeltQuoteRequest {
                    unit: unit.clone(),
                    request: invoice.to_string(),
                },
            )
            .await?;

        let ppk = self.input_fee_ppk(&target_mint, &unit).await?;
        let base_required = melt_quote.amount.to_sat() + melt_quote.fee_reserve.to_sat();

        let at_target: u64 = state
            .proofs
            .iter()
            .filter(|p| p.mint_url == target_mint && p.unit == unit)
            .map(|p| p.amount.to_sat())
            .sum();
        if at_target < base_required {
            self.transfer_balance_to_mint(base_required - at_target, &target_mint).await?;
        }

        let state = self
            .reconstructor()
            .fetch_wallet_state(false, &self.cache, &self.mint_client)
            .await?;
        let (selected, consumed_event_ids) = Self::select_proofs(&state, &target_mint, &unit, base_required, ppk)?;
        let spent_total: u64 = selected.iter().map(|p| p.amount.to_sat()).sum();

        let paid = self
            .melt_proofs(
                &target_mint,
                &unit,
                &melt_quote.quote,
                melt_quote.fee_reserve.to_sat(),
                &selected,
                consumed_event_ids.clone(),
            )
            .await?;
        if !paid {
            return Err(Error::PaymentFailed("melt did not settle".into()));
        }

        self.publish_history(Direction::Out, spent_total, &unit, Vec::new(), consumed_event_ids)
            .await?;
        Ok(())
    }

    /// Move at least `amount` of value into `target_mint` by melting proofs
    /// from other mints (richest first) to pay mint-quote invoices at
    /// `target_mint`. Stops once cumulative transferred value covers
    /// `amount`; fails if no combination of source mints suffices.
    #[instrument(skip(self))]
    pub async fn transfer_balance_to_mint(&self, amount: u64, target_mint: &MintUrl) -> Result<(), Error> {
        let state = self
            .reconstructor()
            .fetch_wallet_state(true, &self.cache, &self.mint_client)
            .await?;

        let mut sources: Vec<(MintUrl, u64)> = state
            .by_mint
            .iter()
            .filter(|(mint, _)| *mint != target_mint)
            .map(|(mint, total)| (mint.clone(), *total))
            .collect();
        sources.sort_by_key(|&(_, total)| Reverse(total));

        let mut transferred = 0u64;
        for (source_mint, available) in sources {
            if transferred >= amount {
                break;
            }
            let want = (amount - transferred).min(available);
            if want == 0 {
                continue;
            }

            let quote = self
                .mint_client
                .create_mint_quote(
                    target_mint,
                    MintQuoteRequest {
                        amount: Amount::from_sat(want),
                        unit: self.unit.clone(),
                        description: None,
                    },
                )
                .await?;

            let melt_quote = self
                .mint_client
                .create_melt_quote(
                    &source_mint,
                    MeltQuoteRequest {
                        unit: self.unit.clone(),
                        request: quote.request.clone(),
                    },
                )
                .await?;

            let ppk = self.input_fee_ppk(&source_mint, &self.unit).await?;
            let base_required = melt_quote.amount.to_sat() + melt_quote.fee_reserve.to_sat();
            let (selected, consumed) = match Self::select_proofs(&state, &source_mint, &self.unit, base_required, ppk) {
                Ok(pair) => pair,
                Err(_) => continue,
            };

            let paid = self
                .melt_proofs(
                    &source_mint,
                    &self.unit,
                    &melt_quote.quote,
                    melt_quote.fee_reserve.to_sat(),
                    &selected,
                    consumed,
                )
                .await?;
            if !paid {
                continue;
            }

            if !self
                .await_mint_quote_paid(target_mint, &quote.quote, TRANSFER_POLL_TIMEOUT)
                .await?
            {
                continue;
            }
            let minted = self.mint_from_quote(target_mint, &quote.quote, want, &self.unit).await?;
            transferred += minted;
        }

        if transferred < amount {
            return Err(Error::InsufficientBalance {
                needed: amount,
                available: transferred,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_output_count_matches_nut08() {
        assert_eq!(blank_output_count(0), 0);
        assert_eq!(blank_output_count(1), 1);
        assert_eq!(blank_output_count(3), 2);
        assert_eq!(blank_output_count(100), 7);
    }

    #[test]
    fn test_amounts_from_split_sorted_ascending() {
        let split: BTreeMap<u64, u64> = [(8, 1), (2, 2), (1, 1)].into_iter().collect();
        assert_eq!(Wallet::amounts_from_split(&split), vec![1, 2, 2, 8]);
    }
}
