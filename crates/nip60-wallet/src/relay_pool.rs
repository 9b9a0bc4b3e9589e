//! A pool of relay connections sharing one outbound queue, giving the rest
//! of the wallet a single publish/fetch surface over many relays (§4.4, §5).

use std::collections::HashMap;
use std::sync::Arc;

use nostr_sdk::{Event, EventId, Filter, Keys, PublicKey};
use tracing::instrument;

use crate::error::Error;
use crate::event_kinds::TokenEventPayload;
use crate::outbound_queue::{self, OutboundQueue, PublishCallback};
use crate::relay_client::{RelayClient, DEFAULT_FETCH_TIMEOUT};

/// Default priority for a normal publish.
pub const DEFAULT_PRIORITY: i32 = 0;
/// Priority used for publishes the caller wants sent ahead of the backlog.
pub const HIGH_PRIORITY: i32 = 10;

/// Connects to a set of relays, fans publishes out to all of them through a
/// shared [`OutboundQueue`], and deduplicates fetched events by id.
#[derive(Debug)]
pub struct RelayPool {
    relays: Arc<Vec<RelayClient>>,
    queue: Arc<OutboundQueue>,
    processor: tokio::task::JoinHandle<()>,
}

impl Drop for RelayPool {
    fn drop(&mut self) {
        self.processor.abort();
    }
}

impl RelayPool {
    /// Connect to every URL in `relay_urls`, signing as `keys`, and start the
    /// background publish processor.
    #[instrument(skip(keys))]
    pub async fn connect(relay_urls: &[url::Url], keys: Keys) -> Result<Self, Error> {
        let mut relays = Vec::with_capacity(relay_urls.len());
        let mut last_err = None;
        for url in relay_urls {
            let relay = RelayClient::new(url.clone(), keys.clone());
            match relay.connect().await {
                Ok(()) => relays.push(relay),
                Err(err) => {
                    tracing::warn!(relay = %url, error = %err, "failed to connect relay");
                    last_err = Some(err);
                }
            }
        }
        if relays.is_empty() {
            return Err(last_err.unwrap_or(Error::Network("no relays configured".into())));
        }

        let relays = Arc::new(relays);
        let queue = Arc::new(OutboundQueue::default());
        let processor = outbound_queue::spawn_processor(queue.clone(), relays.clone());

        Ok(Self { relays, queue, processor })
    }

    /// Number of relays currently held by the pool.
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// Enqueue `event` for publication across every relay in the pool.
    pub async fn publish(&self, event: Event, priority: i32) {
        self.queue.add(event, priority, None, None).await;
    }

    /// Like [`RelayPool::publish`], but tags the event as carrying token-store
    /// proofs so they remain visible via [`RelayPool::pending_proofs`] until
    /// confirmed.
    pub async fn publish_token_event(
        &self,
        event: Event,
        priority: i32,
        payload: TokenEventPayload,
        callback: Option<PublishCallback>,
    ) {
        self.queue.add(event, priority, Some(payload), callback).await;
    }

    /// Publish `event` immediately, bypassing the queue, and wait for the
    /// outcome. Used for operations that must know the result before
    /// continuing (e.g. publish-then-wait sequences in the wallet engine).
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn publish_now(&self, event: Event) -> Result<bool, Error> {
        Ok(outbound_queue::publish_to_all(&self.relays, event).await)
    }

    /// Fetch events matching `filter` from every relay, deduplicated by id.
    /// The slowest relay bounds the wait, up to `timeout` (or
    /// [`DEFAULT_FETCH_TIMEOUT`] if `None`).
    #[instrument(skip(self, filter))]
    pub async fn fetch_events(
        &self,
        filter: Filter,
        timeout: Option<std::time::Duration>,
    ) -> Result<Vec<Event>, Error> {
        let timeout = timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT);
        let mut by_id: HashMap<EventId, Event> = HashMap::new();
        for relay in self.relays.iter() {
            match relay.fetch_events(filter.clone(), timeout).await {
                Ok(events) => {
                    for event in events {
                        by_id.entry(event.id).or_insert(event);
                    }
                }
                Err(err) => tracing::debug!(relay = %relay.url(), error = %err, "fetch failed"),
            }
        }
        Ok(by_id.into_values().collect())
    }

    /// Fetch every event of the given kinds authored by `pubkey`.
    pub async fn fetch_events_by_author(
        &self,
        pubkey: PublicKey,
        kinds: Vec<nostr_sdk::Kind>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Vec<Event>, Error> {
        let filter = Filter::new().author(pubkey).kinds(kinds);
        self.fetch_events(filter, timeout).await
    }

    /// Token-store payloads still queued but not yet confirmed by any relay,
    /// so the balance reconstructor can count them optimistically.
    pub async fn pending_proofs(&self) -> Vec<TokenEventPayload> {
        self.queue.pending_token_payloads().await
    }

    /// Disconnect every relay in the pool. The pool is unusable afterwards.
    pub async fn disconnect_all(&self) {
        for relay in self.relays.iter() {
            relay.disconnect().await;
        }
    }
}
