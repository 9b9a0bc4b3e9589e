//! Shared outbound publish queue: a priority queue with batching and bounded
//! retries, plus the pending-token visibility that lets the state
//! reconstructor see not-yet-acknowledged proofs (§4.4).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::Event;
use tokio::sync::{Mutex, Notify};

use crate::event_kinds::TokenEventPayload;
use crate::relay_client::RelayClient;

/// Default number of events published per processor wakeup.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default interval the processor wakes on even with no new signal.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(1);
/// Default retry budget before an event is dropped from the queue.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Callback invoked once an event's publish outcome is known: `(accepted, error)`.
pub type PublishCallback = Box<dyn Fn(bool, Option<String>) + Send + Sync>;

/// An event awaiting publication, with its retry bookkeeping.
pub struct QueuedEvent {
    /// The signed event to publish.
    pub event: Event,
    /// Higher priority is sent first; failed sends are requeued at `priority - 1`.
    pub priority: i32,
    /// Attempts made so far.
    pub retry_count: u32,
    /// Attempts allowed before giving up.
    pub max_retries: u32,
    /// If this event carries token-store proofs, they stay visible to the
    /// state reconstructor as pending until the event is confirmed or dropped.
    pub token_payload: Option<TokenEventPayload>,
    /// Notified with the final outcome.
    pub callback: Option<PublishCallback>,
}

impl std::fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("event_id", &self.event.id.to_hex())
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

/// A priority queue of outbound events with a background batch processor.
#[derive(Debug)]
pub struct OutboundQueue {
    queue: Mutex<VecDeque<QueuedEvent>>,
    notify: Notify,
    pending_tokens: Mutex<std::collections::HashMap<String, TokenEventPayload>>,
    batch_size: usize,
    batch_interval: Duration,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_INTERVAL)
    }
}

impl OutboundQueue {
    /// Build an empty queue with the given batch parameters.
    pub fn new(batch_size: usize, batch_interval: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            pending_tokens: Mutex::new(std::collections::HashMap::new()),
            batch_size,
            batch_interval,
        }
    }

    /// Enqueue `event` at `priority`, optionally exposing `token_payload` as
    /// pending proofs and invoking `callback` once its fate is decided.
    pub async fn add(
        &self,
        event: Event,
        priority: i32,
        token_payload: Option<TokenEventPayload>,
        callback: Option<PublishCallback>,
    ) {
        let event_id = event.id.to_hex();
        if let Some(payload) = &token_payload {
            self.pending_tokens
                .lock()
                .await
                .insert(event_id.clone(), payload.clone());
        }

        let mut queue = self.queue.lock().await;
        queue.push_back(QueuedEvent {
            event,
            priority,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            token_payload,
            callback,
        });
        Self::sort_by_priority(&mut queue);
        drop(queue);
        self.notify.notify_one();
    }

    fn sort_by_priority(queue: &mut VecDeque<QueuedEvent>) {
        let mut as_vec: Vec<QueuedEvent> = queue.drain(..).collect();
        as_vec.sort_by(|a, b| b.priority.cmp(&a.priority));
        queue.extend(as_vec);
    }

    /// Pop up to `max_size` events, highest priority first.
    pub async fn get_batch(&self, max_size: usize) -> Vec<QueuedEvent> {
        let mut queue = self.queue.lock().await;
        let take = max_size.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Requeue a failed event at a lower priority if retries remain; otherwise
    /// drop it from the pending-token set and report `false`.
    pub async fn requeue(&self, mut queued: QueuedEvent) -> bool {
        queued.retry_count += 1;
        if queued.retry_count < queued.max_retries {
            queued.priority -= 1;
            let mut queue = self.queue.lock().await;
            queue.push_back(queued);
            Self::sort_by_priority(&mut queue);
            drop(queue);
            self.notify.notify_one();
            true
        } else {
            self.remove(&queued.event.id.to_hex()).await;
            false
        }
    }

    /// Drop an event's pending-token visibility once it's confirmed or abandoned.
    pub async fn remove(&self, event_id: &str) {
        self.pending_tokens.lock().await.remove(event_id);
    }

    /// Wait until the queue has a new entry (or, for the processor loop's own
    /// use, until `batch_interval` elapses -- see [`OutboundQueue::wait_tick`]).
    pub async fn wait_for_signal(&self) {
        self.notify.notified().await;
    }

    /// Wake on whichever comes first: a new entry, or the batch interval.
    pub async fn wait_tick(&self) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(self.batch_interval) => {}
        }
    }

    /// Token-store payloads still queued, exposed so the state reconstructor
    /// can fold optimistic (not-yet-published) proofs into its live set.
    pub async fn pending_token_payloads(&self) -> Vec<TokenEventPayload> {
        self.pending_tokens.lock().await.values().cloned().collect()
    }

    /// Number of events currently queued.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Batch size the processor pops per wakeup.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Publish `event` to every relay in `relays`, returning `true` iff at least
/// one relay accepted it. Each relay is tried independently so one dead relay
/// never blocks the others.
pub async fn publish_to_all(relays: &[RelayClient], event: Event) -> bool {
    let mut accepted = false;
    for relay in relays {
        match relay.publish_event(event.clone()).await {
            Ok(true) => accepted = true,
            Ok(false) => {}
            Err(err) => tracing::debug!(relay = %relay.url(), error = %err, "publish failed"),
        }
    }
    accepted
}

/// Run the queue's background processor against `relays` until the returned
/// handle is dropped or aborted. Pops up to [`OutboundQueue::batch_size`]
/// events per wakeup and publishes each; failures are requeued at a lower
/// priority until [`DEFAULT_MAX_RETRIES`] is exceeded.
pub fn spawn_processor(queue: Arc<OutboundQueue>, relays: Arc<Vec<RelayClient>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            queue.wait_tick().await;
            let batch = queue.get_batch(queue.batch_size()).await;
            for queued in batch {
                let event = queued.event.clone();
                let accepted = publish_to_all(&relays, event).await;
                if accepted {
                    queue.remove(&queued.event.id.to_hex()).await;
                    if let Some(callback) = &queued.callback {
                        callback(true, None);
                    }
                } else {
                    let callback_on_drop = queued.callback.is_some();
                    let event_id = queued.event.id.to_hex();
                    let max_retries = queued.max_retries;
                    let retry_count_before = queued.retry_count;
                    let retried = queue.requeue(queued).await;
                    if !retried && callback_on_drop {
                        tracing::warn!(
                            event_id,
                            retry_count_before,
                            max_retries,
                            "event dropped after exhausting retries"
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_event() -> Event {
        let keys = nostr_sdk::Keys::generate();
        nostr_sdk::EventBuilder::new(nostr_sdk::Kind::Custom(7375), "content")
            .sign_with_keys(&keys)
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_batch_respects_priority() {
        let queue = OutboundQueue::new(10, Duration::from_secs(1));
        queue.add(dummy_event(), 0, None, None).await;
        queue.add(dummy_event(), 5, None, None).await;
        queue.add(dummy_event(), -1, None, None).await;

        let batch = queue.get_batch(10).await;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].priority, 5);
        assert_eq!(batch[2].priority, -1);
    }

    #[tokio::test]
    async fn test_requeue_drops_after_max_retries() {
        let queue = OutboundQueue::new(10, Duration::from_secs(1));
        let mut queued = QueuedEvent {
            event: dummy_event(),
            priority: 0,
            retry_count: 0,
            max_retries: 2,
            token_payload: None,
            callback: None,
        };
        queued.retry_count = 1;
        assert!(queue.requeue(queued).await);

        let mut queued2 = QueuedEvent {
            event: dummy_event(),
            priority: 0,
            retry_count: 1,
            max_retries: 2,
            token_payload: None,
            callback: None,
        };
        queued2.retry_count = 1;
        // second requeue would bump retry_count to 2, which is not < max_retries(2)
        assert!(!queue.requeue(queued2).await);
    }

    #[tokio::test]
    async fn test_pending_tokens_removed_on_success() {
        let queue = OutboundQueue::new(10, Duration::from_secs(1));
        let event = dummy_event();
        let event_id = event.id.to_hex();
        let payload = TokenEventPayload {
            mint: "https://mint.example".into(),
            proofs: vec![],
            del: vec![],
        };
        queue.add(event, 0, Some(payload), None).await;
        assert_eq!(queue.pending_token_payloads().await.len(), 1);
        queue.remove(&event_id).await;
        assert!(queue.pending_token_payloads().await.is_empty());
    }
}
