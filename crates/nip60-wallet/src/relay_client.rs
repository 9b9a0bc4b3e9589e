//! A single relay connection: connect/publish/fetch with the timeouts §5
//! requires, wrapping `nostr-sdk`'s own relay transport.

use std::time::Duration;

use nostr_sdk::{Client, Event, Filter};
use tracing::instrument;
use url::Url;

use crate::error::Error;

/// Connection handshake timeout (§5).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long [`RelayClient::publish_event`] waits for the relay's `OK` frame.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a one-shot event fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One relay's websocket endpoint, reachable via its own `nostr-sdk` client
/// so that a slow or dead relay never blocks another's publish/fetch calls.
#[derive(Debug, Clone)]
pub struct RelayClient {
    url: Url,
    client: Client,
}

impl RelayClient {
    /// Build a relay client bound to a single relay URL and signing identity.
    pub fn new(url: Url, keys: nostr_sdk::Keys) -> Self {
        let client = Client::new(keys);
        Self { url, client }
    }

    /// This relay's URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connect within [`CONNECT_TIMEOUT`], failing with [`Error::ConnectionTimeout`]
    /// if the handshake doesn't complete in time.
    #[instrument(skip(self), fields(relay = %self.url))]
    pub async fn connect(&self) -> Result<(), Error> {
        self.client
            .add_relay(self.url.as_str())
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        tokio::time::timeout(CONNECT_TIMEOUT, self.client.connect())
            .await
            .map_err(|_| Error::ConnectionTimeout)?;
        Ok(())
    }

    /// Publish `event`, waiting up to [`PUBLISH_TIMEOUT`] for the relay's `OK`.
    /// Returns `true` iff the relay accepted it.
    #[instrument(skip(self, event), fields(relay = %self.url, event_id = %event.id))]
    pub async fn publish_event(&self, event: Event) -> Result<bool, Error> {
        let result = tokio::time::timeout(PUBLISH_TIMEOUT, self.client.send_event(event))
            .await
            .map_err(|_| Error::PublishTimeout)?;
        match result {
            Ok(_output) => Ok(true),
            Err(e) => {
                tracing::debug!(error = %e, "relay rejected event");
                Ok(false)
            }
        }
    }

    /// Fetch events matching `filter`, giving up after `timeout`.
    #[instrument(skip(self, filter), fields(relay = %self.url))]
    pub async fn fetch_events(&self, filter: Filter, timeout: Duration) -> Result<Vec<Event>, Error> {
        let events = self
            .client
            .fetch_events_from(vec![self.url.to_string()], filter, timeout)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(events.into_iter().collect())
    }

    /// Disconnect and release the relay connection.
    pub async fn disconnect(&self) {
        let _ = self.client.remove_relay(self.url.as_str()).await;
    }
}
