//! Typed HTTP client over the Cashu mint API.

use cashu_core::{KeysetId, MintUrl, Proof, PublicKey};
use reqwest::Client;
use tracing::instrument;

use crate::error::Error;
use crate::mint_types::*;

/// A pooled HTTP client for one or more mints; the pool itself is shared by
/// all [`MintClient`] handles, matching the engine's single-shared-connector policy.
#[derive(Debug, Clone)]
pub struct MintClient {
    inner: Client,
}

impl Default for MintClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MintClient {
    /// Build a new client over a fresh connection pool.
    pub fn new() -> Self {
        Self {
            inner: Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: url::Url) -> Result<T, Error> {
        let response = self.inner.get(url).send().await?;
        Self::parse_response(response).await
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: url::Url,
        body: &B,
    ) -> Result<T, Error> {
        let response = self.inner.post(url).json(body).send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, Error> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::MintHttp {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| Error::MintHttp {
            status: status.as_u16(),
            body: format!("failed to parse mint response ({e}): {body}"),
        })
    }

    /// `GET /v1/info`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_info(&self, mint_url: &MintUrl) -> Result<MintInfo, Error> {
        let url = mint_url.join_paths(&["v1", "info"])?;
        self.get_json(url).await
    }

    /// `GET /v1/keysets`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_keysets_info(&self, mint_url: &MintUrl) -> Result<Vec<KeysetInfo>, Error> {
        let url = mint_url.join_paths(&["v1", "keysets"])?;
        let response: KeysetResponse = self.get_json(url).await?;
        Ok(response.keysets)
    }

    /// `GET /v1/keys/{id}`, validated per NUT-01.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_keyset(&self, mint_url: &MintUrl, id: KeysetId) -> Result<KeySet, Error> {
        let url = mint_url.join_paths(&["v1", "keys", &id.to_string()])?;
        let response: KeysResponse = self.get_json(url).await?;
        let keyset = response
            .keysets
            .into_iter()
            .next()
            .ok_or_else(|| Error::Core(cashu_core::Error::InvalidKeyset("empty keys response".into())))?;
        validate_keyset(&keyset)?;
        Ok(keyset)
    }

    /// `GET /v1/keys`, every active keyset, each validated per NUT-01.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_keys(&self, mint_url: &MintUrl) -> Result<Vec<KeySet>, Error> {
        let url = mint_url.join_paths(&["v1", "keys"])?;
        let response: KeysResponse = self.get_json(url).await?;
        for keyset in &response.keysets {
            validate_keyset(keyset)?;
        }
        Ok(response.keysets)
    }

    /// `POST /v1/mint/quote/bolt11`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn create_mint_quote(
        &self,
        mint_url: &MintUrl,
        request: MintQuoteRequest,
    ) -> Result<MintQuoteResponse, Error> {
        let url = mint_url.join_paths(&["v1", "mint", "quote", "bolt11"])?;
        self.post_json(url, &request).await
    }

    /// `GET /v1/mint/quote/bolt11/{id}`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_mint_quote(
        &self,
        mint_url: &MintUrl,
        quote_id: &str,
    ) -> Result<MintQuoteResponse, Error> {
        let url = mint_url.join_paths(&["v1", "mint", "quote", "bolt11", quote_id])?;
        self.get_json(url).await
    }

    /// `POST /v1/mint/bolt11`.
    #[instrument(skip(self, outputs), fields(mint_url = %mint_url))]
    pub async fn mint(
        &self,
        mint_url: &MintUrl,
        quote: &str,
        outputs: Vec<cashu_core::BlindedMessage>,
    ) -> Result<MintResponse, Error> {
        let url = mint_url.join_paths(&["v1", "mint", "bolt11"])?;
        let request = MintRequest {
            quote: quote.to_string(),
            outputs,
        };
        self.post_json(url, &request).await
    }

    /// `POST /v1/melt/quote/bolt11`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn create_melt_quote(
        &self,
        mint_url: &MintUrl,
        request: MeltQuoteRequest,
    ) -> Result<MeltQuoteResponse, Error> {
        let url = mint_url.join_paths(&["v1", "melt", "quote", "bolt11"])?;
        self.post_json(url, &request).await
    }

    /// `GET /v1/melt/quote/bolt11/{id}`.
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    pub async fn get_melt_quote(
        &self,
        mint_url: &MintUrl,
        quote_id: &str,
    ) -> Result<MeltQuoteResponse, Error> {
        let url = mint_url.join_paths(&["v1", "melt", "quote", "bolt11", quote_id])?;
        self.get_json(url).await
    }

    /// `POST /v1/melt/bolt11`.
    #[instrument(skip(self, inputs, outputs), fields(mint_url = %mint_url))]
    pub async fn melt(
        &self,
        mint_url: &MintUrl,
        quote: &str,
        inputs: &[Proof],
        outputs: Vec<cashu_core::BlindedMessage>,
    ) -> Result<MeltQuoteResponse, Error> {
        let url = mint_url.join_paths(&["v1", "melt", "bolt11"])?;
        let request = MeltRequest {
            quote: quote.to_string(),
            inputs: inputs.iter().map(WireProof::from).collect(),
            outputs,
        };
        self.post_json(url, &request).await
    }

    /// `POST /v1/swap`.
    #[instrument(skip(self, inputs, outputs), fields(mint_url = %mint_url))]
    pub async fn swap(
        &self,
        mint_url: &MintUrl,
        inputs: &[Proof],
        outputs: Vec<cashu_core::BlindedMessage>,
    ) -> Result<SwapResponse, Error> {
        let url = mint_url.join_paths(&["v1", "swap"])?;
        let request = SwapRequest {
            inputs: inputs.iter().map(WireProof::from).collect(),
            outputs,
        };
        self.post_json(url, &request).await
    }

    /// `POST /v1/checkstate`.
    #[instrument(skip(self, ys), fields(mint_url = %mint_url))]
    pub async fn check_state(
        &self,
        mint_url: &MintUrl,
        ys: Vec<String>,
    ) -> Result<CheckStateResponse, Error> {
        let url = mint_url.join_paths(&["v1", "checkstate"])?;
        self.post_json(url, &CheckStateRequest { ys }).await
    }

    /// `POST /v1/restore`.
    #[instrument(skip(self, outputs), fields(mint_url = %mint_url))]
    pub async fn restore(
        &self,
        mint_url: &MintUrl,
        outputs: Vec<cashu_core::BlindedMessage>,
    ) -> Result<RestoreResponse, Error> {
        let url = mint_url.join_paths(&["v1", "restore"])?;
        self.post_json(url, &RestoreRequest { outputs }).await
    }
}

/// Validate a keys response per NUT-01: every pubkey is 33 compressed bytes
/// with a 0x02/0x03 prefix, and the declared id matches its derivation.
fn validate_keyset(keyset: &KeySet) -> Result<(), Error> {
    for pubkey in keyset.keys.values() {
        let bytes = pubkey.to_bytes();
        if !PublicKey::has_valid_prefix(&bytes) {
            return Err(Error::Core(cashu_core::Error::InvalidKeyset(
                "public key has invalid compressed prefix".into(),
            )));
        }
    }
    let derived = KeysetId::derive(&keyset.keys);
    if derived != keyset.id {
        return Err(Error::Core(cashu_core::Error::InvalidKeyset(format!(
            "declared keyset id {} does not match derived id {derived}",
            keyset.id
        ))));
    }
    Ok(())
}

/// `ceil(proof_count * ppk / 1000)` for one keyset; sum per-keyset results
/// across a multi-keyset input set. Mints without a known fee rate charge 0.
pub fn input_fee(proof_count: u64, ppk: u64) -> u64 {
    (proof_count * ppk).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_input_fee_ceils() {
        assert_eq!(input_fee(1, 0), 0);
        assert_eq!(input_fee(3, 100), 1);
        assert_eq!(input_fee(10, 100), 1);
        assert_eq!(input_fee(11, 100), 2);
        assert_eq!(input_fee(0, 100), 0);
    }

    #[tokio::test]
    async fn get_info_parses_a_successful_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "Test Mint", "version": "Nutshell/0.16"}"#)
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let info = client.get_info(&mint_url).await.unwrap();

        assert_eq!(info.name.as_deref(), Some("Test Mint"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn mint_http_error_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/info")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let err = client.get_info(&mint_url).await.unwrap_err();

        match err {
            Error::MintHttp { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("expected MintHttp, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn check_state_reports_spent_proofs() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkstate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"states": [{"Y": "abc123", "state": "SPENT"}]}"#)
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let response = client.check_state(&mint_url, vec!["abc123".to_string()]).await.unwrap();

        assert_eq!(response.states.len(), 1);
        assert_eq!(response.states[0].state, ProofState::Spent);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_keys_rejects_a_keyset_whose_declared_id_does_not_match_its_derivation() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"keysets": [{"id": "00ffffffffffffff", "unit": "sat", "keys": {"1": "02194603ffa36356f4a56b7df9371fc3192472351453ec7398b8da8117e7c3e104"}}]}"#;
        let mock = server
            .mock("GET", "/v1/keys")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let mint_url = MintUrl::from_str(&server.url()).unwrap();
        let client = MintClient::new();
        let err = client.get_keys(&mint_url).await.unwrap_err();

        assert!(matches!(err, Error::Core(cashu_core::Error::InvalidKeyset(_))));
        mock.assert_async().await;
    }
}
