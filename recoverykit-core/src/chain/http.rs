//! JSON node API client.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AccountInfo, ChainOracle};
use crate::derivation::GlobalParams;
use crate::error::{RecoveryError, RecoveryResult};
use crate::http_request::{validate_base_url, Request};
use crate::types::{BlockHash, CredentialId};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastFinalizedBlock {
    block_hash: BlockHash,
}

/// [`ChainOracle`] talking to a node over HTTPS.
///
/// The snapshot requests (last finalized block and global parameters) retry
/// transient failures; account lookups are sent once so a failing lookup fails
/// the identity scan that issued it.
pub struct HttpChainClient {
    base_url: String,
    request: Request,
}

impl HttpChainClient {
    /// Creates a client for the node at `base_url`.
    ///
    /// # Errors
    /// Returns [`RecoveryError::InvalidInput`] if the URL is malformed or not
    /// HTTPS (plain HTTP is accepted for loopback hosts only).
    pub fn new(base_url: &str) -> RecoveryResult<Self> {
        validate_base_url(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request: Request::new(),
        })
    }

    /// The node's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl ChainOracle for HttpChainClient {
    async fn last_finalized_block_hash(&self) -> RecoveryResult<BlockHash> {
        let url = self.url("/v1/consensus/last-finalized-block");
        let response = self.request.send_with_retry(self.request.get(&url)).await?;
        let block: LastFinalizedBlock = parse_json(&url, ensure_success(&url, response)?).await?;
        log::debug!("last finalized block is {}", block.block_hash);
        Ok(block.block_hash)
    }

    async fn global_params(&self, block_hash: &BlockHash) -> RecoveryResult<GlobalParams> {
        let url = self.url(&format!("/v1/blocks/{block_hash}/global-params"));
        let response = self.request.send_with_retry(self.request.get(&url)).await?;
        parse_json(&url, ensure_success(&url, response)?).await
    }

    async fn account_info(
        &self,
        cred_id: &CredentialId,
        block_hash: &BlockHash,
    ) -> RecoveryResult<Option<AccountInfo>> {
        let url = self.url(&format!(
            "/v1/blocks/{block_hash}/accounts/by-credential/{cred_id}"
        ));
        let response = self.request.send(self.request.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(&url, ensure_success(&url, response)?)
            .await
            .map(Some)
    }
}

fn ensure_success(url: &str, response: Response) -> RecoveryResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RecoveryError::Network {
            url: url.to_string(),
            status: Some(status.as_u16()),
            error: format!("request error with bad status code {}", status.as_u16()),
        })
    }
}

async fn parse_json<T: DeserializeOwned>(url: &str, response: Response) -> RecoveryResult<T> {
    let status = response.status().as_u16();
    response
        .json::<T>()
        .await
        .map_err(|e| RecoveryError::Network {
            url: url.to_string(),
            status: Some(status),
            error: format!("invalid response body: {e}"),
        })
}
