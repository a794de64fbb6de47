use std::time::Duration;

use async_trait::async_trait;
use bitcoin::BlockHash;
use reqwest::{StatusCode, Url};
use tracing::{debug, trace};

use crate::error::{ConnectionError, CoreError};
use crate::types::{BurnHeight, HeightPair, SettlementHeight};

use super::HeightResolver;

/// Settlement-chain API client resolving heights by burn block hash.
///
/// Talks to a Stacks-style extended API:
/// `GET {base}/extended/v1/block/by_burn_block_hash/0x{hash}`.
pub struct HttpHeightResolver {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(serde::Deserialize)]
struct BlockByBurnHash {
    height: u32,
    burn_block_height: u32,
    #[serde(default)]
    burn_block_hash: Option<String>,
}

impl HttpHeightResolver {
    /// Create a resolver for `base_url`, which must be an `http://` or
    /// `https://` URL. `timeout` bounds each lookup end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            CoreError::InvalidConfig(format!("invalid heights API url `{base_url}`: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig(format!(
                "unsupported heights API scheme `{}`; expected http or https",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(ConnectionError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    fn lookup_url(&self, block_hash: &BlockHash) -> String {
        format!(
            "{}/extended/v1/block/by_burn_block_hash/0x{block_hash}",
            self.base_url
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> CoreError {
        if err.is_timeout() {
            ConnectionError::Timeout {
                operation: "height lookup",
                after: self.timeout,
            }
            .into()
        } else {
            ConnectionError::Http(err).into()
        }
    }
}

#[async_trait]
impl HeightResolver for HttpHeightResolver {
    async fn resolve(&self, block_hash: &BlockHash) -> Result<HeightPair, CoreError> {
        let url = self.lookup_url(block_hash);
        debug!(%block_hash, %url, "resolving settlement height");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(%block_hash, "block not yet observed by settlement chain");
            return Err(CoreError::UnknownBlock(*block_hash));
        }
        let response = response
            .error_for_status()
            .map_err(|e| self.transport_error(e))?;

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        trace!(%block_hash, %status, body = %body, "height lookup response");

        let block: BlockByBurnHash = serde_json::from_str(&body).map_err(|e| {
            CoreError::InvalidResponse(format!("decode settlement block response: {e}"))
        })?;

        if let Some(reported) = &block.burn_block_hash {
            let reported = reported.trim_start_matches("0x");
            if !reported.eq_ignore_ascii_case(&block_hash.to_string()) {
                return Err(CoreError::InvalidResponse(format!(
                    "asked for burn block {block_hash}, API returned {reported}"
                )));
            }
        }

        Ok(HeightPair {
            burn_height: BurnHeight(block.burn_block_height),
            settlement_height: SettlementHeight(block.height),
        })
    }
}
