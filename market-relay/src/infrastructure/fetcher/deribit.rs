use crate::application::ports::SnapshotFetcher;
use crate::domain::{FetchError, Snapshot, Symbol};
use crate::infrastructure::config::FetcherConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::runtime::Handle;

/// Order book fetcher for the Deribit public JSON-RPC API
///
/// `GET {base_url}/public/get_order_book?instrument_name=<symbol>[&depth=N]`.
/// The JSON-RPC `result` object is the snapshot, relayed as-is.
///
/// [`SnapshotFetcher::fetch`] drives the async client on the runtime handle
/// captured at construction, so it must be called from a thread that is not
/// itself running async code (pool workers are plain OS threads).
#[derive(Clone)]
pub struct DeribitOrderBookFetcher {
    client: Client,
    base_url: String,
    depth: Option<u32>,
    runtime: Handle,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Snapshot>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl DeribitOrderBookFetcher {
    pub fn new(config: &FetcherConfig, runtime: Handle) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(DeribitOrderBookFetcher {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            depth: config.depth,
            runtime,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, symbol: &Symbol) -> String {
        // Symbol characters are URL-safe by construction.
        let mut url = format!(
            "{}/public/get_order_book?instrument_name={}",
            self.base_url, symbol
        );
        if let Some(depth) = self.depth {
            url.push_str(&format!("&depth={}", depth));
        }
        url
    }

    /// Fetch one order book snapshot
    pub async fn get_order_book(&self, symbol: &Symbol) -> Result<Snapshot, FetchError> {
        let resp = self
            .client
            .get(self.url(symbol))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Self::decode(status, &text)
    }

    fn decode(status: StatusCode, body: &str) -> Result<Snapshot, FetchError> {
        let response: RpcResponse = match serde_json::from_str(body) {
            Ok(response) => response,
            Err(_) if !status.is_success() => {
                return Err(FetchError::Parse(format!("HTTP {}: {}", status, body)));
            }
            Err(e) => return Err(FetchError::Parse(e.to_string())),
        };

        if let Some(error) = response.error {
            return Err(FetchError::Api {
                code: error.code,
                message: error.message,
            });
        }

        match response.result {
            Some(result) if status.is_success() => Ok(result),
            Some(_) => Err(FetchError::Parse(format!("HTTP {}", status))),
            None => Err(FetchError::Parse(
                "response has neither result nor error".to_string(),
            )),
        }
    }
}

impl SnapshotFetcher for DeribitOrderBookFetcher {
    fn fetch(&self, symbol: &Symbol) -> Result<Snapshot, FetchError> {
        self.runtime.block_on(self.get_order_book(symbol))
    }
}
