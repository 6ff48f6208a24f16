//! Sources of chain heads.

use std::time::Duration;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::chain::types::TipSet;

/// Errors that can occur while fetching chain heads.
#[derive(Debug, Error)]
pub enum LensError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC response carried neither result nor error")]
    EmptyResponse,

    #[error("head source error: {0}")]
    Other(String),
}

/// Something that yields successive chain heads.
pub trait HeadSource: Send + Sync + 'static {
    /// Wait for the next head. `Ok(None)` means the source is exhausted.
    fn next_head(&self) -> BoxFuture<'_, Result<Option<TipSet>, LensError>>;
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Polls a Lotus node's `Filecoin.ChainHead` and yields each new head once.
pub struct LotusClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    poll_interval: Duration,
    last_key: Mutex<Option<Vec<String>>>,
}

impl LotusClient {
    pub fn new(url: impl Into<String>, token: Option<String>, poll_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            token,
            poll_interval,
            last_key: Mutex::new(None),
        }
    }

    /// Fetch the current chain head.
    pub async fn chain_head(&self) -> Result<TipSet, LensError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "Filecoin.ChainHead",
            "params": [],
            "id": 1,
        });

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: RpcResponse<TipSet> = request.send().await?.error_for_status()?.json().await?;
        match (response.result, response.error) {
            (_, Some(e)) => Err(LensError::Rpc {
                code: e.code,
                message: e.message,
            }),
            (Some(ts), None) => Ok(ts),
            (None, None) => Err(LensError::EmptyResponse),
        }
    }
}

impl HeadSource for LotusClient {
    fn next_head(&self) -> BoxFuture<'_, Result<Option<TipSet>, LensError>> {
        Box::pin(async move {
            loop {
                let head = self.chain_head().await?;
                let key: Vec<String> = head.key().into_iter().map(str::to_owned).collect();

                let mut last = self.last_key.lock().await;
                if last.as_ref() != Some(&key) {
                    tracing::debug!(height = head.height, "New chain head");
                    *last = Some(key);
                    return Ok(Some(head));
                }
                drop(last);

                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }
}

/// Head source fed through a channel.
///
/// Exhausted once every sender is dropped. Useful for replaying heads obtained
/// elsewhere.
pub struct ChannelSource {
    rx: Mutex<mpsc::UnboundedReceiver<Result<TipSet, LensError>>>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<Result<TipSet, LensError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx: Mutex::new(rx) })
    }
}

impl HeadSource for ChannelSource {
    fn next_head(&self) -> BoxFuture<'_, Result<Option<TipSet>, LensError>> {
        Box::pin(async move { self.rx.lock().await.recv().await.transpose() })
    }
}
