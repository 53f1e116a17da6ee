//! JSON-RPC client for the two reads the pipeline needs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument};

use super::rpc_errors::RpcError;
use super::rpc_limiter::RateLimiter;
use crate::metrics::{metrics, Timer};

/// Commitment level sent with each read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// Raw account as returned by `getAccountInfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// RPC surface used by the pipeline
///
/// `Ok(None)` means the node does not know the transaction or account yet.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// `getTransaction` with `jsonParsed` encoding; returns the raw result object
    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<Value>, RpcError>;

    async fn get_account_info(
        &self,
        address: &Pubkey,
        commitment: Commitment,
    ) -> Result<Option<AccountData>, RpcError>;
}

/// JSON-RPC over HTTPS POST
pub struct HttpRpcClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    request_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RpcError::from_reqwest(&endpoint, e))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.endpoint, e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RpcError::RateLimited {
                endpoint: self.endpoint.clone(),
            });
        }
        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.endpoint, e))?;

        if let Some(error) = payload.get("error") {
            let code = error.get("code").and_then(Value::as_i64);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(RpcError::from_rpc_error(&self.endpoint, code, message));
        }

        match payload.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(RpcError::Malformed(format!("{} response without result", method))),
        }
    }
}

#[async_trait]
impl SolanaRpc for HttpRpcClient {
    #[instrument(skip(self), level = "debug")]
    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<Value>, RpcError> {
        let result = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "maxSupportedTransactionVersion": 0,
                        "commitment": commitment.as_str(),
                    }
                ]),
            )
            .await?;
        Ok((!result.is_null()).then_some(result))
    }

    #[instrument(skip(self, address), fields(address = %address), level = "debug")]
    async fn get_account_info(
        &self,
        address: &Pubkey,
        commitment: Commitment,
    ) -> Result<Option<AccountData>, RpcError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": commitment.as_str() }
                ]),
            )
            .await?;
        parse_account_value(&result)
    }
}

/// Parse the `{context, value}` object of a base64 `getAccountInfo` result
pub fn parse_account_value(result: &Value) -> Result<Option<AccountData>, RpcError> {
    let value = match result.get("value") {
        Some(Value::Null) | None => return Ok(None),
        Some(value) => value,
    };

    let owner = value
        .get("owner")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Pubkey>().ok())
        .ok_or_else(|| RpcError::Malformed("account without owner".to_string()))?;
    let lamports = value.get("lamports").and_then(Value::as_u64).unwrap_or_default();
    let encoded = value
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::Malformed("account data is not base64".to_string()))?;
    let data = BASE64
        .decode(encoded)
        .map_err(|e| RpcError::Malformed(format!("account data: {}", e)))?;

    Ok(Some(AccountData {
        owner,
        lamports,
        data,
    }))
}

/// Routes every call through the shared [`RateLimiter`] with a per-call timeout
///
/// Throttle errors are reported to the limiter before being returned.
pub struct RateLimitedRpc<R: ?Sized> {
    inner: Arc<R>,
    limiter: Arc<RateLimiter>,
    call_timeout: Duration,
}

impl<R: SolanaRpc + ?Sized> RateLimitedRpc<R> {
    pub fn new(inner: Arc<R>, limiter: Arc<RateLimiter>, call_timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            call_timeout,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn guarded<T, Fut>(&self, method: &'static str, call: Fut) -> Result<T, RpcError>
    where
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        let _permit = self.limiter.acquire().await?;
        let timer = Timer::new();
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                method: method.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        };
        timer.observe_duration(&metrics().rpc_latency);

        if let Err(err) = &result {
            metrics().rpc_errors.with_label_values(&[method]).inc();
            if err.is_throttled() {
                self.limiter.report_throttled();
            } else {
                debug!(method, error = %err, "RPC call failed");
            }
        }
        result
    }
}

#[async_trait]
impl<R: SolanaRpc + ?Sized> SolanaRpc for RateLimitedRpc<R> {
    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<Value>, RpcError> {
        self.guarded("getTransaction", self.inner.get_transaction(signature, commitment))
            .await
    }

    async fn get_account_info(
        &self,
        address: &Pubkey,
        commitment: Commitment,
    ) -> Result<Option<AccountData>, RpcError> {
        self.guarded("getAccountInfo", self.inner.get_account_info(address, commitment))
            .await
    }
}
