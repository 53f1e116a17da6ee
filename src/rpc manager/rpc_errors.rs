use thiserror::Error;

/// Errors raised by RPC calls made on behalf of the pipeline
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection, TLS)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Per-call deadline elapsed
    #[error("Timeout after {timeout_ms}ms ({method})")]
    Timeout { method: String, timeout_ms: u64 },

    /// Provider answered HTTP 429 or a JSON-RPC rate-limit error
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    /// Non-success HTTP status other than 429
    #[error("HTTP status {status} (endpoint: {endpoint})")]
    HttpStatus { endpoint: String, status: u16 },

    /// JSON-RPC error object returned by the node
    #[error("RPC response error: {message} (code: {code:?})")]
    RpcResponse { message: String, code: Option<i64> },

    /// Response body could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The rate limiter was closed during shutdown
    #[error("Rate limiter closed")]
    LimiterClosed,
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimited { .. } => true,
            RpcError::HttpStatus { status, .. } => *status >= 500,
            // -32004/-32005/-32014 are "not available yet" style node errors
            RpcError::RpcResponse { code, .. } => matches!(
                code,
                Some(-32004) | Some(-32005) | Some(-32007) | Some(-32009) | Some(-32014)
            ) || code.map_or(false, |c| c <= -32000 && c > -32100),
            RpcError::Malformed(_) => false,
            RpcError::LimiterClosed => false,
        }
    }

    /// True when the provider is throttling us
    pub fn is_throttled(&self) -> bool {
        matches!(self, RpcError::RateLimited { .. })
    }

    /// Classify a JSON-RPC error object
    pub fn from_rpc_error(endpoint: &str, code: Option<i64>, message: &str) -> Self {
        let lowered = message.to_lowercase();
        if code == Some(429)
            || lowered.contains("rate limit")
            || lowered.contains("too many requests")
            || lowered.contains("429")
        {
            return RpcError::RateLimited {
                endpoint: endpoint.to_string(),
            };
        }
        RpcError::RpcResponse {
            message: message.to_string(),
            code,
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return RpcError::Timeout {
                method: "http".to_string(),
                timeout_ms: 0,
            };
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return RpcError::RateLimited {
                    endpoint: endpoint.to_string(),
                };
            }
            return RpcError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return RpcError::Malformed(err.to_string());
        }
        RpcError::Transport {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}
