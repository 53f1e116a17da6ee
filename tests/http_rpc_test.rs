//! JSON-RPC client tests against a mock HTTP server

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use mockito::Matcher;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use mint_sniffer::rpc_manager::{
    Commitment, HttpRpcClient, RateLimitedRpc, RateLimiter, RateLimiterConfig, RpcError, SolanaRpc,
};

fn client(url: String, api_key: Option<&str>) -> HttpRpcClient {
    HttpRpcClient::new(url, api_key.map(str::to_string), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_transaction_sends_bearer_and_params() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer secret-key")
        .match_body(Matcher::PartialJson(json!({
            "method": "getTransaction",
            "params": ["sig-1", {
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": "confirmed"
            }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": { "slot": 7, "meta": { "err": null } } }).to_string())
        .create_async()
        .await;

    let rpc = client(server.url(), Some("secret-key"));
    let tx = rpc
        .get_transaction("sig-1", Commitment::Confirmed)
        .await
        .unwrap()
        .expect("transaction present");
    assert_eq!(tx["slot"], 7);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_null_result_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": null }).to_string())
        .create_async()
        .await;

    let rpc = client(server.url(), None);
    assert!(rpc.get_transaction("missing", Commitment::Confirmed).await.unwrap().is_none());
}

#[tokio::test]
async fn test_http_429_is_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(429)
        .with_body("Too Many Requests")
        .create_async()
        .await;

    let rpc = client(server.url(), None);
    let err = rpc.get_transaction("sig", Commitment::Confirmed).await.unwrap_err();
    assert!(err.is_throttled());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_json_rpc_rate_limit_error_is_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32429, "message": "rate limit exceeded" } })
                .to_string(),
        )
        .create_async()
        .await;

    let rpc = client(server.url(), None);
    let err = rpc.get_transaction("sig", Commitment::Confirmed).await.unwrap_err();
    assert!(matches!(err, RpcError::RateLimited { .. }));
}

#[tokio::test]
async fn test_invalid_params_is_permanent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid param" } }).to_string())
        .create_async()
        .await;

    let rpc = client(server.url(), None);
    let err = rpc.get_transaction("bad", Commitment::Confirmed).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_get_account_info_decodes_base64() {
    let owner = Pubkey::new_unique();
    let address = Pubkey::new_unique();
    let payload = vec![9u8, 8, 7, 6];

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "getAccountInfo",
            "params": [address.to_string(), { "encoding": "base64", "commitment": "processed" }]
        })))
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "context": { "slot": 1 },
                    "value": {
                        "owner": owner.to_string(),
                        "lamports": 5000,
                        "data": [base64::engine::general_purpose::STANDARD.encode(&payload), "base64"],
                        "executable": false,
                        "rentEpoch": 0
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let rpc = client(server.url(), None);
    let account = rpc
        .get_account_info(&address, Commitment::Processed)
        .await
        .unwrap()
        .expect("account present");
    assert_eq!(account.owner, owner);
    assert_eq!(account.lamports, 5000);
    assert_eq!(account.data, payload);
}

#[tokio::test]
async fn test_throttle_pauses_shared_limiter() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/").with_status(429).create_async().await;

    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
        throttle_backoff: Duration::from_millis(300),
        throttle_jitter_max: Duration::from_millis(0),
        ..RateLimiterConfig::default()
    }));
    let rpc = RateLimitedRpc::new(Arc::new(client(server.url(), None)), limiter.clone(), Duration::from_secs(5));

    let err = rpc.get_transaction("sig", Commitment::Confirmed).await.unwrap_err();
    assert!(err.is_throttled());
    assert!(limiter.paused_until().is_some());
    assert_eq!(limiter.in_flight(), 0);
}
