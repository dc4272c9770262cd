//! JSON-RPC client for Bitcoin-family nodes.
//!
//! The node speaks JSON-RPC 1.0 over HTTP POST with basic auth and no
//! TLS:
//!
//! ```json
//! POST /
//! {"jsonrpc": "1.0", "id": 7, "method": "getblockhash", "params": [123]}
//!
//! Response:
//! {"result": "00000000a1b2...", "error": null, "id": 7}
//! ```
//!
//! RPC-level failures come back with a non-null `error` object, usually
//! alongside HTTP 500.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{Block, NodeRpc, RpcError, RpcMethod};
use crate::config::RpcConfig;

/// HTTP JSON-RPC client for a single node.
///
/// The client is `Send + Sync`; request ids come from an atomic counter.
pub struct RpcClient {
    url: String,
    username: Option<String>,
    password: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Builds a client for the node described by `config`.
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            url: endpoint_url(&config.address),
            username: (!config.username.is_empty()).then(|| config.username.clone()),
            password: config.password.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "1.0",
            id,
            method: method.as_str(),
            params,
        };

        debug!(method = %method, id, "Sending RPC request");

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, Some(&self.password));
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Unauthorized(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: RpcResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(RpcError::Status(status.as_u16())),
            Err(e) => {
                return Err(RpcError::Protocol(format!(
                    "{method}: invalid response body: {e}"
                )))
            }
        };

        parsed.into_result(method)
    }
}

/// Turns `host:port` into the node's root URL.
fn endpoint_url(address: &str) -> String {
    format!("http://{}/", address.trim_end_matches('/'))
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn into_result<T: DeserializeOwned>(self, method: RpcMethod) -> Result<T, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }

        let result = self
            .result
            .ok_or_else(|| RpcError::Protocol(format!("{method}: missing result")))?;

        serde_json::from_value(result)
            .map_err(|e| RpcError::Protocol(format!("{method}: unexpected result: {e}")))
    }
}

impl NodeRpc for RpcClient {
    async fn block_count(&self) -> Result<u64, RpcError> {
        self.call(RpcMethod::GetBlockCount, vec![]).await
    }

    async fn block_hash(&self, height: u64) -> Result<String, RpcError> {
        self.call(RpcMethod::GetBlockHash, vec![json!(height)]).await
    }

    async fn block(&self, hash: &str) -> Result<Block, RpcError> {
        // verbose=false returns the serialized block as hex
        let raw: String = self
            .call(RpcMethod::GetBlock, vec![json!(hash), json!(false)])
            .await?;
        Ok(Block::from_hex(&raw)?)
    }

    async fn connection_count(&self) -> Result<u64, RpcError> {
        self.call(RpcMethod::GetConnectionCount, vec![]).await
    }

    async fn difficulty(&self) -> Result<f64, RpcError> {
        self.call(RpcMethod::GetDifficulty, vec![]).await
    }

    async fn hashes_per_second(&self) -> Result<f64, RpcError> {
        self.call(RpcMethod::GetHashesPerSec, vec![]).await
    }

    async fn network_hashes_per_second(&self) -> Result<f64, RpcError> {
        self.call(RpcMethod::GetNetworkHashPs, vec![]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RpcResponse {
        serde_json::from_str(json).expect("response should parse")
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("127.0.0.1:8332"), "http://127.0.0.1:8332/");
        assert_eq!(endpoint_url("node.local:15678/"), "http://node.local:15678/");
    }

    #[test]
    fn test_client_from_config() {
        let config = RpcConfig {
            address: "10.0.0.5:15678".to_string(),
            username: String::new(),
            ..Default::default()
        };
        let client = RpcClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://10.0.0.5:15678/");
        assert!(client.username.is_none());
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: 3,
            method: RpcMethod::GetBlock.as_str(),
            params: vec![json!("00ff"), json!(false)],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "1.0", "id": 3, "method": "getblock", "params": ["00ff", false]})
        );
    }

    #[test]
    fn test_result_decoding() {
        let count: u64 = parse(r#"{"result": 1234567, "error": null, "id": 1}"#)
            .into_result(RpcMethod::GetBlockCount)
            .unwrap();
        assert_eq!(count, 1234567);

        // Integer hash rates decode into f64 gauges.
        let rate: f64 = parse(r#"{"result": 52000, "error": null, "id": 2}"#)
            .into_result(RpcMethod::GetHashesPerSec)
            .unwrap();
        assert_eq!(rate, 52000.0);
    }

    #[test]
    fn test_node_error() {
        let result: Result<String, _> = parse(
            r#"{"result": null, "error": {"code": -8, "message": "Block height out of range"}, "id": 4}"#,
        )
        .into_result(RpcMethod::GetBlockHash);

        match result {
            Err(RpcError::Node { code, message }) => {
                assert_eq!(code, -8);
                assert_eq!(message, "Block height out of range");
            }
            other => panic!("expected node error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_result_is_protocol_error() {
        let result: Result<f64, _> =
            parse(r#"{"result": null, "error": null, "id": 5}"#).into_result(RpcMethod::GetDifficulty);
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[test]
    fn test_wrong_result_type_is_protocol_error() {
        let result: Result<u64, _> = parse(r#"{"result": "many", "error": null, "id": 6}"#)
            .into_result(RpcMethod::GetConnectionCount);
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }
}
