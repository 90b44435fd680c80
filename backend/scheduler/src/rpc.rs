//! JSON-RPC plumbing shared by the collaborator clients.
//!
//! A failed call is surfaced immediately as
//! [`SchedulerError::ExternalCall`] — the scheduler performs no retries and
//! no backoff; chain-local state stays untouched and the caller decides
//! what to do with the failure.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{Result, SchedulerError};

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Issue a single JSON-RPC call and decode the `result` payload.
pub async fn call<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<T> {
    debug!("RPC {method} -> {url}");

    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .send()
        .await
        .map_err(|e| SchedulerError::ExternalCall(format!("{method}: {e}")))?;

    let body: RpcResponse<T> = response
        .json()
        .await
        .map_err(|e| SchedulerError::ExternalCall(format!("{method}: {e}")))?;

    if let Some(err) = body.error {
        return Err(SchedulerError::ExternalCall(format!(
            "{method}: {} {}",
            err.code, err.message
        )));
    }

    body.result
        .ok_or_else(|| SchedulerError::ExternalCall(format!("{method}: empty result")))
}
