//! 托管工具服务的 HTTP 客户端（search / scrape 共用）
//!
//! POST JSON + Bearer 认证。网络错误、429 与 5xx 按指数退避重试，
//! 重试用尽后返回可重试错误；其余 4xx 直接返回不可重试错误。

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::ToolError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_key: String,
    request_timeout: Duration,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64, max_retries: u32) -> Self {
        let request_timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            request_timeout,
            max_retries,
        }
    }

    /// 覆盖全部尝试与退避等待的总时长（秒），作为工具函数的调用超时
    pub fn budget_secs(&self) -> u64 {
        let attempts = u64::from(self.max_retries) + 1;
        let mut backoff = INITIAL_BACKOFF;
        let mut waits = Duration::ZERO;
        for _ in 0..self.max_retries {
            waits += backoff;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        self.request_timeout.as_secs() * attempts + waits.as_secs() + 1
    }

    async fn post_once(&self, endpoint: &str, payload: &Value) -> Result<Value, (ToolError, bool)> {
        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| (ToolError::retryable(format!("Request failed: {}", e)), true))?;

        let status = resp.status();
        if !status.is_success() {
            let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let err = if transient {
                ToolError::retryable(format!("Service returned HTTP {}", status))
            } else {
                ToolError::failed(format!("Service returned HTTP {}", status))
            };
            return Err((err, transient));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| (ToolError::retryable(format!("Invalid response body: {}", e)), false))
    }

    pub async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value, ToolError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.post_once(endpoint, payload).await {
                Ok(body) => return Ok(body),
                Err((err, transient)) if transient && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(endpoint, attempt, error = %err, "tool service request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err((err, _)) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_covers_every_attempt_and_backoff() {
        assert_eq!(ApiClient::new("k", 10, 0).budget_secs(), 11);
        // 3 次重试：4 × 10s 请求 + 0.5 + 1 + 2 秒退避
        assert_eq!(ApiClient::new("k", 10, 3).budget_secs(), 44);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable() {
        let api = ApiClient::new("k", 1, 0);
        let err = api
            .post_json("http://127.0.0.1:9/search", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { retryable: true, .. }));
    }
}
