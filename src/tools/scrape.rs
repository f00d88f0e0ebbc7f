//! Scrape 工具：gensee.scrape.scrape，抓取给定 URL 列表并按查询提取片段
//!
//! 与 search 共用 ApiClient。服务返回以 URL 为键的对象，这里只取其中的值，
//! 按服务给出的顺序组成列表返回给模型。

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ApiClient, FunctionDescriptor, ParamType, Tool, ToolArgs, ToolError, ToolOutput};

pub const DEFAULT_SCRAPE_ENDPOINT: &str = "https://app.gensee.ai/api/search";
/// 服务端单次抓取的超时（秒）
const SERVICE_TIMEOUT_SECS: u64 = 60;

pub struct ScrapeTool {
    api: ApiClient,
    endpoint: String,
    functions: Vec<FunctionDescriptor>,
}

impl ScrapeTool {
    pub fn new(endpoint: impl Into<String>, api: ApiClient) -> Self {
        let budget = api.budget_secs().max(SERVICE_TIMEOUT_SECS + 1);
        Self {
            api,
            endpoint: endpoint.into(),
            functions: vec![FunctionDescriptor::new(
                "scrape",
                "Scrape the given web pages and return the snippets relevant to the query.",
            )
            .required(
                "urls",
                ParamType::Any,
                "The list of URLs to scrape, as a JSON array of strings.",
            )
            .required("query", ParamType::String, "The search query.")
            .timeout_secs(budget)],
        }
    }

    pub async fn scrape(&self, urls: &[String], query: &str) -> Result<Value, ToolError> {
        let payload = json!({
            "query": query,
            "list_urls": urls,
            "digest_all": false,
            "valid_threshold": urls.len(),
            "timeout_seconds": SERVICE_TIMEOUT_SECS,
        });
        let body = self.api.post_json(&self.endpoint, &payload).await?;
        match body {
            Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(_, v)| v).collect())),
            Value::Array(items) => Ok(Value::Array(items)),
            other => Err(ToolError::retryable(format!(
                "Unexpected scrape response: {}",
                other
            ))),
        }
    }
}

/// urls 可以是 JSON 数组，也可以是编码成字符串的数组或单个 URL
pub fn parse_urls(raw: &Value) -> Result<Vec<String>, ToolError> {
    let items = match raw {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => vec![Value::String(s.clone())],
        },
        other => {
            return Err(ToolError::failed(format!(
                "Parameter 'urls' must be a list of strings, got {}",
                other
            )))
        }
    };
    let urls = items
        .into_iter()
        .map(|item| match item {
            Value::String(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
            other => Err(ToolError::failed(format!("Invalid URL in 'urls': {}", other))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if urls.is_empty() {
        return Err(ToolError::failed("Parameter 'urls' must not be empty"));
    }
    Ok(urls)
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        "gensee.scrape"
    }

    fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    async fn invoke(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        if function != "scrape" {
            return Err(ToolError::failed(format!("Unknown function: {}", function)));
        }
        let urls = parse_urls(args.get("urls").unwrap_or(&Value::Null))?;
        let query = args.require_str("query")?.trim();
        tracing::info!(query = %query, urls = urls.len(), "scrape tool request");
        self.scrape(&urls, query).await.map(ToolOutput::Structured)
    }
}
