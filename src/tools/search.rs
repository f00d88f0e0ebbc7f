//! Search 工具：调用托管搜索服务（POST JSON，Bearer 认证）
//!
//! 重试与错误分类见 ApiClient；重试用尽后返回可重试错误，由上层决定是否重新发起任务。

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ApiClient, FunctionDescriptor, ParamType, Tool, ToolArgs, ToolError, ToolOutput};

pub const DEFAULT_ENDPOINT: &str = "https://platform.gensee.ai/tool/search";
const DEFAULT_NUM_RESULTS: i64 = 5;

pub struct SearchTool {
    api: ApiClient,
    endpoint: String,
    functions: Vec<FunctionDescriptor>,
}

impl SearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Self {
        Self::with_client(endpoint, ApiClient::new(api_key, timeout_secs, max_retries))
    }

    /// 与其它托管工具共用同一个 HTTP 客户端；调用超时放宽到覆盖全部重试
    pub fn with_client(endpoint: impl Into<String>, api: ApiClient) -> Self {
        let budget = api.budget_secs();
        Self {
            api,
            endpoint: endpoint.into(),
            functions: vec![FunctionDescriptor::new(
                "search",
                "Perform a web search and return evidence snippets for the query.",
            )
            .required("query", ParamType::String, "The search query.")
            .optional(
                "num_results",
                ParamType::Int,
                "The number of search results to return (default 5).",
            )
            .timeout_secs(budget)],
        }
    }

    pub async fn search(&self, query: &str, num_results: i64) -> Result<Value, ToolError> {
        let payload = json!({
            "query": query,
            "max_results": num_results,
            "mode": "evidence",
        });
        let mut body = self.api.post_json(&self.endpoint, &payload).await?;
        if let Value::Object(map) = &mut body {
            map.insert("query".to_string(), Value::String(query.to_string()));
        }
        Ok(body)
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    async fn invoke(&self, function: &str, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        if function != "search" {
            return Err(ToolError::failed(format!("Unknown function: {}", function)));
        }
        let query = args.require_str("query")?.trim();
        if query.is_empty() {
            return Err(ToolError::failed("Missing query"));
        }
        let num_results = args.int("num_results").unwrap_or(DEFAULT_NUM_RESULTS).max(1);
        tracing::info!(query = %query, num_results, "search tool request");
        self.search(query, num_results)
            .await
            .map(ToolOutput::Structured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolInvocation;
    use crate::tools::ToolCatalog;

    #[tokio::test]
    async fn missing_query_fails_before_request() {
        let mut catalog = ToolCatalog::default();
        // 端口 9 不会被访问：参数校验先失败
        catalog
            .register_tool(SearchTool::new("http://127.0.0.1:9/search", "k", 1, 0))
            .unwrap();
        let inv = ToolInvocation::new("search.search", serde_json::Map::new());
        let err = catalog.execute(&inv).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { retryable: false, .. }));
        assert!(err.to_string().contains("'query'"));
    }

    #[test]
    fn call_timeout_covers_retries() {
        let tool = SearchTool::new("http://127.0.0.1:9/search", "k", 10, 3);
        assert_eq!(
            tool.functions()[0].timeout,
            crate::tools::CallTimeout::Secs(44)
        );
    }
}
