//! 主循环集成测试：脚本化模型驱动完整的 模型/工具 循环

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{FutureExt, StreamExt};
    use gensee_agent::core::{
        AgentError, AgentRuntime, AgentServices, EventKind, Interrupt, StreamEvent, TaskManager,
        TaskOptions, TaskState,
    };
    use gensee_agent::ledger::{EntryKind, Ledger, MemorySessionStore, Role, SqliteSessionStore};
    use gensee_agent::llm::{ModelRouter, ScriptedLlmClient};
    use gensee_agent::prompt::TemplatePrompt;
    use gensee_agent::protocol::{parse_tool_result_turn, ToolInvocation};
    use gensee_agent::tools::{
        coerce, AskCallback, LetterCounterTool, SearchTool, Tool, ToolCatalog, ToolError,
        UserInteractionTool,
    };
    use serde_json::{json, Map};

    const COUNT_CALL: &str = r#"<title>Count</title>
<thinking>I should count the letters with the tool.</thinking>
<tool_use>
<name>letter_counter.count</name>
<arguments>{"letter": "r", "text": "strawberry"}</arguments>
</tool_use>"#;

    fn catalog() -> ToolCatalog {
        let mut tools = ToolCatalog::default();
        tools.register(Arc::new(LetterCounterTool::new())).unwrap();
        tools
            .register(Arc::new(SearchTool::new("http://127.0.0.1:9/search", "", 1, 0)))
            .unwrap();
        tools
            .register(Arc::new(UserInteractionTool::pausing()))
            .unwrap();
        tools
    }

    fn services(model: Arc<ScriptedLlmClient>) -> AgentServices {
        AgentServices {
            models: Arc::new(ModelRouter::new("scripted", model)),
            tools: Arc::new(catalog()),
            prompt: Arc::new(TemplatePrompt::default()),
            agent_name: "tester".to_string(),
            allow_interaction: true,
            max_steps: 20,
        }
    }

    async fn run_task(model: Arc<ScriptedLlmClient>, prompt: &str) -> (Vec<StreamEvent>, TaskManager) {
        let mut task = TaskManager::new(Ledger::new("session-1"), services(model));
        task.create_task("Test task", prompt, TaskOptions::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = task.run().collect().await;
        (events, task)
    }

    const ASK_CITY: &str = r#"<title>Ask city</title><tool_use>
<name>system.user_interaction.ask_followup_question</name>
<arguments>{"question": "Which city?"}</arguments>
</tool_use>"#;

    fn errors(events: &[StreamEvent]) -> Vec<&StreamEvent> {
        events.iter().filter(|e| e.kind == EventKind::Error).collect()
    }

    #[tokio::test]
    async fn counts_letters_through_tool_call() {
        let model = Arc::new(ScriptedLlmClient::new([
            COUNT_CALL,
            "<title>Answer</title>There are 3 r's in strawberry.",
        ]));
        let (events, task) = run_task(model.clone(), "How many r's in strawberry?").await;

        assert_eq!(task.ledger().latest_tool_result(), Some("3"));
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Status && e.message == "Count"));
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Assistant);
        assert_eq!(last.message, "<title>Answer</title>There are 3 r's in strawberry.");
        assert!(errors(&events).is_empty());
        assert_eq!(task.state(), TaskState::Completed);

        // 第二次模型调用能看到工具请求与带 call id 的结果回合
        let seen = model.seen().await;
        assert_eq!(seen.len(), 2);
        let second = &seen[1];
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].content, COUNT_CALL);
        let turn = parse_tool_result_turn(&second[3].content).unwrap();
        assert_eq!(turn.qualified_name, "letter_counter.count");
        assert_eq!(turn.result, "3");
    }

    #[tokio::test]
    async fn ledger_kinds_cycle_and_end_on_model_response() {
        let model = Arc::new(ScriptedLlmClient::new([COUNT_CALL, COUNT_CALL, "done"]));
        let (_, task) = run_task(model, "count twice").await;
        use EntryKind::*;
        assert_eq!(
            task.ledger().kinds(),
            vec![
                PromptTranscript,
                ModelResponse,
                ToolInvocation,
                ToolResult,
                PromptTranscript,
                ModelResponse,
                ToolInvocation,
                ToolResult,
                PromptTranscript,
                ModelResponse,
            ]
        );
    }

    #[tokio::test]
    async fn two_tool_blocks_fail_with_single_error_event() {
        let reply = "<tool_use><name>letter_counter.count</name></tool_use>\
                     <tool_use><name>letter_counter.count</name></tool_use>";
        let model = Arc::new(ScriptedLlmClient::new([reply]));
        let (events, task) = run_task(model, "count").await;

        let errs = errors(&events);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.starts_with("Task encountered an error: Tool parsing error"));
        assert_eq!(events.last().unwrap().kind, EventKind::Error);
        assert_eq!(task.state(), TaskState::Error);
        assert_eq!(
            task.ledger().kinds(),
            vec![EntryKind::PromptTranscript, EntryKind::ModelResponse]
        );
    }

    #[tokio::test]
    async fn reply_without_markup_is_returned_verbatim() {
        let reply = "Strawberry has 3 r's & that's final <no tags>.";
        let model = Arc::new(ScriptedLlmClient::new([reply]));
        let (events, _) = run_task(model, "count").await;

        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Assistant);
        assert_eq!(last.message, reply);
    }

    #[tokio::test]
    async fn missing_required_argument_fails_before_the_call() {
        let reply = r#"<tool_use><name>search.search</name><arguments>{"num_results": 3}</arguments></tool_use>"#;
        let model = Arc::new(ScriptedLlmClient::new([reply]));
        let (events, task) = run_task(model, "search something").await;

        let errs = errors(&events);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("missing required parameter 'query'"));
        assert!(errs[0].message.contains("retryable: false"));
        assert!(task.ledger().latest_tool_result().is_none());
    }

    #[tokio::test]
    async fn follow_up_question_pauses_the_task() {
        let reply = r#"<title>Ask city</title><tool_use>
<name>system.user_interaction.ask_followup_question</name>
<arguments>{"question": "Which city?"}</arguments>
</tool_use>"#;
        let model = Arc::new(ScriptedLlmClient::new([reply]));
        let (events, task) = run_task(model, "weather please").await;

        assert!(errors(&events).is_empty());
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Assistant);
        assert_eq!(last.message, "Task paused for user interaction: Which city?");
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn optional_null_string_is_absent() {
        let catalog = catalog();
        let tool = catalog.get("search").unwrap();
        let descriptor = &tool.functions()[0];
        let mut raw = Map::new();
        raw.insert("query".to_string(), json!("rust"));
        raw.insert("num_results".to_string(), json!("null"));
        let args = coerce(descriptor, &raw).unwrap();
        assert!(!args.contains("num_results"));
        assert_eq!(args.str("query"), Some("rust"));
    }

    #[test]
    fn registration_is_unique_and_description_stable() {
        let mut tools = catalog();
        assert!(tools.register(Arc::new(LetterCounterTool::new())).is_err());
        assert_eq!(tools.describe_all(), tools.describe_all());
        assert!(tools.describe_all().contains("## letter_counter.count"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_non_retryable_error() {
        let catalog = catalog();
        let inv = ToolInvocation::new("nope.run", Map::new());
        let err = catalog.execute(&inv).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Failed { retryable: false, .. }
        ));
    }

    #[tokio::test]
    async fn session_resumes_from_sqlite_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sessions.db");

        let first_model = Arc::new(ScriptedLlmClient::new(["Hello there."]));
        let runtime = AgentRuntime::new(services(first_model))
            .with_store(Arc::new(SqliteSessionStore::open(&db).unwrap()));
        let events = runtime
            .run(Some("chat-1".to_string()), "Greeting", "hi", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(events.last().unwrap().message, "Hello there.");
        drop(runtime);

        // 新进程：重新打开同一数据库
        let second_model = Arc::new(ScriptedLlmClient::new(["You said hi."]));
        let runtime = AgentRuntime::new(services(second_model.clone()))
            .with_store(Arc::new(SqliteSessionStore::open(&db).unwrap()));
        runtime
            .run(Some("chat-1".to_string()), "Follow up", "what did I say?", TaskOptions::default())
            .await
            .unwrap();

        let seen = second_model.seen().await;
        let input = &seen[0];
        assert_eq!(input.len(), 4);
        assert_eq!(input[1].content, "hi");
        assert_eq!(input[2].content, "Hello there.");
        assert_eq!(input[3].content, "what did I say?");
    }

    #[tokio::test]
    async fn same_session_submissions_are_serialized() {
        let model = Arc::new(ScriptedLlmClient::new(["one", "two"]));
        let runtime = AgentRuntime::new(services(model))
            .with_store(Arc::new(MemorySessionStore::new()));
        let session = Some("busy".to_string());

        let first = runtime
            .submit(session.clone(), "First", "a", TaskOptions::default())
            .await
            .unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            runtime.submit(session.clone(), "Second", "b", TaskOptions::default()),
        )
        .await;
        assert!(blocked.is_err());

        let events: Vec<_> = first.collect().await;
        assert_eq!(events.last().unwrap().message, "one");
        let second: Vec<_> = runtime
            .submit(session, "Second", "b", TaskOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(second.last().unwrap().message, "two");
    }

    #[tokio::test]
    async fn dump_path_receives_full_history() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedLlmClient::new([COUNT_CALL, "3"]));
        let runtime = AgentRuntime::new(services(model)).with_dump_path(dir.path().join("history.json"));
        runtime
            .run(None, "Count", "count r", TaskOptions::default())
            .await
            .unwrap();

        let dumped: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("history_"))
            .collect();
        assert_eq!(dumped.len(), 1);
        let raw = std::fs::read_to_string(dumped[0].path()).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries.as_array().unwrap().len(), 6);
        assert_eq!(entries[3]["kind"], "tool_result");
    }

    #[tokio::test]
    async fn paused_session_resumes_with_the_question_in_context() {
        let model = Arc::new(ScriptedLlmClient::new([ASK_CITY, "It is sunny in Paris."]));
        let runtime = AgentRuntime::new(services(model.clone()))
            .with_store(Arc::new(MemorySessionStore::new()));
        let session = Some("weather".to_string());

        let first = runtime
            .run(session.clone(), "Weather", "weather please", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(
            first.last().unwrap().message,
            "Task paused for user interaction: Which city?"
        );

        let second = runtime
            .run(session, "Answer", "Paris", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(second.last().unwrap().message, "It is sunny in Paris.");

        let seen = model.seen().await;
        let input = &seen[1];
        let roles: Vec<Role> = input.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(input[1].content, "weather please");
        assert!(input[2].content.contains("Which city?"));
        assert_eq!(input[3].content, "Paris");
    }

    #[tokio::test]
    async fn step_after_failure_reports_error_state() {
        let model = Arc::new(ScriptedLlmClient::new(["<tool_use><name>broken</name></tool_use>"]));
        let mut task = TaskManager::new(Ledger::new("session-1"), services(model.clone()));
        task.create_task("Broken", "go", TaskOptions::default())
            .await
            .unwrap();

        assert_eq!(task.step().await.unwrap(), gensee_agent::core::Action::ParseModel);
        let err = task.step().await.unwrap_err();
        assert!(matches!(err, Interrupt::Fail(AgentError::Parsing(_))));
        assert_eq!(task.state(), TaskState::Error);

        let again = task.step().await.unwrap_err();
        assert!(matches!(again, Interrupt::Fail(AgentError::InvalidState(_))));
        assert_eq!(model.seen().await.len(), 1);
        assert_eq!(
            task.ledger().kinds(),
            vec![EntryKind::PromptTranscript, EntryKind::ModelResponse]
        );
    }

    #[tokio::test]
    async fn slow_user_answer_survives_short_tool_timeout() {
        let answer: AskCallback = Arc::new(|_question: String| {
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("Paris".to_string())
            }
            .boxed()
        });
        let mut tools = ToolCatalog::new(0);
        tools
            .register(Arc::new(UserInteractionTool::new(Some(answer))))
            .unwrap();
        let model = Arc::new(ScriptedLlmClient::new([ASK_CITY, "Sunny in Paris."]));
        let services = AgentServices {
            tools: Arc::new(tools),
            ..services(model)
        };

        let mut task = TaskManager::new(Ledger::new("session-1"), services);
        task.create_task("Weather", "weather please", TaskOptions::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = task.run().collect().await;

        assert!(errors(&events).is_empty());
        assert_eq!(events.last().unwrap().message, "Sunny in Paris.");
        assert_eq!(task.ledger().latest_tool_result(), Some("Paris"));
    }

    #[tokio::test]
    async fn finished_sessions_leave_the_lock_table() {
        let model = Arc::new(ScriptedLlmClient::new(["one", "two"]));
        let runtime = AgentRuntime::new(services(model));

        let stream = runtime
            .submit(Some("a".to_string()), "First", "x", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(runtime.active_sessions(), 1);
        let _: Vec<_> = stream.collect().await;
        assert_eq!(runtime.active_sessions(), 0);

        runtime
            .run(Some("b".to_string()), "Second", "y", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(runtime.active_sessions(), 0);
    }
}
