//! 任务编排：单个会话的有限状态循环
//!
//! ModelCall -> ParseModel -> (ToolCall -> ParseTool -> ModelCall ...) -> None
//!
//! 每一步只读取账本中上一步写入的条目，并在写入（必要时持久化）后才算完成。
//! 编排器不重试：遇到第一个不可恢复的错误即结束，并恰好产生一条 error 事件；
//! 工具请求用户输入时任务以 Completed 结束，模型的提问随快照入账，下一轮从这里继续。

use std::sync::Arc;

use futures_util::stream::{self, Stream};

use super::error::{AgentError, Interrupt};
use super::events::StreamEvent;
use super::state::{Action, TaskState};
use crate::ledger::{EntryPayload, Ledger, Transcript};
use crate::llm::ModelRouter;
use crate::prompt::{PromptContext, PromptRenderer};
use crate::protocol::{parse, tool_result_turn, UNTITLED};
use crate::tools::ToolCatalog;

pub const DEFAULT_MAX_STEPS: usize = 50;
pub const NO_RESULT: &str = "No result.";

/// 运行时共享的组件；在启动时构建一次，按会话复用
#[derive(Clone)]
pub struct AgentServices {
    pub models: Arc<ModelRouter>,
    pub tools: Arc<ToolCatalog>,
    pub prompt: Arc<dyn PromptRenderer>,
    pub agent_name: String,
    pub allow_interaction: bool,
    pub max_steps: usize,
}

/// create_task 的可选项
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// 覆盖默认模型（需已在 ModelRouter 注册）
    pub model: Option<String>,
    pub use_tool: bool,
    pub extra_context: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            model: None,
            use_tool: true,
            extra_context: None,
        }
    }
}

pub struct TaskManager {
    services: AgentServices,
    ledger: Ledger,
    state: TaskState,
    next_action: Action,
    steps: usize,
    /// 当前步骤的 status 事件已发出
    announced: bool,
    finished: bool,
}

impl TaskManager {
    pub fn new(ledger: Ledger, services: AgentServices) -> Self {
        Self {
            services,
            ledger,
            state: TaskState::Idle,
            next_action: Action::None,
            steps: 0,
            announced: false,
            finished: false,
        }
    }

    pub fn session_id(&self) -> &str {
        self.ledger.session_id()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn next_action(&self) -> Action {
        self.next_action
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    /// 新会话：渲染 system prompt，写入 [system, user]；
    /// 已有历史（恢复的会话）：在最近一次 transcript 后追加 user 消息
    pub async fn create_task(
        &mut self,
        title: &str,
        prompt: &str,
        options: TaskOptions,
    ) -> Result<(), AgentError> {
        if self.state.is_running() {
            return Err(AgentError::InvalidState(
                "a task is already running in this session".to_string(),
            ));
        }

        let transcript = match self.ledger.latest_transcript() {
            None => {
                let ctx = PromptContext {
                    agent_name: self.services.agent_name.clone(),
                    objective: prompt.to_string(),
                    tool_descriptions: self.services.tools.describe_all(),
                    allow_interaction: self.services.allow_interaction,
                    use_tool: options.use_tool,
                    extra_context: options.extra_context.clone(),
                };
                let system = self.services.prompt.render(&ctx)?;
                Transcript::new(options.model)
                    .set_system(system)
                    .with_user(prompt)
            }
            Some(previous) => {
                let next = previous.with_user(prompt);
                match options.model {
                    Some(model) => next.with_model(Some(model)),
                    None => next,
                }
            }
        };
        self.ledger
            .append(title, EntryPayload::Transcript(transcript))
            .await?;

        tracing::info!(session = %self.session_id(), title, "task created");
        self.state = TaskState::Initialized;
        self.next_action = Action::ModelCall;
        self.steps = 0;
        self.announced = false;
        self.finished = false;
        Ok(())
    }

    /// 执行一步，返回下一步动作
    ///
    /// 失败后任务进入 Error，再次调用直接返回 InvalidState；暂停后任务进入 Completed，
    /// 并把模型的提问写入快照，下一轮从这里继续。
    pub async fn step(&mut self) -> Result<Action, Interrupt> {
        if self.state == TaskState::Error {
            return Err(AgentError::InvalidState("task is in error state".to_string()).into());
        }
        if !self.state.is_running() && self.state != TaskState::Initialized {
            return Err(
                AgentError::InvalidState("task is not running or initialized".to_string()).into(),
            );
        }
        match self.advance().await {
            Ok(action) => {
                self.next_action = action;
                Ok(action)
            }
            Err(Interrupt::Pause(question)) => match self.pause().await {
                Ok(()) => Err(Interrupt::Pause(question)),
                Err(err) => {
                    self.state = TaskState::Error;
                    Err(err.into())
                }
            },
            Err(Interrupt::Fail(err)) => {
                self.state = TaskState::Error;
                Err(err.into())
            }
        }
    }

    async fn advance(&mut self) -> Result<Action, Interrupt> {
        self.steps += 1;
        if self.steps > self.services.max_steps {
            return Err(AgentError::InvalidState(format!(
                "task exceeded the maximum of {} steps",
                self.services.max_steps
            ))
            .into());
        }

        tracing::debug!(session = %self.session_id(), action = ?self.next_action, "step");
        match self.next_action {
            Action::ModelCall => self.model_call().await,
            Action::ParseModel => self.parse_model().await,
            Action::ToolCall => self.tool_call().await,
            Action::ParseTool => self.parse_tool().await,
            Action::None => {
                self.state = TaskState::Completed;
                Ok(Action::None)
            }
        }
    }

    /// 等待用户：在最新 transcript 后补上模型的提问，入账并持久化
    async fn pause(&mut self) -> Result<(), AgentError> {
        self.state = TaskState::Completed;
        self.next_action = Action::None;
        let snapshot = match (self.ledger.latest_transcript(), self.latest_content()) {
            (Some(transcript), Some(asked)) => transcript.with_assistant(asked),
            _ => return Ok(()),
        };
        let title = match self.ledger.latest_invocation() {
            Some(invocation) => format!("Waiting for user on {}", invocation.label()),
            None => "Waiting for user".to_string(),
        };
        self.ledger
            .append(title, EntryPayload::Transcript(snapshot))
            .await
    }

    async fn model_call(&mut self) -> Result<Action, Interrupt> {
        self.state = TaskState::RunningModel;
        let transcript = self.require_transcript()?.clone();
        let completions = self.services.models.complete(&transcript).await?;
        let title = completions
            .last()
            .and_then(|c| c.title.clone())
            .unwrap_or_else(|| UNTITLED.to_string());
        self.ledger
            .append(title, EntryPayload::Responses(completions))
            .await?;
        Ok(Action::ParseModel)
    }

    async fn parse_model(&mut self) -> Result<Action, Interrupt> {
        self.state = TaskState::RunningGeneric;
        let Some(content) = self.latest_content() else {
            return Ok(Action::None);
        };
        match parse(&content)?.invocation {
            Some(invocation) => {
                tracing::info!(session = %self.session_id(), tool = %invocation.qualified_name, "parsed tool invocation");
                let title = format!("Prepare to call {}", invocation.label());
                self.ledger
                    .append(title, EntryPayload::Invocation(invocation))
                    .await?;
                Ok(Action::ToolCall)
            }
            None => Ok(Action::None),
        }
    }

    async fn tool_call(&mut self) -> Result<Action, Interrupt> {
        self.state = TaskState::RunningTool;
        let invocation = self
            .ledger
            .latest_invocation()
            .cloned()
            .ok_or_else(|| AgentError::InvalidState("no tool invocation recorded".to_string()))?;
        let result = self.services.tools.execute(&invocation).await?;
        let title = format!("Getting result of {}", invocation.label());
        self.ledger
            .append(title, EntryPayload::ToolResult(result))
            .await?;
        Ok(Action::ParseTool)
    }

    async fn parse_tool(&mut self) -> Result<Action, Interrupt> {
        self.state = TaskState::RunningGeneric;
        let missing = |what: &str| AgentError::InvalidState(format!("no {} recorded", what));
        let invocation = self
            .ledger
            .latest_invocation()
            .cloned()
            .ok_or_else(|| missing("tool invocation"))?;
        let result = self
            .ledger
            .latest_tool_result()
            .map(str::to_string)
            .ok_or_else(|| missing("tool result"))?;

        let mut next = self.require_transcript()?.clone();
        if let Some(content) = self.latest_content() {
            next = next.with_assistant(content);
        }
        let next = next.with_user(tool_result_turn(&invocation, &result));

        let title = format!("Result of {}", invocation.label());
        self.ledger
            .append(title, EntryPayload::Transcript(next))
            .await?;
        Ok(Action::ModelCall)
    }

    fn require_transcript(&self) -> Result<&Transcript, AgentError> {
        self.ledger
            .latest_transcript()
            .ok_or_else(|| AgentError::InvalidState("no prompt transcript recorded".to_string()))
    }

    fn latest_content(&self) -> Option<String> {
        self.ledger
            .latest_responses()
            .and_then(|r| r.last())
            .and_then(|c| c.content.clone())
    }

    /// 正常结束：带上最终回复镜像一次快照，返回最终 assistant 事件
    async fn finish(&mut self) -> StreamEvent {
        self.state = TaskState::Completed;
        let content = self.latest_content();
        let closing = match (self.ledger.latest_transcript(), &content) {
            (Some(transcript), Some(reply)) => Some(transcript.with_assistant(reply.clone())),
            _ => None,
        };
        if let Some(closing) = closing {
            if let Err(e) = self.ledger.mirror(&closing).await {
                self.state = TaskState::Error;
                return self.fail(e.into());
            }
        }
        tracing::info!(session = %self.session_id(), steps = self.steps, "task completed");
        StreamEvent::assistant(self.session_id(), content.unwrap_or_else(|| NO_RESULT.to_string()))
    }

    /// 中断对应的终止事件；状态已由 step 设置
    fn fail(&self, interrupt: Interrupt) -> StreamEvent {
        match interrupt {
            Interrupt::Pause(question) => {
                tracing::info!(session = %self.session_id(), "task paused for user interaction");
                StreamEvent::assistant(
                    self.session_id(),
                    format!("Task paused for user interaction: {}", question),
                )
            }
            Interrupt::Fail(err) => {
                tracing::error!(session = %self.session_id(), error = %err, retryable = err.is_retryable(), "task failed");
                StreamEvent::error(
                    self.session_id(),
                    format!("Task encountered an error: {}", err),
                )
            }
        }
    }

    fn announce(&mut self) -> StreamEvent {
        self.announced = true;
        StreamEvent::status(self.session_id(), self.ledger.title_of_latest())
    }

    /// 事件流的下一条；任务结束后返回 None
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        if self.state == TaskState::Idle {
            self.finished = true;
            self.state = TaskState::Error;
            let err = AgentError::InvalidState("task has not been created".to_string());
            return Some(self.fail(err.into()));
        }
        if !self.announced {
            return Some(self.announce());
        }
        self.announced = false;
        match self.step().await {
            Ok(Action::None) => {
                self.finished = true;
                Some(self.finish().await)
            }
            Ok(_) => Some(self.announce()),
            Err(interrupt) => {
                self.finished = true;
                Some(self.fail(interrupt))
            }
        }
    }

    /// 借用方式驱动任务，结束后仍可检查账本
    pub fn run(&mut self) -> impl Stream<Item = StreamEvent> + Send + '_ {
        stream::unfold(self, |task| async move {
            let event = task.next_event().await?;
            Some((event, task))
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream::unfold(self, |mut task| async move {
            let event = task.next_event().await?;
            Some((event, task))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use crate::ledger::{EntryKind, Role};
    use crate::llm::ScriptedLlmClient;
    use crate::prompt::TemplatePrompt;
    use crate::tools::{LetterCounterTool, UserInteractionTool};
    use futures_util::StreamExt;

    const COUNT_CALL: &str = "<title>Count</title><tool_use><name>letter_counter.count</name>\
        <arguments>{\"letter\": \"r\", \"text\": \"strawberry\"}</arguments></tool_use>";

    fn services(script: Vec<&str>, max_steps: usize) -> AgentServices {
        services_with(Arc::new(ScriptedLlmClient::new(script)), max_steps)
    }

    fn services_with(model: Arc<ScriptedLlmClient>, max_steps: usize) -> AgentServices {
        let mut tools = ToolCatalog::default();
        tools.register(Arc::new(LetterCounterTool::new())).unwrap();
        tools.register(Arc::new(UserInteractionTool::pausing())).unwrap();
        AgentServices {
            models: Arc::new(ModelRouter::new("scripted", model)),
            tools: Arc::new(tools),
            prompt: Arc::new(TemplatePrompt::default()),
            agent_name: "tester".to_string(),
            allow_interaction: false,
            max_steps,
        }
    }

    #[tokio::test]
    async fn stream_without_task_yields_single_error() {
        let mut task = TaskManager::new(Ledger::new("s1"), services(vec![], 10));
        let events: Vec<_> = task.run().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
    }

    #[tokio::test]
    async fn plain_reply_finishes_after_one_model_call() {
        let mut task = TaskManager::new(Ledger::new("s1"), services(vec!["just text"], 10));
        task.create_task("Greeting", "hello", TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(task.state(), TaskState::Initialized);
        assert_eq!(task.next_action(), Action::ModelCall);

        let events: Vec<_> = task.run().collect().await;
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Assistant);
        assert_eq!(last.message, "just text");
        assert_eq!(events[0].message, "Greeting");
        assert_eq!(task.state(), TaskState::Completed);
        assert_eq!(
            task.ledger().kinds(),
            vec![EntryKind::PromptTranscript, EntryKind::ModelResponse]
        );
    }

    #[tokio::test]
    async fn tool_round_appends_result_turn() {
        let mut task = TaskManager::new(
            Ledger::new("s1"),
            services(vec![COUNT_CALL, "<title>Done</title>There are 3."], 10),
        );
        task.create_task("Count", "count r", TaskOptions::default())
            .await
            .unwrap();
        let events: Vec<_> = task.run().collect().await;
        assert_eq!(events.last().unwrap().message, "<title>Done</title>There are 3.");

        let titles: Vec<&str> = task.ledger().entries().iter().map(|e| e.title.as_str()).collect();
        assert!(titles[2].starts_with("Prepare to call letter_counter.count#"));
        assert!(titles[3].starts_with("Getting result of letter_counter.count#"));
        assert!(titles[4].starts_with("Result of letter_counter.count#"));
        assert_eq!(task.ledger().latest_tool_result(), Some("3"));

        let transcript = task.ledger().latest_transcript().unwrap();
        assert_eq!(transcript.len(), 4);
        assert!(transcript.last().unwrap().content.ends_with("Result:\n3"));
    }

    #[tokio::test]
    async fn step_guard_stops_runaway_loops() {
        let mut task = TaskManager::new(
            Ledger::new("s1"),
            services(vec![COUNT_CALL, COUNT_CALL, COUNT_CALL], 3),
        );
        task.create_task("Loop", "count", TaskOptions::default())
            .await
            .unwrap();
        let events: Vec<_> = task.run().collect().await;
        let errors: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("maximum of 3 steps"));
        assert_eq!(task.state(), TaskState::Error);

        let err = task.step().await.unwrap_err();
        assert_eq!(
            err,
            Interrupt::Fail(AgentError::InvalidState("task is in error state".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_step_is_not_silently_retried() {
        let model = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let mut task = TaskManager::new(Ledger::new("s1"), services_with(model.clone(), 10));
        task.create_task("Empty", "hello", TaskOptions::default())
            .await
            .unwrap();

        let first = task.step().await.unwrap_err();
        assert!(matches!(first, Interrupt::Fail(AgentError::Model(_))));
        assert_eq!(task.state(), TaskState::Error);

        let second = task.step().await.unwrap_err();
        assert_eq!(
            second,
            Interrupt::Fail(AgentError::InvalidState("task is in error state".to_string()))
        );
        assert_eq!(model.seen().await.len(), 1);
    }

    #[tokio::test]
    async fn pause_keeps_the_question_for_the_next_turn() {
        let ask = "<title>Ask</title><tool_use>\
            <name>system.user_interaction.ask_followup_question</name>\
            <arguments>{\"question\": \"Which city?\"}</arguments></tool_use>";
        let model = Arc::new(ScriptedLlmClient::new([ask, "Sunny in Paris."]));
        let mut task = TaskManager::new(Ledger::new("s1"), services_with(model.clone(), 10));
        task.create_task("Weather", "weather please", TaskOptions::default())
            .await
            .unwrap();

        let mut paused = None;
        for _ in 0..3 {
            match task.step().await {
                Ok(_) => continue,
                Err(interrupt) => {
                    paused = Some(interrupt);
                    break;
                }
            }
        }
        assert_eq!(paused, Some(Interrupt::Pause("Which city?".to_string())));
        assert_eq!(task.state(), TaskState::Completed);
        let snapshot = task.ledger().latest_transcript().unwrap();
        assert_eq!(snapshot.last().unwrap().content, ask);

        task.create_task("Answer", "Paris", TaskOptions::default())
            .await
            .unwrap();
        let events: Vec<_> = task.run().collect().await;
        assert_eq!(events.last().unwrap().message, "Sunny in Paris.");

        let seen = model.seen().await;
        let roles: Vec<Role> = seen[1].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert!(seen[1][2].content.contains("Which city?"));
        assert_eq!(seen[1][3].content, "Paris");
    }
}
