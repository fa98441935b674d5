#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolhost::BoxFuture;
use toolhost::agent::{AgentError, SubagentManager, TaskExecutor};
use toolhost::config::{Config, LlmConfig};
use toolhost::session::{InMemorySessions, Session, SessionService, Usage};
use toolhost::tools::{self, ToolCtx, ToolRegistry};

pub struct TestWorkspace {
    // Keep TempDir alive so dir isn't deleted until struct drop
    _tmp: TempDir,
    pub root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let root = tmp.path().to_path_buf();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "pub fn answer() -> u32 {\n    42\n}\n").unwrap();
        Self { _tmp: tmp, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

pub struct MockLlm {
    pub server: MockServer,
}

impl MockLlm {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    pub fn endpoint(&self) -> String {
        self.server.uri()
    }

    /// Mount a mock for /chat/completions that returns the given JSON body.
    pub async fn mock_chat_completion(&self, response_body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&self.server)
            .await;
    }

    /// Mount a reply used only for requests whose body contains `needle`.
    /// Lower `priority` wins when several mocks match.
    pub async fn mock_when_body_contains(
        &self,
        needle: &str,
        priority: u8,
        response_body: serde_json::Value,
    ) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(needle))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .with_priority(priority)
            .mount(&self.server)
            .await;
    }
}

pub fn create_test_config(workspace: &Path, api_base: &str) -> Config {
    Config {
        workspace: Some(workspace.to_string_lossy().into_owned()),
        restrict_to_workspace: Some(true),
        llm: Some(LlmConfig {
            api_base: Some(api_base.to_string()),
            api_key: Some("test-key".to_string()),
            model: Some("test-model".to_string()),
            prompt_cost_per_mtok: Some(1.0),
            completion_cost_per_mtok: Some(2.0),
        }),
        agent: None,
        dispatch: None,
        tools: None,
    }
}

/// Chat completion body with plain content and usage.
pub fn text_reply(content: &str, prompt_tokens: u64, completion_tokens: u64) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

/// Chat completion body requesting one tool call.
pub fn tool_call_reply(
    call_id: &str,
    name: &str,
    arguments: serde_json::Value,
    prompt_tokens: u64,
) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments.to_string() }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": { "prompt_tokens": prompt_tokens, "completion_tokens": 1, "total_tokens": prompt_tokens + 1 }
    })
}

/// Executor that records each task it receives and answers with a fixed reply,
/// charging fixed usage to the child session.
pub struct RecordingExecutor {
    pub sessions: Arc<InMemorySessions>,
    pub reply: String,
    pub tasks: Mutex<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub fn new(sessions: Arc<InMemorySessions>, reply: &str) -> Self {
        Self {
            sessions,
            reply: reply.to_string(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// `(session_id, task)` pairs in call order.
    pub fn tasks(&self) -> Vec<(String, String)> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskExecutor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        _ctx: &'a ToolCtx,
        session: &'a Session,
        task: &'a str,
        registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        Box::pin(async move {
            assert!(!registry.has_delegation(), "child registry must be leaf-only");
            self.tasks
                .lock()
                .unwrap()
                .push((session.id.clone(), task.to_string()));
            let usage = Usage {
                prompt_tokens: 50,
                completion_tokens: 5,
                cost: 0.01,
            };
            self.sessions.add_usage(&session.id, usage).await?;
            Ok(self.reply.clone())
        })
    }
}

/// Executor that never finishes on its own; only cancellation ends it.
pub struct HangingExecutor;

impl TaskExecutor for HangingExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        _session: &'a Session,
        _task: &'a str,
        _registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        Box::pin(async move {
            ctx.cancellation().cancelled().await;
            Err(AgentError::Cancelled)
        })
    }
}

/// Full registry (leaf + delegation) whose sub-agents run on `executor`.
pub fn agent_registry(
    config: &Config,
    sessions: Arc<InMemorySessions>,
    executor: Arc<dyn TaskExecutor>,
) -> (ToolRegistry, Arc<SubagentManager>) {
    let leaf = Arc::new(tools::build_leaf_registry(config).unwrap());
    let manager = Arc::new(SubagentManager::new(sessions, executor, leaf).unwrap());
    let registry = tools::build_agent_registry(config, Arc::clone(&manager)).unwrap();
    (registry, manager)
}

/// Executor that charges `usage` to its child session, then waits for
/// cancellation.
pub struct SpendingExecutor {
    pub sessions: Arc<InMemorySessions>,
    pub usage: Usage,
}

impl TaskExecutor for SpendingExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        session: &'a Session,
        _task: &'a str,
        _registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        Box::pin(async move {
            self.sessions.add_usage(&session.id, self.usage).await?;
            ctx.cancellation().cancelled().await;
            Err(AgentError::Cancelled)
        })
    }
}
