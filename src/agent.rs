//! Agent loop: drives a model through tool-call turns against a registry,
//! recording every message in the run's session. Also the executor used for
//! nested sub-agent runs.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::llm::{LlmError, LlmResponse, Message, ModelClient, Pricing, Role};
use crate::session::{MessageService, NewMessage, NewSession, Session, SessionService, StoreError, Usage};
use crate::tools::{CallContext, ToolCall, ToolCtx, ToolError, ToolRegistry};

pub mod subagent_manager;

pub use subagent_manager::{DelegateOutcome, DelegationError, SubagentManager, SubagentRun, SubagentStatus};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent llm: {0}")]
    Llm(#[from] LlmError),
    #[error("agent store: {0}")]
    Store(#[from] StoreError),
    /// A hard dispatch failure (unknown tool, missing context, dependency).
    #[error("agent dispatch: {0}")]
    Dispatch(#[from] ToolError),
    #[error("agent: cancelled")]
    Cancelled,
}

/// Runs one task to a final textual answer inside an existing session.
/// Must stop promptly once `ctx` is cancelled.
pub trait TaskExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        session: &'a Session,
        task: &'a str,
        registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>>;
}

const MAIN_PREAMBLE: &str = "You are a coding agent working in the user's workspace.\n\
     Use the available tools to inspect and change files, and delegate design or debugging work to the specialised agents when it helps.\n\
     When the task is complete, reply with a concise summary.\n";

const SUBAGENT_PREAMBLE: &str = "You are a subagent. Complete the given task independently and report the result.\n\
     You have access to tools - use them as needed to complete your task.\n\
     After completing the task, provide a clear summary of what was done; that summary is your only output.\n";

/// System prompt: preamble followed by the registry's tool summaries.
pub fn system_prompt(preamble: &str, registry: &ToolRegistry) -> String {
    let mut system = String::from(preamble);
    let summaries = registry.summaries();
    if !summaries.is_empty() {
        system.push_str("\n--- Tools ---\n");
        for line in &summaries {
            system.push_str(line);
            system.push('\n');
        }
    }
    system
}

/// Model-driven loop over a registry. Shared by the top-level agent and by
/// every nested sub-agent run.
pub struct AgentLoop {
    llm: Arc<dyn ModelClient>,
    sessions: Arc<dyn SessionService>,
    messages: Arc<dyn MessageService>,
    model: String,
    max_iterations: u32,
    pricing: Pricing,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn ModelClient>,
        sessions: Arc<dyn SessionService>,
        messages: Arc<dyn MessageService>,
        model: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            llm,
            sessions,
            messages,
            model: model.into(),
            max_iterations,
            pricing: Pricing::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    #[inline]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Top-level entry: create a root session titled `title` and run `task` in it.
    pub async fn run_task(
        &self,
        ctx: &ToolCtx,
        registry: &ToolRegistry,
        title: &str,
        task: &str,
    ) -> Result<(Session, String), AgentError> {
        let session = self.sessions.create(NewSession::root(title)).await?;
        info!(session_id = %session.id, "agent run started");
        let system = system_prompt(MAIN_PREAMBLE, registry);
        let answer = self.run(ctx, &session.id, registry, &system, task).await?;
        let session = self.sessions.get(&session.id).await?;
        Ok((session, answer))
    }

    /// Call the model until it stops requesting tools; return its final content.
    ///
    /// Each assistant turn binds `(session_id, assistant message id)` as the
    /// call context of the tool calls it issued. Sibling calls run concurrently.
    pub async fn run(
        &self,
        ctx: &ToolCtx,
        session_id: &str,
        registry: &ToolRegistry,
        system: &str,
        task: &str,
    ) -> Result<String, AgentError> {
        let tool_defs = registry.to_tool_defs();
        let mut history = vec![Message::system(system), Message::user(task)];
        self.messages
            .create(session_id, NewMessage::new(Role::User, task))
            .await?;

        for iter in 1..=self.max_iterations {
            let response: LlmResponse = tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => return Err(AgentError::Cancelled),
                r = self.llm.chat(&history, &tool_defs, &self.model) => r?,
            };
            debug!(session_id, iter, tool_calls = response.tool_calls.len(), "model turn");
            self.record_usage(session_id, &response).await?;

            let assistant = self
                .messages
                .create(session_id, NewMessage::new(Role::Assistant, response.content.clone()))
                .await?;

            if response.tool_calls.is_empty() {
                let content = response.content.trim();
                return Ok(if content.is_empty() {
                    "(No response)".to_string()
                } else {
                    content.to_string()
                });
            }

            let identity = CallContext::new(session_id, assistant.id.as_str())
                .ok_or(ToolError::MissingContext("session_id and message_id are required"))?;
            let turn_ctx = ctx.with_identity(identity);
            let calls: Vec<ToolCall> = response.tool_calls.iter().map(ToolCall::from).collect();
            history.push(Message::assistant(response.content, response.tool_calls));

            let outcomes = registry.dispatch_all(&turn_ctx, &calls).await;
            for (call, outcome) in calls.iter().zip(outcomes) {
                let resp = outcome.result.inspect_err(|e| {
                    warn!(session_id, tool = %call.name, call_id = %call.id, error = %e, "hard dispatch failure");
                })?;
                self.messages
                    .create(
                        session_id,
                        NewMessage::tool_result(call.id.as_str(), call.name.as_str(), resp.content.clone()),
                    )
                    .await?;
                history.push(Message::tool(outcome.call_id, resp.content));
            }

            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
        }

        Ok("Max iterations reached.".to_string())
    }

    async fn record_usage(&self, session_id: &str, response: &LlmResponse) -> Result<(), AgentError> {
        let Some(usage) = response.usage.as_ref() else {
            return Ok(());
        };
        let delta = Usage {
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
            cost: self.pricing.cost(usage),
        };
        if !delta.is_zero() {
            self.sessions.add_usage(session_id, delta).await?;
        }
        Ok(())
    }
}

impl TaskExecutor for AgentLoop {
    fn execute<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        session: &'a Session,
        task: &'a str,
        registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        Box::pin(async move {
            let system = system_prompt(SUBAGENT_PREAMBLE, registry);
            self.run(ctx, &session.id, registry, &system, task).await
        })
    }
}
