//! LLM provider: `chat(messages, tools, model) -> (content, tool_calls)`.
//!
//! `ModelClient` is the seam the agent loop drives; `HttpProvider` is the
//! OpenAI-compatible implementation (OpenRouter default). No streaming.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::BoxFuture;
use crate::config::{Config, LlmConfig};

// --- Types ---

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
            Self::Tool => f.write_str("tool"),
        }
    }
}

/// A single chat message (system/user/assistant or tool result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set for tool-result messages (role = Tool).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set for assistant messages that requested tool calls (OpenAI shape).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// OpenAI-style function tool: `type: "function"`, `function: { name, description, parameters }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: ToolFunctionDef,
}

/// Inner function definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionDef {
    pub name: String,
    pub description: String,
    /// JSON schema object, e.g. `{"type":"object","properties":{...}}`.
    pub parameters: serde_json::Value,
}

impl ToolDef {
    /// New function tool (OpenAI shape).
    pub fn function(name: String, description: String, parameters: serde_json::Value) -> Self {
        Self {
            type_: "function".to_string(),
            function: ToolFunctionDef {
                name,
                description,
                parameters,
            },
        }
    }
}

/// One tool call returned by the API (id, name, arguments JSON string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// LLM response: content, tool_calls, finish_reason, optional usage.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
    pub usage: Option<UsageInfo>,
}

/// Failure of one model turn.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm config: {0}")]
    Config(String),
    #[error("llm transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm parse: {0}")]
    Parse(String),
}

/// One model turn: messages and tool schemas in, content and tool calls out.
pub trait ModelClient: Send + Sync {
    fn chat<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDef],
        model: &'a str,
    ) -> BoxFuture<'a, Result<LlmResponse, LlmError>>;
}

/// Per-million-token prices used to turn usage into cost.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub prompt_per_mtok: f64,
    pub completion_per_mtok: f64,
}

impl Pricing {
    pub fn from_config(cfg: &Config) -> Self {
        let llm = cfg.llm.as_ref();
        Self {
            prompt_per_mtok: llm.and_then(|l| l.prompt_cost_per_mtok).unwrap_or(0.0),
            completion_per_mtok: llm.and_then(|l| l.completion_cost_per_mtok).unwrap_or(0.0),
        }
    }

    pub fn cost(&self, usage: &UsageInfo) -> f64 {
        let prompt = usage.prompt_tokens.unwrap_or(0) as f64;
        let completion = usage.completion_tokens.unwrap_or(0) as f64;
        (prompt * self.prompt_per_mtok + completion * self.completion_per_mtok) / 1_000_000.0
    }
}

// --- Wire format ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[ToolDef]>::is_empty")]
    tools: &'a [ToolDef],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl<'a> ChatRequest<'a> {
    /// Tool choice is only sent when there are tools to choose from.
    fn new(model: &'a str, messages: &'a [Message], tools: &'a [ToolDef]) -> Self {
        Self {
            model,
            messages,
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl ChatResponse {
    /// First choice only; a reply without choices is an empty turn.
    fn into_response(self) -> LlmResponse {
        let choice = self.choices.into_iter().next();
        let (message, finish_reason) = match choice {
            Some(c) => (c.message, c.finish_reason.unwrap_or_default()),
            None => (ChoiceMessage::default(), String::new()),
        };
        LlmResponse {
            content: message.content.unwrap_or_default(),
            tool_calls: message.tool_calls.unwrap_or_default(),
            finish_reason,
            usage: self.usage,
        }
    }
}

// --- Provider ---

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct HttpProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Needs `llm.api-key`; `llm.api-base` defaults to OpenRouter.
    pub fn from_config(cfg: &Config) -> Result<Self, LlmError> {
        let llm: &LlmConfig = cfg
            .llm
            .as_ref()
            .ok_or_else(|| LlmError::Config("llm section missing".into()))?;
        let api_key = non_blank(llm.api_key.as_deref())
            .ok_or_else(|| LlmError::Config("llm.api-key required".into()))?
            .to_string();
        let base = non_blank(llm.api_base.as_deref()).unwrap_or(DEFAULT_API_BASE);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            client,
        })
    }

    /// One non-streaming completion.
    pub async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
        model: &str,
    ) -> Result<LlmResponse, LlmError> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest::new(model, messages, tools))
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
        let response = parsed.into_response();
        debug!(
            model,
            finish_reason = %response.finish_reason,
            tool_calls = response.tool_calls.len(),
            "llm response"
        );
        Ok(response)
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.trim().is_empty())
}

impl ModelClient for HttpProvider {
    fn chat<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDef],
        model: &'a str,
    ) -> BoxFuture<'a, Result<LlmResponse, LlmError>> {
        Box::pin(self.send(messages, tools, model))
    }
}
