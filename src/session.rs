//! Session and message services consumed by the agent core.
//!
//! The traits are the contract; `InMemorySessions` / `InMemoryMessages` are
//! process-local implementations with short, per-entity critical sections.

use std::collections::HashMap;
use std::future::ready;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BoxFuture;
use crate::llm::Role;
use crate::tools::context::CallContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Unavailable("lock poisoned".into())
    }
}

/// A conversation. Child sessions created by delegation carry their parent ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub parent_session_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub title: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for `SessionService::create`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub title: String,
    pub parent: Option<CallContext>,
}

impl NewSession {
    pub fn root(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            parent: None,
        }
    }

    /// Session attributed to the turn identified by `parent`.
    pub fn child_of(title: impl Into<String>, parent: &CallContext) -> Self {
        Self {
            title: title.into(),
            parent: Some(parent.clone()),
        }
    }
}

/// Token and cost delta added to a session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl Usage {
    pub fn of(session: &Session) -> Self {
        Self {
            prompt_tokens: session.prompt_tokens,
            completion_tokens: session.completion_tokens,
            cost: session.cost,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.cost == 0.0
    }
}

/// A recorded message of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for `MessageService::create`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

pub trait SessionService: Send + Sync {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Session, StoreError>>;
    fn list(&self) -> BoxFuture<'_, Result<Vec<Session>, StoreError>>;
    fn create(&self, new: NewSession) -> BoxFuture<'_, Result<Session, StoreError>>;
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
    /// Add `usage` to the session's counters atomically.
    fn add_usage<'a>(&'a self, id: &'a str, usage: Usage)
    -> BoxFuture<'a, Result<Session, StoreError>>;
}

pub trait MessageService: Send + Sync {
    fn create<'a>(
        &'a self,
        session_id: &'a str,
        new: NewMessage,
    ) -> BoxFuture<'a, Result<MessageRecord, StoreError>>;
    /// Messages of `session_id` in creation order.
    fn list<'a>(&'a self, session_id: &'a str)
    -> BoxFuture<'a, Result<Vec<MessageRecord>, StoreError>>;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessions {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_sync(&self, id: &str) -> Result<Session, StoreError> {
        let guard = self.sessions.read()?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    fn list_sync(&self) -> Result<Vec<Session>, StoreError> {
        let guard = self.sessions.read()?;
        let mut all: Vec<Session> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    fn create_sync(&self, new: NewSession) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            parent_session_id: new.parent.as_ref().map(|p| p.session_id().to_string()),
            parent_message_id: new.parent.as_ref().map(|p| p.message_id().to_string()),
            title: new.title,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.sessions
            .write()?
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn delete_sync(&self, id: &str) -> Result<(), StoreError> {
        self.sessions
            .write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    fn add_usage_sync(&self, id: &str, usage: Usage) -> Result<Session, StoreError> {
        let mut guard = self.sessions.write()?;
        let session = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))?;
        session.prompt_tokens += usage.prompt_tokens;
        session.completion_tokens += usage.completion_tokens;
        session.cost += usage.cost;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }
}

impl SessionService for InMemorySessions {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Session, StoreError>> {
        Box::pin(ready(self.get_sync(id)))
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Session>, StoreError>> {
        Box::pin(ready(self.list_sync()))
    }

    fn create(&self, new: NewSession) -> BoxFuture<'_, Result<Session, StoreError>> {
        Box::pin(ready(self.create_sync(new)))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(ready(self.delete_sync(id)))
    }

    fn add_usage<'a>(
        &'a self,
        id: &'a str,
        usage: Usage,
    ) -> BoxFuture<'a, Result<Session, StoreError>> {
        Box::pin(ready(self.add_usage_sync(id, usage)))
    }
}

/// Process-local message store keyed by session id.
#[derive(Default)]
pub struct InMemoryMessages {
    by_session: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl InMemoryMessages {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn create_sync(&self, session_id: &str, new: NewMessage) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: new.role,
            content: new.content,
            tool_call_id: new.tool_call_id,
            tool_name: new.tool_name,
            created_at: Utc::now(),
        };
        self.by_session
            .write()?
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn list_sync(&self, session_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let guard = self.by_session.read()?;
        Ok(guard.get(session_id).cloned().unwrap_or_default())
    }
}

impl MessageService for InMemoryMessages {
    fn create<'a>(
        &'a self,
        session_id: &'a str,
        new: NewMessage,
    ) -> BoxFuture<'a, Result<MessageRecord, StoreError>> {
        Box::pin(ready(self.create_sync(session_id, new)))
    }

    fn list<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<MessageRecord>, StoreError>> {
        Box::pin(ready(self.list_sync(session_id)))
    }
}
