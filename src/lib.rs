//! toolhost library: tool contract and dispatcher, sub-agent delegation,
//! agent loop, sessions, LLM client, config.

use std::future::Future;
use std::pin::Pin;

pub mod agent;
pub mod config;
pub mod llm;
pub mod session;
pub mod tools;

/// Boxed future used at trait seams (tools, model client, stores).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
