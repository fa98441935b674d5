//! Leaf tools through the registry: listing, dispatch, workspace restriction.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolhost::config::ToolsConfig;
use toolhost::tools::{self, ToolCall, ToolCtx, ToolError};

mod common;
use common::{TestWorkspace, create_test_config};

fn call(name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall::new("c1", name, input.to_string())
}

#[test]
fn test_leaf_registry_lists_sorted_schemas() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    assert_eq!(registry.list(), vec!["edit", "fetch", "ls", "view", "write"]);
    assert!(!registry.has_delegation());

    let first = registry.list_tools();
    let second = registry.list_tools();
    assert_eq!(first, second);
    for info in &first {
        let schema = info.schema();
        assert_eq!(schema["type"], "object");
        for req in schema["required"].as_array().unwrap() {
            assert!(schema["properties"].get(req.as_str().unwrap()).is_some());
        }
    }
    let defs = registry.to_tool_defs();
    assert_eq!(defs.len(), 5);
    assert_eq!(defs[0].function.name, "edit");
}

#[tokio::test]
async fn test_write_then_view_through_dispatch() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);

    let w = registry
        .dispatch(&ctx, &call("write", json!({"path": "notes/todo.md", "content": "- ship it\n"})))
        .await
        .unwrap();
    assert!(!w.is_error, "{}", w.content);

    let v = registry
        .dispatch(&ctx, &call("view", json!({"path": "notes/todo.md"})))
        .await
        .unwrap();
    assert_eq!(v.content, "     1|- ship it\n");

    let ls = registry.dispatch(&ctx, &call("ls", json!({}))).await.unwrap();
    assert_eq!(ls.content, "notes/\nsrc/");
}

#[tokio::test]
async fn test_path_escape_is_response_error() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);
    let r = registry
        .dispatch(&ctx, &call("view", json!({"path": "../../etc/passwd"})))
        .await
        .unwrap();
    assert!(r.is_error);
    assert!(r.content.contains("escapes workspace"));
}

#[tokio::test]
async fn test_malformed_input_is_response_error() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);
    let r = registry
        .dispatch(&ctx, &ToolCall::new("c1", "edit", "{not json"))
        .await
        .unwrap();
    assert!(r.is_error);
    assert!(r.content.starts_with("error parsing parameters"));
}

#[tokio::test]
async fn test_unknown_tool_is_hard_failure() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);
    let err = registry.dispatch(&ctx, &call("architect", json!({}))).await.unwrap_err();
    assert_eq!(err, ToolError::UnknownTool("architect".into()));
}

#[tokio::test]
async fn test_fetch_html_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body><p>abcdefghij</p></body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let ws = TestWorkspace::new();
    let mut config = create_test_config(&ws.root, "http://127.0.0.1:1");
    config.tools = Some(ToolsConfig {
        fetch_max_chars: Some(4),
    });
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);
    let r = registry
        .dispatch(&ctx, &call("fetch", json!({"url": format!("{}/page", server.uri())})))
        .await
        .unwrap();
    assert!(!r.is_error, "{}", r.content);
    assert!(r.content.contains("Status: 200"));
    assert!(r.content.contains("(truncated to 4 chars)"));
    assert!(r.content.ends_with("\n\nabcd"));
}

#[tokio::test]
async fn test_fetch_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let registry = tools::build_leaf_registry(&config).unwrap();
    let ctx = ToolCtx::new(&ws.root, true);
    let r = registry
        .dispatch(&ctx, &call("fetch", json!({"url": server.uri()})))
        .await
        .unwrap();
    assert!(r.is_error);
    assert!(r.content.contains("404"));
}

#[test]
fn test_agent_registry_summaries_cover_delegation_tools() {
    let ws = TestWorkspace::new();
    let config = create_test_config(&ws.root, "http://127.0.0.1:1");
    let sessions = std::sync::Arc::new(toolhost::session::InMemorySessions::new());
    let executor = std::sync::Arc::new(common::HangingExecutor);
    let (registry, _) = common::agent_registry(&config, sessions, executor);

    let names: Vec<String> = registry
        .summaries()
        .iter()
        .map(|s| s.split(" - ").next().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["agent", "architect", "debugger", "edit", "fetch", "ls", "view", "write"]
    );
    assert!(registry.summaries()[1].starts_with("architect - "));
}
