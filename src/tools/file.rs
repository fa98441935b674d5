//! view, ls, write, edit: workspace file tools with path restriction.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::tools::call::ToolCall;
use crate::tools::context::ToolCtx;
use crate::tools::error::ToolError;
use crate::tools::info::ToolInfo;
use crate::tools::registry::{BoxFuture, Tool, parse_params};
use crate::tools::result::ToolResponse;

const DEFAULT_VIEW_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;
const MAX_LS_ENTRIES: usize = 1000;

/// Resolve `path` against the workspace. When `restrict` is true, absolute
/// paths and `..` escapes are rejected. The path need not exist.
pub async fn resolve_path(path: &str, workspace: &Path, restrict: bool) -> Result<PathBuf, String> {
    let path = path.trim();
    if path.is_empty() {
        return Err("path is empty".into());
    }
    let workspace = tokio::fs::canonicalize(workspace)
        .await
        .unwrap_or_else(|_| workspace.to_path_buf());
    let requested = Path::new(path);
    if requested.is_absolute() {
        if restrict {
            return Err("absolute path not allowed when restricted".into());
        }
        return Ok(requested.to_path_buf());
    }
    let mut current = workspace.clone();
    for comp in requested.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => {
                return Err("absolute path not allowed when restricted".into());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !current.pop() || (restrict && !current.starts_with(&workspace)) {
                    return Err("path escapes workspace".into());
                }
            }
            Component::Normal(p) => current.push(p),
        }
    }
    if restrict && !current.starts_with(&workspace) {
        return Err("path escapes workspace".into());
    }
    Ok(current)
}

async fn resolve(ctx: &ToolCtx, path: &str) -> Result<PathBuf, ToolResponse> {
    resolve_path(path, &ctx.workspace, ctx.restrict_to_workspace)
        .await
        .map_err(ToolResponse::error)
}

#[derive(Deserialize)]
struct ViewParams {
    path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: Option<usize>,
}

/// view tool: numbered lines of a text file.
pub struct ViewTool;

impl Tool for ViewTool {
    fn name(&self) -> &str {
        "view"
    }

    fn info(&self) -> ToolInfo {
        ToolInfo::new(
            "view",
            "Read a file from the workspace. Output lines are numbered. Use offset/limit for large files.",
        )
        .param("path", "string", "Path relative to workspace", true)
        .param("offset", "integer", "Line number to start from (0-based)", false)
        .param("limit", "integer", "Maximum number of lines to return (default 2000)", false)
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let p: ViewParams = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            let resolved = match resolve(ctx, &p.path).await {
                Ok(path) => path,
                Err(resp) => return Ok(resp),
            };
            let content = match tokio::fs::read_to_string(&resolved).await {
                Ok(c) => c,
                Err(e) => return Ok(ToolResponse::error(format!("{}: {e}", p.path))),
            };
            let limit = p.limit.unwrap_or(DEFAULT_VIEW_LIMIT).max(1);
            let total = content.lines().count();
            let mut out = String::new();
            for (i, line) in content.lines().enumerate().skip(p.offset).take(limit) {
                let line: String = line.chars().take(MAX_LINE_CHARS).collect();
                out.push_str(&format!("{:>6}|{line}\n", i + 1));
            }
            let end = p.offset.saturating_add(limit);
            if end < total {
                out.push_str(&format!(
                    "\n(File has more lines. Use offset {end} to read beyond line {end}.)\n"
                ));
            }
            Ok(ToolResponse::text(out))
        })
    }
}

#[derive(Deserialize)]
struct LsParams {
    #[serde(default)]
    path: Option<String>,
}

/// ls tool: sorted directory listing; directories carry a trailing `/`.
pub struct LsTool;

impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn info(&self) -> ToolInfo {
        ToolInfo::new(
            "ls",
            "List directory contents in the workspace. Path optional (default workspace root).",
        )
        .param("path", "string", "Directory relative to workspace (optional)", false)
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let p: LsParams = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            let path = p.path.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| ".".into());
            let resolved = match resolve(ctx, &path).await {
                Ok(path) => path,
                Err(resp) => return Ok(resp),
            };
            let mut entries = match tokio::fs::read_dir(&resolved).await {
                Ok(e) => e,
                Err(e) => return Ok(ToolResponse::error(format!("{path}: {e}"))),
            };
            let mut names = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(mut name) = entry.file_name().into_string() else {
                    continue;
                };
                if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                    name.push('/');
                }
                names.push(name);
            }
            names.sort();
            let truncated = names.len() > MAX_LS_ENTRIES;
            names.truncate(MAX_LS_ENTRIES);
            let mut out = names.join("\n");
            if truncated {
                out.push_str(&format!("\n(truncated to {MAX_LS_ENTRIES} entries)"));
            }
            Ok(ToolResponse::text(out))
        })
    }
}

#[derive(Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

/// write tool: create or overwrite a file, creating parent directories.
pub struct WriteTool;

impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn info(&self) -> ToolInfo {
        ToolInfo::new(
            "write",
            "Create or overwrite a file in the workspace with the given content.",
        )
        .param("path", "string", "Path relative to workspace", true)
        .param("content", "string", "Full file content", true)
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let p: WriteParams = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            let resolved = match resolve(ctx, &p.path).await {
                Ok(path) => path,
                Err(resp) => return Ok(resp),
            };
            if let Some(parent) = resolved.parent()
                && let Err(e) = tokio::fs::create_dir_all(parent).await
            {
                return Ok(ToolResponse::error(e.to_string()));
            }
            match tokio::fs::write(&resolved, &p.content).await {
                Ok(()) => Ok(ToolResponse::text(format!(
                    "wrote {} bytes to {}",
                    p.content.len(),
                    p.path
                ))),
                Err(e) => Ok(ToolResponse::error(format!("{}: {e}", p.path))),
            }
        })
    }
}

#[derive(Deserialize)]
struct EditParams {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

/// edit tool: replace an exact snippet. The snippet must be unique unless
/// `replace_all` is set.
pub struct EditTool;

impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn info(&self) -> ToolInfo {
        ToolInfo::new(
            "edit",
            "Replace old_string with new_string in a workspace file. old_string must match exactly once unless replace_all is true.",
        )
        .param("path", "string", "Path relative to workspace", true)
        .param("old_string", "string", "Exact text to replace", true)
        .param("new_string", "string", "Replacement text", true)
        .param("replace_all", "boolean", "Replace every occurrence", false)
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let p: EditParams = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            if p.old_string.is_empty() {
                return Ok(ToolResponse::error("old_string must not be empty"));
            }
            let resolved = match resolve(ctx, &p.path).await {
                Ok(path) => path,
                Err(resp) => return Ok(resp),
            };
            let content = match tokio::fs::read_to_string(&resolved).await {
                Ok(c) => c,
                Err(e) => return Ok(ToolResponse::error(format!("{}: {e}", p.path))),
            };
            let count = content.matches(&p.old_string).count();
            let new_content = match (count, p.replace_all) {
                (0, _) => return Ok(ToolResponse::error("old_string not found in file")),
                (1, _) | (_, true) => content.replace(&p.old_string, &p.new_string),
                (n, false) => {
                    return Ok(ToolResponse::error(format!(
                        "old_string appears {n} times; add context to make it unique or set replace_all"
                    )));
                }
            };
            match tokio::fs::write(&resolved, new_content).await {
                Ok(()) => Ok(ToolResponse::text(format!(
                    "replaced {count} occurrence(s) in {}",
                    p.path
                ))),
                Err(e) => Ok(ToolResponse::error(format!("{}: {e}", p.path))),
            }
        })
    }
}
