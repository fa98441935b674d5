//! fetch: GET a URL, return the body as text (JSON pretty, HTML stripped, truncated).

use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::call::ToolCall;
use crate::tools::context::ToolCtx;
use crate::tools::error::ToolError;
use crate::tools::info::ToolInfo;
use crate::tools::registry::{BoxFuture, Tool, parse_params};
use crate::tools::result::ToolResponse;

const USER_AGENT: &str = concat!("toolhost/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 15;
const MAX_REDIRECTS: usize = 5;
pub const DEFAULT_MAX_CHARS: u32 = 50_000;

/// script/style blocks, then any tag, then whitespace runs.
static STRIP: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)<script[^>]*>.*?</script>",
        r"(?s)<style[^>]*>.*?</style>",
        "<[^>]+>",
        r"\s+",
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Strip script/style, then tags; unescape common entities; collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut s = html.to_string();
    for re in STRIP.iter() {
        s = re.replace_all(&s, " ").into_owned();
    }
    html_unescape(s.trim())
}

fn html_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// http/https with a host.
fn validate_fetch_url(s: &str) -> Result<reqwest::Url, String> {
    let url = reqwest::Url::parse(s).map_err(|e| e.to_string())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err("only http and https URLs are allowed".to_string());
    }
    if url.host_str().is_none() {
        return Err("URL must have a host".to_string());
    }
    Ok(url)
}

/// First `max` chars of `text` (char boundary safe) and whether it was cut.
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// HTTP client for fetch (timeouts, redirect limit, User-Agent).
pub fn web_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
}

#[derive(Deserialize)]
struct FetchParams {
    url: String,
    #[serde(default)]
    max_chars: Option<u32>,
}

pub struct FetchTool {
    client: Client,
    max_chars: u32,
}

impl FetchTool {
    pub fn new(client: Client, max_chars: u32) -> Self {
        Self { client, max_chars }
    }
}

impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn info(&self) -> ToolInfo {
        ToolInfo::new(
            "fetch",
            "GET a URL and return its body as text. HTML is converted to text; JSON is pretty-printed. Result is truncated to max_chars.",
        )
        .param("url", "string", "URL to fetch (http or https)", true)
        .param("max_chars", "integer", "Optional max characters to return", false)
    }

    fn run<'a>(
        &'a self,
        _ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let p: FetchParams = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            let url = match validate_fetch_url(&p.url) {
                Ok(u) => u,
                Err(e) => return Ok(ToolResponse::error(e)),
            };
            let max_chars = p.max_chars.unwrap_or(self.max_chars) as usize;
            let res = match self.client.get(url.clone()).send().await {
                Ok(r) => r,
                Err(e) => return Ok(ToolResponse::error(e.to_string())),
            };
            let status = res.status();
            let content_type = res
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_lowercase();
            let body = match res.bytes().await {
                Ok(b) => b,
                Err(e) => return Ok(ToolResponse::error(e.to_string())),
            };

            let text = if content_type.contains("application/json") {
                serde_json::from_slice::<Value>(&body)
                    .ok()
                    .and_then(|v| serde_json::to_string_pretty(&v).ok())
                    .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned())
            } else if content_type.contains("text/html") || content_type.contains("application/xhtml") {
                html_to_text(&String::from_utf8_lossy(&body))
            } else {
                String::from_utf8_lossy(&body).into_owned()
            };

            let (out, truncated) = truncate_chars(&text, max_chars);
            let note = if truncated {
                format!(" (truncated to {max_chars} chars)")
            } else {
                String::new()
            };
            let content = format!(
                "URL: {url}\nStatus: {status}\nLength: {} bytes{note}\n\n{out}",
                body.len()
            );
            if status.is_success() {
                Ok(ToolResponse::text(content))
            } else {
                Ok(ToolResponse::error(content))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_script_style_and_tags() {
        let html = "<html><head><script>alert(1)</script><style>.x{}</style></head><body><p>Hello</p>  <b>world &amp; co</b></body></html>";
        let t = html_to_text(html);
        assert!(!t.contains("alert"));
        assert!(!t.contains(".x"));
        assert_eq!(t, "Hello world & co");
    }

    #[test]
    fn validate_fetch_url_schemes() {
        assert!(validate_fetch_url("ftp://example.com").is_err());
        assert!(validate_fetch_url("file:///etc/passwd").is_err());
        assert!(validate_fetch_url("https://").is_err());
        assert!(validate_fetch_url("https://example.com/path").is_ok());
        assert!(validate_fetch_url("http://a.b.c:8080/").is_ok());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("abc", 3), ("abc", false));
    }

    #[tokio::test]
    async fn bad_url_is_response_error() {
        let tool = FetchTool::new(Client::new(), 100);
        let ctx = ToolCtx::new(std::env::temp_dir(), true);
        let r = tool
            .run(&ctx, &ToolCall::new("c1", "fetch", r#"{"url":"ftp://x"}"#))
            .await
            .unwrap();
        assert!(r.is_error);
    }
}
