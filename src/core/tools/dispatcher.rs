//! Maps tool invocations from the model onto navigation side effects.
//!
//! Dispatch never fails: unknown tools, bad arguments and navigator errors all
//! come back as a [`ToolResult`] with `success: false`, which is returned to
//! the model like any other result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::catalog::ToolName;
use super::navigator::{NavigationTarget, Navigator};

const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";
const YOUTUBE_SEARCH_URL: &str = "https://www.youtube.com/results";
const AMAZON_SEARCH_URL: &str = "https://www.amazon.in/s";
const FLIPKART_SEARCH_URL: &str = "https://www.flipkart.com/search";

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// The JSON text returned to the model as the function response `result`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"success":false}"#))
    }
}

/// Prefix `https://` unless the URL already carries an http(s) scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Build the results URL for `query` on the site `tool` searches.
///
/// Returns `None` for tools that do not search.
pub fn search_url(tool: ToolName, query: &str) -> Option<String> {
    let (base, param) = match tool {
        ToolName::SearchGoogle => (GOOGLE_SEARCH_URL, "q"),
        ToolName::SearchYouTube => (YOUTUBE_SEARCH_URL, "search_query"),
        ToolName::SearchAmazon => (AMAZON_SEARCH_URL, "k"),
        ToolName::SearchFlipkart => (FLIPKART_SEARCH_URL, "q"),
        ToolName::OpenUrl | ToolName::OpenUrlNewTab => return None,
    };
    url::Url::parse_with_params(base, &[(param, query)])
        .ok()
        .map(String::from)
}

/// Executes catalog tools against a [`Navigator`].
#[derive(Clone)]
pub struct ToolDispatcher {
    navigator: Arc<dyn Navigator>,
}

impl ToolDispatcher {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Run the tool called `name` with the model-supplied `args`.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResult {
        let Some(tool) = ToolName::parse(name) else {
            warn!(tool = name, "Unknown tool requested");
            return ToolResult::failed(format!("Unknown tool: {}", name));
        };

        let key = tool.required_arg();
        let value = match args.get(key).and_then(Value::as_str).map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => {
                warn!(tool = %tool, "Missing required argument '{}'", key);
                return ToolResult::failed(format!("Missing required argument '{}'", key));
            }
        };

        let target = match tool {
            ToolName::OpenUrl => NavigationTarget::current(normalize_url(value)),
            ToolName::OpenUrlNewTab => NavigationTarget::new_view(normalize_url(value)),
            _ => match search_url(tool, value) {
                Some(url) => NavigationTarget::new_view(url),
                None => return ToolResult::failed(format!("Cannot build search URL for {}", tool)),
            },
        };

        debug!(tool = %tool, url = %target.url, "Dispatching tool");
        match self.navigator.navigate(target).await {
            Ok(()) => ToolResult::ok(),
            Err(e) => {
                warn!(tool = %tool, "Navigation failed: {}", e);
                ToolResult::failed(e.to_string())
            }
        }
    }
}
