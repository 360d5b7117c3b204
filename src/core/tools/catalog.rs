//! The fixed catalog of navigation tools advertised to the model.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Every tool the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    OpenUrl,
    OpenUrlNewTab,
    SearchGoogle,
    SearchYouTube,
    SearchAmazon,
    SearchFlipkart,
}

impl ToolName {
    /// All tools, in the order they are advertised.
    pub const ALL: [ToolName; 6] = [
        ToolName::OpenUrl,
        ToolName::OpenUrlNewTab,
        ToolName::SearchGoogle,
        ToolName::SearchYouTube,
        ToolName::SearchAmazon,
        ToolName::SearchFlipkart,
    ];

    /// Parse a tool name exactly as the model sends it.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::OpenUrl => "openUrl",
            ToolName::OpenUrlNewTab => "openUrlNewTab",
            ToolName::SearchGoogle => "searchGoogle",
            ToolName::SearchYouTube => "searchYouTube",
            ToolName::SearchAmazon => "searchAmazon",
            ToolName::SearchFlipkart => "searchFlipkart",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::OpenUrl => "Open a website in the current tab",
            ToolName::OpenUrlNewTab => "Open a website in a new tab",
            ToolName::SearchGoogle => "Search something on Google",
            ToolName::SearchYouTube => "Search videos on YouTube",
            ToolName::SearchAmazon => "Search a product on Amazon",
            ToolName::SearchFlipkart => "Search a product on Flipkart",
        }
    }

    /// The single required string argument.
    pub fn required_arg(&self) -> &'static str {
        match self {
            ToolName::OpenUrl | ToolName::OpenUrlNewTab => "url",
            _ => "query",
        }
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        let arg = self.required_arg();
        FunctionDeclaration {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": { arg: { "type": "string" } },
                "required": [arg],
            }),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callable function as advertised in the session setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON-schema style parameter spec
    pub parameters: Value,
}

/// Declarations for the whole catalog.
pub fn function_declarations() -> Vec<FunctionDeclaration> {
    ToolName::ALL.iter().map(ToolName::declaration).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_name() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::parse("youtubeSearch"), None);
        assert_eq!(ToolName::parse("OPENURL"), None);
    }

    #[test]
    fn test_declarations() {
        let declarations = function_declarations();
        assert_eq!(declarations.len(), 6);

        let open = &declarations[0];
        assert_eq!(open.name, "openUrl");
        assert_eq!(open.parameters["required"], json!(["url"]));
        assert_eq!(open.parameters["properties"]["url"]["type"], "string");

        let flipkart = &declarations[5];
        assert_eq!(flipkart.name, "searchFlipkart");
        assert_eq!(flipkart.parameters["required"], json!(["query"]));
    }
}
