//! Browser navigation tools the model can call.

pub mod catalog;
pub mod dispatcher;
pub mod navigator;

pub use catalog::{FunctionDeclaration, ToolName, function_declarations};
pub use dispatcher::{ToolDispatcher, ToolResult, normalize_url, search_url};
pub use navigator::{
    Disposition, NavigationError, NavigationTarget, Navigator, RecordingNavigator,
    SystemNavigator,
};
