//! Where navigation side effects actually happen.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors raised by a [`Navigator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Which view a URL opens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Replace the current page
    CurrentView,
    /// Open a new tab or window
    NewView,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::CurrentView => write!(f, "current"),
            Disposition::NewView => write!(f, "new"),
        }
    }
}

/// One navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    pub url: String,
    pub disposition: Disposition,
}

impl NavigationTarget {
    pub fn current(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            disposition: Disposition::CurrentView,
        }
    }

    pub fn new_view(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            disposition: Disposition::NewView,
        }
    }
}

/// Performs navigation. Fire-and-forget: success means the request was
/// handed off, not that the page loaded.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, target: NavigationTarget) -> Result<(), NavigationError>;
}

/// Opens URLs in the desktop's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNavigator;

impl SystemNavigator {
    fn opener(url: &str) -> Command {
        #[cfg(target_os = "macos")]
        {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        }

        #[cfg(target_os = "windows")]
        {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

#[async_trait]
impl Navigator for SystemNavigator {
    async fn navigate(&self, target: NavigationTarget) -> Result<(), NavigationError> {
        let parsed = url::Url::parse(&target.url)
            .map_err(|e| NavigationError::InvalidUrl(format!("{}: {}", target.url, e)))?;

        // The desktop opener decides tab vs window; disposition is advisory here
        let mut child = Self::opener(parsed.as_str())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| NavigationError::LaunchFailed(e.to_string()))?;

        info!(url = %parsed, disposition = %target.disposition, "Opened URL");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(%status, "Browser opener exited with failure")
                }
                Ok(_) => debug!("Browser opener exited"),
                Err(e) => warn!("Failed to wait for browser opener: {}", e),
            }
        });

        Ok(())
    }
}

/// Records navigation requests instead of performing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<NavigationTarget>>>,
    failure: Option<NavigationError>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A navigator whose every request fails with `error`. Nothing is recorded.
    pub fn failing(error: NavigationError) -> Self {
        Self {
            targets: Arc::default(),
            failure: Some(error),
        }
    }

    pub fn targets(&self) -> Vec<NavigationTarget> {
        self.targets.lock().clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, target: NavigationTarget) -> Result<(), NavigationError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        info!(url = %target.url, disposition = %target.disposition, "Navigation recorded");
        self.targets.lock().push(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_navigator_keeps_order() {
        let navigator = RecordingNavigator::new();
        navigator
            .navigate(NavigationTarget::current("https://a.example"))
            .await
            .unwrap();
        navigator
            .navigate(NavigationTarget::new_view("https://b.example"))
            .await
            .unwrap();

        let targets = navigator.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].disposition, Disposition::CurrentView);
        assert_eq!(targets[1].url, "https://b.example");
    }

    #[tokio::test]
    async fn test_failing_navigator() {
        let navigator = RecordingNavigator::failing(NavigationError::LaunchFailed("no display".into()));
        let err = navigator
            .navigate(NavigationTarget::current("https://a.example"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to launch browser: no display");
        assert!(navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn test_system_navigator_rejects_unparseable_url() {
        let result = SystemNavigator
            .navigate(NavigationTarget::current("https://exa mple.com"))
            .await;
        assert!(matches!(result, Err(NavigationError::InvalidUrl(_))));
    }
}
