use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use std::time::Duration;

/// One live browser instance as seen by the extraction engine.
///
/// Any error returned here is treated by callers as a session-failure signal.
#[async_trait::async_trait]
pub trait BrowserSession: Send {
    /// Navigate to a URL, failing if the load does not finish within `timeout`
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Run a script in the page and return its JSON-serialisable result
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Outer HTML of every element matching a CSS selector, in document order
    async fn find_elements(&mut self, selector: &str) -> Result<Vec<String>>;

    /// Serialized DOM of the current page
    async fn page_source(&mut self) -> Result<String>;

    /// Release the browser; must tolerate being called on a dead session
    async fn quit(&mut self) -> Result<()>;
}

/// Factory for fresh browser sessions.
#[async_trait::async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Concrete session type produced by this launcher
    type Session: BrowserSession;

    /// Start a new browser configured with the given fingerprint profile
    async fn launch(&self, fingerprint: &FingerprintConfig) -> Result<Self::Session>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(|s| s.to_string())
}
