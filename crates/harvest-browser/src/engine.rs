use crate::actions::{BrowserSession, SessionLauncher};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::stream::{Stream, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pump CDP events until the connection closes. A handler error concerns
/// one message only, so it is logged and the loop continues. Returns the
/// number of errors seen.
async fn drive_handler<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = std::result::Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            tracing::debug!(error = %e, "chromium handler error");
        }
    }
    errors
}

/// Launches headless Chromium sessions.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    chrome_executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    /// Create a launcher from browser settings
    pub fn new(config: &harvest_core::BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            chrome_executable: config.chrome_executable.clone(),
        }
    }

    fn browser_config(&self, fingerprint: &FingerprintConfig) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .viewport(Viewport {
                width: fingerprint.viewport_width,
                height: fingerprint.viewport_height,
                ..Viewport::default()
            })
            .args(fingerprint.launch_args());

        if !self.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(BrowserError::LaunchFailed)
    }
}

#[async_trait::async_trait]
impl SessionLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self, fingerprint: &FingerprintConfig) -> Result<ChromiumSession> {
        let config = self.browser_config(fingerprint)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            drive_handler(&mut handler).await;
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(fingerprint.user_agent.clone())
            .accept_language(fingerprint.accept_language.clone())
            .build()
            .map_err(BrowserError::ChromiumError)?;
        page.execute(user_agent)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            fingerprint.stealth_script(),
        ))
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::debug!(
            headless = self.headless,
            width = fingerprint.viewport_width,
            height = fingerprint.viewport_height,
            "launched chromium session"
        );

        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
        })
    }
}

/// A Chromium browser with the single tab used for scraping.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;

        // Scripts returning `undefined` carry no value
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn find_elements(&mut self, selector: &str) -> Result<Vec<String>> {
        let quoted =
            serde_json::to_string(selector).map_err(|e| BrowserError::ScriptError(e.to_string()))?;
        let script =
            format!("Array.from(document.querySelectorAll({quoted})).map(el => el.outerHTML)");

        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?
            .into_value::<Vec<String>>()
            .map_err(|e| BrowserError::ScriptError(e.to_string()))
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn quit(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        // Reap the child process even when the close command failed
        let _ = self.browser.wait().await;
        self.handler_task.abort();

        closed
            .map(|_| ())
            .map_err(|e| BrowserError::SessionCrashed(e.to_string()))
    }
}
