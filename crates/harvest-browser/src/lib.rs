//! Browser session lifecycle for JavaScript-rendered sources.
//!
//! Provides the browser-session capability the extraction engine drives
//! ([`BrowserSession`], [`SessionLauncher`]), a Chromium backend with a fixed
//! anti-fingerprinting profile, and the [`SessionManager`] that owns exactly
//! one live session per pipeline run.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod session;

pub use actions::{extract_domain, BrowserSession, SessionLauncher};
pub use engine::{ChromiumLauncher, ChromiumSession};
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use session::{ScrapeSession, SessionManager, SessionState};
