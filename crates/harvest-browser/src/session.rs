//! Session Manager: single ownership of one live browser session.
//!
//! A run owns exactly one [`ScrapeSession`] at a time. Sessions are reused
//! while healthy, marked failed on timeouts or crashes, and closed before any
//! replacement is launched.

use crate::actions::{extract_domain, BrowserSession, SessionLauncher};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chrono::{DateTime, Utc};
use harvest_core::SessionId;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of a browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Launched, not yet handed out
    Created,
    /// Handed out and believed healthy
    Active,
    /// Timed out or crashed; must be closed before replacement
    Failed,
    /// Resources released
    Closed,
}

/// Handle to one live browser instance plus its lifecycle bookkeeping.
pub struct ScrapeSession<S> {
    id: SessionId,
    state: SessionState,
    created_at: DateTime<Utc>,
    timeout: Duration,
    handle: S,
}

impl<S: BrowserSession> ScrapeSession<S> {
    fn new(handle: S, timeout: Duration) -> Self {
        Self {
            id: SessionId::generate(),
            state: SessionState::Created,
            created_at: Utc::now(),
            timeout,
            handle,
        }
    }

    /// Session identity
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// When the underlying browser was launched
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Navigation timeout configured for this session
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the session may still be handed out
    pub fn is_usable(&self) -> bool {
        matches!(self.state, SessionState::Created | SessionState::Active)
    }

    /// The browser capability behind this session
    pub fn browser(&mut self) -> &mut S {
        &mut self.handle
    }

    /// Navigate using the session's own timeout
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let timeout = self.timeout;
        if let Ok(domain) = extract_domain(url) {
            debug!(session_id = %self.id, domain = %domain, "navigating");
        }
        self.handle.navigate(url, timeout).await
    }
}

/// Owns the run's browser session and decides when a new one is launched.
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    fingerprint: FingerprintConfig,
    navigation_timeout: Duration,
    current: Option<ScrapeSession<L::Session>>,
    launched: usize,
    disposed: usize,
}

impl<L: SessionLauncher> SessionManager<L> {
    /// Create a manager; no browser is started until the first `acquire`
    pub fn new(launcher: L, fingerprint: FingerprintConfig, navigation_timeout: Duration) -> Self {
        Self {
            launcher,
            fingerprint,
            navigation_timeout,
            current: None,
            launched: 0,
            disposed: 0,
        }
    }

    /// Return the current session if it is usable, otherwise close whatever is
    /// left of the previous one and launch a replacement.
    pub async fn acquire(&mut self) -> Result<&mut ScrapeSession<L::Session>> {
        let reusable = self.current.as_ref().is_some_and(ScrapeSession::is_usable);

        if !reusable {
            // A failed session is always closed before its replacement exists
            self.dispose().await;

            let handle = self.launcher.launch(&self.fingerprint).await?;
            let session = ScrapeSession::new(handle, self.navigation_timeout);
            self.launched += 1;
            info!(session_id = %session.id, "browser session created");
            self.current = Some(session);
        }

        let session = self
            .current
            .as_mut()
            .ok_or(BrowserError::SessionUnavailable)?;
        session.state = SessionState::Active;
        Ok(session)
    }

    /// Flag the current session as unusable; the next `acquire` replaces it.
    pub fn mark_failed(&mut self, reason: &str) {
        if let Some(session) = self.current.as_mut() {
            if session.state != SessionState::Closed {
                warn!(session_id = %session.id, reason, "browser session marked failed");
                session.state = SessionState::Failed;
            }
        }
    }

    /// Release the current session. Safe to call repeatedly and on sessions
    /// that already crashed; quit errors are logged, never returned.
    pub async fn dispose(&mut self) {
        let Some(mut session) = self.current.take() else {
            return;
        };

        if session.state == SessionState::Closed {
            return;
        }

        if let Err(e) = session.handle.quit().await {
            debug!(session_id = %session.id, error = %e, "quit failed on disposal");
        }
        session.state = SessionState::Closed;
        self.disposed += 1;
        info!(
            session_id = %session.id,
            lifetime_secs = (Utc::now() - session.created_at).num_seconds(),
            "browser session disposed"
        );
    }

    /// State of the current session, if any
    pub fn current_state(&self) -> Option<SessionState> {
        self.current.as_ref().map(ScrapeSession::state)
    }

    /// Sessions launched over the manager's lifetime
    pub fn sessions_launched(&self) -> usize {
        self.launched
    }

    /// Sessions disposed over the manager's lifetime
    pub fn sessions_disposed(&self) -> usize {
        self.disposed
    }
}
