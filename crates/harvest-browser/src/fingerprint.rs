use harvest_core::BrowserConfig;

/// Script injected before any page script runs, hiding the usual
/// automation giveaways.
const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
";

/// Fixed fingerprint profile applied to every session.
///
/// Every session of a run presents the same desktop browser; the profile is
/// not randomized between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Build the profile from browser settings.
    #[must_use]
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            viewport_width: config.window_width,
            viewport_height: config.window_height,
        }
    }

    /// Chromium command-line switches for this profile.
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!(
                "--window-size={},{}",
                self.viewport_width, self.viewport_height
            ),
            format!("--user-agent={}", self.user_agent),
            format!("--accept-lang={}", self.accept_language),
        ]
    }

    /// Script that suppresses `navigator.webdriver` and friends.
    #[must_use]
    pub fn stealth_script(&self) -> &'static str {
        STEALTH_SCRIPT
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self::from_config(&BrowserConfig::default())
    }
}
