//! Readiness Detector: decides when a results area has rendered.
//!
//! The source pages give no completion signal, so readiness is a bounded
//! heuristic: a settle pause, optional consent and "show more" clicks, a
//! fixed number of unconditional scroll-to-bottom cycles, then presence
//! lookups for each selector candidate in priority order.

use crate::error::Result;
use crate::pipeline::RawContainer;
use harvest_browser::BrowserSession;
use harvest_site::{ReadinessProfile, SelectorCandidate};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Containers matched by the committed candidate.
#[derive(Debug, Clone)]
pub struct ContainerSet {
    /// Candidate that matched first
    pub candidate: SelectorCandidate,
    /// Every container it matched, in document order
    pub containers: Vec<RawContainer>,
}

/// Outcome of waiting for content.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// A candidate matched at least one element
    Ready(ContainerSet),
    /// No candidate matched within the budget
    NotFound,
}

/// Polls a loaded page for result containers.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    candidates: Vec<SelectorCandidate>,
    settle: Duration,
    scroll_cycles: u32,
    scroll_pause: Duration,
    consent_selector: Option<String>,
    load_more_selector: Option<String>,
    max_load_more_clicks: u32,
    load_more_pause: Duration,
    poll_interval: Duration,
}

impl ReadinessDetector {
    /// Build from a profile's readiness section.
    #[must_use]
    pub fn new(
        candidates: Vec<SelectorCandidate>,
        profile: &ReadinessProfile,
        poll_interval: Duration,
    ) -> Self {
        Self {
            candidates,
            settle: Duration::from_millis(profile.settle_ms),
            scroll_cycles: profile.scroll_cycles,
            scroll_pause: Duration::from_millis(profile.scroll_pause_ms),
            consent_selector: profile.consent_selector.clone(),
            load_more_selector: profile.load_more_selector.clone(),
            max_load_more_clicks: profile.max_load_more_clicks,
            load_more_pause: Duration::from_millis(profile.load_more_pause_ms),
            poll_interval,
        }
    }

    /// Candidates in the order they are tried
    #[must_use]
    pub fn candidates(&self) -> &[SelectorCandidate] {
        &self.candidates
    }

    /// Nudge lazy content into the DOM, then try each candidate in order.
    ///
    /// `timeout` is split evenly across candidates and every candidate is
    /// checked at least once. The first candidate with a non-empty match is
    /// committed to; earlier candidates are not revisited. Browser failures
    /// are returned as errors so the caller can replace the session.
    pub async fn wait_for_content<S>(&self, session: &mut S, timeout: Duration) -> Result<Readiness>
    where
        S: BrowserSession + ?Sized,
    {
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }

        if let Some(selector) = &self.consent_selector {
            match click_if_present(session, selector).await {
                Ok(true) => debug!(selector = %selector, "dismissed consent banner"),
                Ok(false) => {}
                Err(e) => debug!(selector = %selector, error = %e, "consent click failed"),
            }
        }

        if let Some(selector) = &self.load_more_selector {
            self.expand_results(session, selector).await;
        }

        for cycle in 0..self.scroll_cycles {
            session.execute_script(SCROLL_TO_BOTTOM).await?;
            debug!(cycle = cycle + 1, total = self.scroll_cycles, "scrolled to bottom");
            sleep(self.scroll_pause).await;
        }

        let slice = self.slice(timeout);

        for candidate in &self.candidates {
            let deadline = Instant::now() + slice;
            let mut lookups = 0u32;

            loop {
                let elements = session.find_elements(&candidate.selector).await?;
                lookups += 1;

                if !elements.is_empty() {
                    info!(
                        selector = %candidate.selector,
                        priority = candidate.priority,
                        containers = elements.len(),
                        "results area ready"
                    );
                    return Ok(Readiness::Ready(ContainerSet {
                        candidate: candidate.clone(),
                        containers: elements.into_iter().map(RawContainer::from_html).collect(),
                    }));
                }

                if Instant::now() + self.poll_interval > deadline {
                    break;
                }
                sleep(self.poll_interval).await;
            }

            debug!(
                selector = %candidate.selector,
                priority = candidate.priority,
                lookups,
                "candidate matched nothing"
            );
        }

        warn!(
            candidates = self.candidates.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "no selector candidate matched"
        );
        Ok(Readiness::NotFound)
    }

    fn slice(&self, timeout: Duration) -> Duration {
        let count = u32::try_from(self.candidates.len()).unwrap_or(u32::MAX).max(1);
        timeout / count
    }

    /// Click "show more" until it disappears or the click budget runs out.
    async fn expand_results<S>(&self, session: &mut S, selector: &str)
    where
        S: BrowserSession + ?Sized,
    {
        let mut clicks = 0;

        while clicks < self.max_load_more_clicks {
            match click_if_present(session, selector).await {
                Ok(true) => {
                    clicks += 1;
                    sleep(self.load_more_pause).await;
                }
                Ok(false) => break,
                Err(e) => {
                    debug!(selector = %selector, error = %e, "load-more click failed");
                    break;
                }
            }
        }

        if clicks > 0 {
            debug!(selector = %selector, clicks, "expanded result list");
        }
    }
}

/// Click the first element matching `selector`; `false` if none exists.
async fn click_if_present<S>(session: &mut S, selector: &str) -> Result<bool>
where
    S: BrowserSession + ?Sized,
{
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         if (!el) return false; el.click(); return true; }})()"
    );

    let clicked = session.execute_script(&script).await?;
    Ok(clicked.as_bool().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harvest_browser::BrowserError;
    use std::collections::HashMap;

    /// Page whose candidates start matching after a number of lookups.
    #[derive(Default)]
    struct FakePage {
        matches_after: HashMap<String, (u32, usize)>,
        lookups: HashMap<String, u32>,
        scripts: Vec<String>,
        buttons: u32,
    }

    impl FakePage {
        fn matching(mut self, selector: &str, after_lookups: u32, count: usize) -> Self {
            self.matches_after
                .insert(selector.to_string(), (after_lookups, count));
            self
        }

        fn lookups(&self, selector: &str) -> u32 {
            self.lookups.get(selector).copied().unwrap_or(0)
        }

        fn scrolls(&self) -> usize {
            self.scripts.iter().filter(|s| s.contains("scrollTo")).count()
        }
    }

    #[async_trait]
    impl BrowserSession for FakePage {
        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> harvest_browser::Result<()> {
            Ok(())
        }

        async fn execute_script(&mut self, script: &str) -> harvest_browser::Result<serde_json::Value> {
            self.scripts.push(script.to_string());
            if script.contains("querySelector(\"button.more\")") {
                if self.buttons == 0 {
                    return Ok(serde_json::Value::Bool(false));
                }
                self.buttons -= 1;
                return Ok(serde_json::Value::Bool(true));
            }
            Ok(serde_json::Value::Null)
        }

        async fn find_elements(&mut self, selector: &str) -> harvest_browser::Result<Vec<String>> {
            let lookup = self.lookups.entry(selector.to_string()).or_insert(0);
            *lookup += 1;
            match self.matches_after.get(selector) {
                Some((after, count)) if *lookup > *after => {
                    Ok(vec!["<div class=\"card\">match</div>".to_string(); *count])
                }
                _ => Ok(vec![]),
            }
        }

        async fn page_source(&mut self) -> harvest_browser::Result<String> {
            Ok(String::new())
        }

        async fn quit(&mut self) -> harvest_browser::Result<()> {
            Ok(())
        }
    }

    struct CrashedPage;

    #[async_trait]
    impl BrowserSession for CrashedPage {
        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> harvest_browser::Result<()> {
            Ok(())
        }

        async fn execute_script(&mut self, _script: &str) -> harvest_browser::Result<serde_json::Value> {
            Err(BrowserError::SessionCrashed("target closed".to_string()))
        }

        async fn find_elements(&mut self, _selector: &str) -> harvest_browser::Result<Vec<String>> {
            Err(BrowserError::SessionCrashed("target closed".to_string()))
        }

        async fn page_source(&mut self) -> harvest_browser::Result<String> {
            Ok(String::new())
        }

        async fn quit(&mut self) -> harvest_browser::Result<()> {
            Ok(())
        }
    }

    fn candidates(selectors: &[&str]) -> Vec<SelectorCandidate> {
        selectors
            .iter()
            .enumerate()
            .map(|(priority, s)| SelectorCandidate {
                priority,
                selector: (*s).to_string(),
            })
            .collect()
    }

    fn readiness(scroll_cycles: u32) -> ReadinessProfile {
        ReadinessProfile {
            candidates: vec![],
            scroll_cycles,
            scroll_pause_ms: 3000,
            settle_ms: 0,
            consent_selector: None,
            load_more_selector: None,
            max_load_more_clicks: 10,
            load_more_pause_ms: 5000,
        }
    }

    fn detector(selectors: &[&str], profile: &ReadinessProfile) -> ReadinessDetector {
        ReadinessDetector::new(candidates(selectors), profile, Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_candidate_matches() {
        let detector = detector(&["#a", "#b", "#c"], &readiness(0));
        let mut page = FakePage::default().matching("#c", 0, 4);

        let outcome = detector
            .wait_for_content(&mut page, Duration::from_millis(300))
            .await
            .expect("no browser failure");

        match outcome {
            Readiness::Ready(set) => {
                assert_eq!(set.candidate.selector, "#c");
                assert_eq!(set.containers.len(), 4);
            }
            Readiness::NotFound => panic!("expected #c to match"),
        }
        assert_eq!(page.lookups("#a"), 1);
        assert_eq!(page.lookups("#b"), 1);
        assert_eq!(page.lookups("#c"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_matching_candidate_is_committed() {
        let detector = detector(&["#a", "#b"], &readiness(0));
        let mut page = FakePage::default().matching("#a", 0, 2).matching("#b", 0, 9);

        let Readiness::Ready(set) = detector
            .wait_for_content(&mut page, Duration::from_secs(10))
            .await
            .expect("no browser failure")
        else {
            panic!("expected a match");
        };

        assert_eq!(set.candidate.priority, 0);
        assert_eq!(page.lookups("#b"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_late_content_appears() {
        let detector = detector(&[".card"], &readiness(0));
        let mut page = FakePage::default().matching(".card", 3, 1);

        let outcome = detector
            .wait_for_content(&mut page, Duration::from_secs(10))
            .await
            .expect("no browser failure");

        assert!(matches!(outcome, Readiness::Ready(_)));
        assert_eq!(page.lookups(".card"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_when_nothing_matches() {
        let detector = detector(&["#a", "#b"], &readiness(0));
        let mut page = FakePage::default();

        let start = Instant::now();
        let outcome = detector
            .wait_for_content(&mut page, Duration::from_secs(4))
            .await
            .expect("no browser failure");

        assert!(matches!(outcome, Readiness::NotFound));
        assert!(page.lookups("#a") >= 1);
        assert!(page.lookups("#b") >= 1);
        assert!(start.elapsed() <= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_cycles_are_unconditional() {
        let detector = detector(&[".card"], &readiness(5));
        let mut page = FakePage::default().matching(".card", 0, 1);

        let start = Instant::now();
        detector
            .wait_for_content(&mut page, Duration::from_secs(1))
            .await
            .expect("no browser failure");

        assert_eq!(page.scrolls(), 5);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_clicks_are_bounded() {
        let mut profile = readiness(0);
        profile.load_more_selector = Some("button.more".to_string());
        profile.max_load_more_clicks = 3;

        let detector = detector(&[".card"], &profile);
        let mut page = FakePage {
            buttons: 10,
            ..FakePage::default()
        }
        .matching(".card", 0, 1);

        detector
            .wait_for_content(&mut page, Duration::from_secs(1))
            .await
            .expect("no browser failure");

        assert_eq!(page.buttons, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_stops_when_button_disappears() {
        let mut profile = readiness(0);
        profile.load_more_selector = Some("button.more".to_string());

        let detector = detector(&[".card"], &profile);
        let mut page = FakePage {
            buttons: 2,
            ..FakePage::default()
        }
        .matching(".card", 0, 1);

        detector
            .wait_for_content(&mut page, Duration::from_secs(1))
            .await
            .expect("no browser failure");

        let clicks = page
            .scripts
            .iter()
            .filter(|s| s.contains("button.more"))
            .count();
        assert_eq!(clicks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_failure_propagates() {
        let detector = detector(&[".card"], &readiness(2));
        let result = detector
            .wait_for_content(&mut CrashedPage, Duration::from_secs(1))
            .await;

        assert!(result.is_err());
    }
}
