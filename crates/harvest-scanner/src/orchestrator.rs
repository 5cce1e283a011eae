//! Retry/Backoff Controller and multi-site orchestration.
//!
//! One run is up to `max_attempts` iterations of "acquire session, navigate,
//! wait for readiness, extract". The backoff delay computed for an attempt
//! is both the readiness budget for that attempt and the pause before the
//! next one.

use crate::backoff::Backoff;
use crate::error::{Result, ScanError};
use crate::pipeline::{extract, CompiledSchema};
use crate::readiness::{Readiness, ReadinessDetector};
use crate::record::ExtractedRecord;
use futures::stream::{FuturesUnordered, StreamExt};
use harvest_browser::{FingerprintConfig, SessionLauncher, SessionManager};
use harvest_core::{AppConfig, ScanningConfig, SiteId};
use harvest_site::SiteProfile;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{error, info, warn};

/// Attempt budget and delay schedule, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts; at least one is always made
    pub max_attempts: u32,
    /// Delay schedule
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy from the `[scanning]` configuration section.
    #[must_use]
    pub fn from_config(config: &ScanningConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::new(config.base_delay(), config.max_delay()),
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Readiness reached and records extracted
    Success,
    /// Transient failure; another attempt may follow
    RetryableFailure,
    /// The run ends here without records
    FatalFailure,
}

/// One iteration of the retry loop.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 0-based attempt index
    pub index: u32,
    /// Backoff delay computed for this attempt
    pub delay: Duration,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Failure description, if any
    pub error: Option<String>,
}

/// Terminal result of a run.
#[derive(Debug)]
pub enum RunResult {
    /// Records from the first attempt that reached readiness (possibly none,
    /// if every container was skipped)
    Success(Vec<ExtractedRecord>),
    /// No attempt reached readiness; carries the last error
    Exhausted(ScanError),
}

/// A run's result together with its attempt log.
#[derive(Debug)]
pub struct RunOutcome {
    /// Site the run targeted
    pub site_id: SiteId,
    /// Terminal result
    pub result: RunResult,
    /// Attempts in the order they were made
    pub attempts: Vec<Attempt>,
}

impl RunOutcome {
    /// Whether the run produced a readable result set
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.result, RunResult::Success(_))
    }

    /// Extracted records; empty when the run was exhausted
    #[must_use]
    pub fn records(&self) -> &[ExtractedRecord] {
        match &self.result {
            RunResult::Success(records) => records,
            RunResult::Exhausted(_) => &[],
        }
    }

    /// Take the records, empty when the run was exhausted
    #[must_use]
    pub fn into_records(self) -> Vec<ExtractedRecord> {
        match self.result {
            RunResult::Success(records) => records,
            RunResult::Exhausted(_) => Vec::new(),
        }
    }
}

/// Everything a run needs about its site, built once at run start.
pub struct RunTarget {
    url: String,
    detector: ReadinessDetector,
    schema: CompiledSchema,
}

impl RunTarget {
    /// Build from a profile, targeting its search URL.
    ///
    /// # Errors
    /// Returns `SelectorsOutdated` if the schema doesn't compile.
    pub fn from_profile(profile: &SiteProfile, poll_interval: Duration) -> Result<Self> {
        Ok(Self {
            url: profile.site.search_url.clone(),
            detector: ReadinessDetector::new(
                profile.candidates(),
                &profile.readiness,
                poll_interval,
            ),
            schema: CompiledSchema::compile(profile)?,
        })
    }

    /// Target a different URL (e.g. a search with other dates).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// URL navigated to on every attempt
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Site the target belongs to
    #[must_use]
    pub fn site_id(&self) -> &SiteId {
        self.schema.site_id()
    }
}

/// Runs the attempt loop for one site over one Session Manager.
///
/// The controller is the only place that decides whether the session is
/// reused or replaced.
pub struct RetryController<L: SessionLauncher> {
    sessions: SessionManager<L>,
    policy: RetryPolicy,
    rng: StdRng,
}

impl<L: SessionLauncher> RetryController<L> {
    /// Create a controller with an entropy-seeded jitter source.
    pub fn new(sessions: SessionManager<L>, policy: RetryPolicy) -> Self {
        Self {
            sessions,
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed jitter seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The Session Manager, for inspecting lifecycle counters
    pub fn sessions(&self) -> &SessionManager<L> {
        &self.sessions
    }

    /// Run the attempt loop. Never fails: exhaustion is reported in the
    /// outcome, and the session is disposed before returning.
    pub async fn run(&mut self, target: &RunTarget) -> RunOutcome {
        let site_id = target.site_id().clone();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut index = 0;

        let last = loop {
            let is_last = index + 1 == max_attempts;
            let delay = self.policy.backoff.delay(index, &mut self.rng);

            info!(
                site_id = %site_id,
                attempt = index + 1,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "starting attempt"
            );

            let e = match self.attempt(target, delay).await {
                Ok(found) => {
                    attempts.push(Attempt {
                        index,
                        delay,
                        outcome: AttemptOutcome::Success,
                        error: None,
                    });
                    break Ok(found);
                }
                Err(e) => e,
            };

            let outcome = match &e {
                ScanError::ContentNotFound { .. } if is_last => AttemptOutcome::FatalFailure,
                e if e.is_retryable() => AttemptOutcome::RetryableFailure,
                _ => AttemptOutcome::FatalFailure,
            };
            warn!(
                site_id = %site_id,
                attempt = index + 1,
                max_attempts,
                error = %e,
                "attempt failed"
            );
            attempts.push(Attempt {
                index,
                delay,
                outcome,
                error: Some(e.to_string()),
            });

            if outcome == AttemptOutcome::FatalFailure || is_last {
                break Err(e);
            }
            tokio::time::sleep(delay).await;
            index += 1;
        };

        self.sessions.dispose().await;

        let result = match last {
            Ok(records) => {
                info!(
                    site_id = %site_id,
                    records = records.len(),
                    attempts = attempts.len(),
                    "run succeeded"
                );
                RunResult::Success(records)
            }
            Err(e) => {
                error!(
                    site_id = %site_id,
                    attempts = attempts.len(),
                    error = %e,
                    "run exhausted, returning no records"
                );
                RunResult::Exhausted(e)
            }
        };

        RunOutcome {
            site_id,
            result,
            attempts,
        }
    }

    /// One attempt. Any failure marks the session failed and disposes it
    /// before the backoff pause, so no browser outlives a failed attempt.
    async fn attempt(&mut self, target: &RunTarget, delay: Duration) -> Result<Vec<ExtractedRecord>> {
        let readiness = match Self::load_page(&mut self.sessions, target, delay).await {
            Ok(readiness) => readiness,
            Err(e) => {
                self.sessions.mark_failed(&e.to_string());
                self.sessions.dispose().await;
                return Err(e);
            }
        };

        match readiness {
            Readiness::Ready(set) => Ok(extract(&set.containers, &target.schema)),
            Readiness::NotFound => {
                self.sessions.dispose().await;
                Err(ScanError::ContentNotFound {
                    site_id: target.site_id().clone(),
                    candidates: target.detector.candidates().len(),
                    waited: delay,
                })
            }
        }
    }

    async fn load_page(
        sessions: &mut SessionManager<L>,
        target: &RunTarget,
        delay: Duration,
    ) -> Result<Readiness> {
        let session = sessions.acquire().await?;
        session.navigate(target.url()).await?;
        target
            .detector
            .wait_for_content(session.browser(), delay)
            .await
    }
}

/// Runs independent site pipelines, each with its own session.
pub struct ScanOrchestrator<L> {
    launcher: L,
    fingerprint: FingerprintConfig,
    navigation_timeout: Duration,
    scanning: ScanningConfig,
}

impl<L> ScanOrchestrator<L>
where
    L: SessionLauncher + Clone,
{
    /// Create an orchestrator from application settings.
    #[must_use]
    pub fn new(launcher: L, config: &AppConfig) -> Self {
        Self {
            launcher,
            fingerprint: FingerprintConfig::from_config(&config.browser),
            navigation_timeout: config.browser.navigation_timeout(),
            scanning: config.scanning.clone(),
        }
    }

    /// Maximum site pipelines in flight at once
    #[must_use]
    pub fn max_concurrent_sites(&self) -> usize {
        self.scanning.concurrent_sites.max(1)
    }

    /// Run one site, optionally against a URL other than its search URL.
    pub async fn run_site(&self, profile: &SiteProfile, url: Option<&str>) -> RunOutcome {
        let target = match RunTarget::from_profile(profile, self.scanning.poll_interval()) {
            Ok(target) => match url {
                Some(url) => target.with_url(url),
                None => target,
            },
            Err(e) => {
                error!(site_id = %profile.id(), error = %e, "site profile unusable");
                return RunOutcome {
                    site_id: profile.id().clone(),
                    result: RunResult::Exhausted(e),
                    attempts: Vec::new(),
                };
            }
        };

        let sessions = SessionManager::new(
            self.launcher.clone(),
            self.fingerprint.clone(),
            self.navigation_timeout,
        );
        let mut controller =
            RetryController::new(sessions, RetryPolicy::from_config(&self.scanning));

        info!(site_id = %profile.id(), url = %target.url(), "starting run");
        controller.run(&target).await
    }

    /// Run several sites concurrently, bounded by `concurrent_sites`.
    ///
    /// Outcomes are returned in completion order.
    pub async fn run_sites(&self, profiles: &[SiteProfile]) -> Vec<RunOutcome> {
        let mut in_flight = FuturesUnordered::new();
        let mut outcomes = Vec::with_capacity(profiles.len());

        for profile in profiles {
            in_flight.push(self.run_site(profile, None));

            while in_flight.len() >= self.max_concurrent_sites() {
                if let Some(outcome) = in_flight.next().await {
                    outcomes.push(outcome);
                }
            }
        }

        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
        }

        outcomes
    }
}
