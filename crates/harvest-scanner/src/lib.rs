//! Harvest Scanner - Resilient extraction runs.
//!
//! This crate turns a site profile into records: it drives a browser session
//! through retried attempts, waits for the results area to render, and parses
//! each result container into a record.
//!
//! # Features
//!
//! - Retry loop with exponential backoff and bounded jitter
//! - Readiness detection over ordered selector candidates with scroll cycles
//! - Field parsers for times, prices, capacities, ratings and durations
//! - Record sinks (JSON lines, in-memory)
//! - Concurrent runs across independent sites
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest_scanner::ScanOrchestrator;
//!
//! let orchestrator = ScanOrchestrator::new(ChromiumLauncher::new(&config.browser), &config);
//! let outcome = orchestrator.run_site(&profile, None).await;
//! for record in outcome.records() {
//!     println!("{}", serde_json::to_string(record)?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod backoff;
#[allow(missing_docs)]
pub mod error;
pub mod orchestrator;
pub mod patterns;
pub mod pipeline;
pub mod readiness;
pub mod record;
pub mod sink;

// Re-export commonly used types
pub use backoff::Backoff;
pub use error::{Result, ScanError};
pub use orchestrator::{
    Attempt, AttemptOutcome, RetryController, RetryPolicy, RunOutcome, RunResult, RunTarget,
    ScanOrchestrator,
};
pub use patterns::{Elapsed, Money};
pub use pipeline::{extract, find_containers, CompiledSchema, RawContainer};
pub use readiness::{ContainerSet, Readiness, ReadinessDetector};
pub use record::{ExtractedRecord, FieldValue};
pub use sink::{deliver, DeliveryReport, JsonLinesSink, MemorySink, RecordSink};
