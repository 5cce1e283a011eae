//! Site profile types and structures.
//!
//! A site profile is the whole per-site configuration of the extraction
//! engine: where to go, which selector candidates may identify result
//! containers, how to coax lazy content into the DOM, and which fields to
//! pull out of each container.

use crate::error::{Result, SiteError};
use chrono::NaiveDate;
use harvest_core::SiteId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Complete site profile loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Core site metadata
    pub site: SiteMetadata,

    /// How to decide the results area has loaded
    pub readiness: ReadinessProfile,

    /// Number, currency and clock conventions of the site
    #[serde(default)]
    pub locale: LocaleRules,

    /// Fields extracted from every result container
    pub fields: Vec<FieldSpec>,

    /// Fields computed from other fields
    #[serde(default)]
    pub derived: Vec<DerivedField>,
}

impl SiteProfile {
    /// Get the site ID.
    #[must_use]
    pub fn id(&self) -> &SiteId {
        &self.site.id
    }

    /// Get the site name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.site.name
    }

    /// Get the site category.
    #[must_use]
    pub fn category(&self) -> SiteCategory {
        self.site.category
    }

    /// Selector candidates in priority order (highest first).
    #[must_use]
    pub fn candidates(&self) -> Vec<SelectorCandidate> {
        self.readiness
            .candidates
            .iter()
            .enumerate()
            .map(|(priority, selector)| SelectorCandidate {
                priority,
                selector: selector.clone(),
            })
            .collect()
    }

    /// Look up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate the site profile for completeness and correctness.
    pub fn validate(&self) -> Result<()> {
        let site_id = &self.site.id;

        if self.site.name.is_empty() {
            return Err(invalid(site_id, "site name cannot be empty"));
        }

        if self.site.url.is_empty() {
            return Err(invalid(site_id, "site URL cannot be empty"));
        }

        if self.site.search_url.is_empty() {
            return Err(invalid(site_id, "site search_url cannot be empty"));
        }

        self.readiness.validate(site_id)?;
        self.locale.validate(site_id)?;

        if self.fields.is_empty() {
            return Err(invalid(site_id, "at least one field must be declared"));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(
                    site_id,
                    &format!("duplicate field name '{}'", field.name),
                ));
            }
            field.validate(site_id)?;
        }

        if !self.fields.iter().any(|f| f.required) {
            return Err(invalid(
                site_id,
                "at least one field must be marked required (primary identifying field)",
            ));
        }

        for derived in &self.derived {
            if !names.insert(derived.name.as_str()) {
                return Err(invalid(
                    site_id,
                    &format!("derived field '{}' clashes with another field", derived.name),
                ));
            }
            derived.validate(site_id, &self.fields)?;
        }

        Ok(())
    }
}

fn invalid(site_id: &SiteId, reason: &str) -> SiteError {
    SiteError::ValidationError {
        site_id: site_id.to_string(),
        reason: reason.to_string(),
    }
}

fn check_selector(site_id: &SiteId, what: &str, selector: &str) -> Result<()> {
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| invalid(site_id, &format!("{what}: invalid CSS selector '{selector}': {e}")))
}

/// Core site metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteMetadata {
    /// Unique site identifier (e.g., "avianca", "copetran")
    pub id: SiteId,

    /// Human-readable site name
    pub name: String,

    /// Site home URL
    pub url: String,

    /// Results page scraped by default
    pub search_url: String,

    /// Kind of records the site lists
    pub category: SiteCategory,

    /// Date when this profile was last checked against the live site
    pub last_verified: NaiveDate,
}

/// Kinds of sources the engine extracts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteCategory {
    /// Airline schedules and fares
    Flights,
    /// Intercity bus schedules, fares and seats
    Buses,
    /// Lodging listings, nightly prices and ratings
    Lodging,
    /// Other/uncategorized
    Other,
}

impl SiteCategory {
    /// Get a human-readable display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Flights => "Flights",
            Self::Buses => "Buses",
            Self::Lodging => "Lodging",
            Self::Other => "Other",
        }
    }
}

/// One structural pattern that may identify the repeating result containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    /// Position in the candidate list; 0 is tried first
    pub priority: usize,
    /// CSS selector
    pub selector: String,
}

/// Readiness heuristics: candidates plus bounded lazy-load nudges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessProfile {
    /// Result-container selectors, highest priority first
    pub candidates: Vec<String>,

    /// Unconditional scroll-to-bottom cycles before probing
    #[serde(default = "default_scroll_cycles")]
    pub scroll_cycles: u32,

    /// Pause after each scroll in milliseconds
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Pause after navigation before touching the page
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Cookie-consent button clicked once if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_selector: Option<String>,

    /// "Show more results" button clicked until it disappears
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_more_selector: Option<String>,

    /// Upper bound on "show more" clicks
    #[serde(default = "default_max_load_more_clicks")]
    pub max_load_more_clicks: u32,

    /// Pause after each "show more" click in milliseconds
    #[serde(default = "default_load_more_pause_ms")]
    pub load_more_pause_ms: u64,
}

fn default_scroll_cycles() -> u32 {
    5
}

fn default_scroll_pause_ms() -> u64 {
    3000
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_max_load_more_clicks() -> u32 {
    10
}

fn default_load_more_pause_ms() -> u64 {
    5000
}

impl ReadinessProfile {
    fn validate(&self, site_id: &SiteId) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(invalid(
                site_id,
                "readiness.candidates must list at least one selector",
            ));
        }

        for selector in &self.candidates {
            check_selector(site_id, "readiness.candidates", selector)?;
        }

        if let Some(selector) = &self.consent_selector {
            check_selector(site_id, "readiness.consent_selector", selector)?;
        }

        if let Some(selector) = &self.load_more_selector {
            check_selector(site_id, "readiness.load_more_selector", selector)?;
        }

        if self.scroll_cycles > 50 {
            return Err(invalid(
                site_id,
                &format!("scroll_cycles must be 0-50, got {}", self.scroll_cycles),
            ));
        }

        Ok(())
    }
}

/// Number, currency and clock conventions of a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleRules {
    /// Digit-group separator in prices ("." in "$180.000")
    pub thousands_separator: char,
    /// Decimal separator in prices and ratings
    pub decimal_separator: char,
    /// Currency assumed when a price carries no ISO code
    pub default_currency: String,
    /// Words standing in for a meridiem marker (e.g. "Tarde" = pm)
    pub meridiem_words: BTreeMap<String, Meridiem>,
}

impl Default for LocaleRules {
    fn default() -> Self {
        Self {
            thousands_separator: '.',
            decimal_separator: ',',
            default_currency: "COP".to_string(),
            meridiem_words: BTreeMap::new(),
        }
    }
}

impl LocaleRules {
    fn validate(&self, site_id: &SiteId) -> Result<()> {
        if self.thousands_separator == self.decimal_separator {
            return Err(invalid(
                site_id,
                "locale thousands_separator and decimal_separator must differ",
            ));
        }
        Ok(())
    }
}

/// Half of a 12-hour clock day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Meridiem {
    /// Before noon
    Am,
    /// Noon and after
    Pm,
}

/// One declared field of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output name of the field
    pub name: String,

    /// Which parser reads the field
    pub kind: FieldKind,

    /// Where the raw text comes from
    #[serde(default)]
    pub source: FieldSource,

    /// Optional regex; for integer, decimal, category and text kinds the
    /// first capture group (or whole match) is the raw value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Known labels for category fields, matched case-insensitively
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Primary identifying field; containers missing it are skipped
    #[serde(default)]
    pub required: bool,

    /// Value used when the field is not found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    /// Where a time field's period word lives when the site keeps it
    /// outside the text (e.g. an icon's `title`); looked up relative to
    /// the field's element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meridiem: Option<ElementLookup>,
}

impl FieldSpec {
    fn validate(&self, site_id: &SiteId) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid(site_id, "field name cannot be empty"));
        }

        let ctx = format!("field '{}'", self.name);

        if let Some(pattern) = &self.pattern {
            Regex::new(pattern)
                .map_err(|e| invalid(site_id, &format!("{ctx}: invalid pattern: {e}")))?;
        }

        if let Some(lookup) = &self.meridiem {
            if self.kind != FieldKind::Time {
                return Err(invalid(
                    site_id,
                    &format!("{ctx}: meridiem lookup only applies to time fields"),
                ));
            }
            check_selector(site_id, &ctx, &lookup.selector)?;
        }

        match &self.source {
            FieldSource::Text => {}
            FieldSource::Element { selector, .. } => check_selector(site_id, &ctx, selector)?,
            FieldSource::After { marker } => {
                if marker.is_empty() {
                    return Err(invalid(site_id, &format!("{ctx}: marker cannot be empty")));
                }
            }
        }

        if self.kind == FieldKind::Category && self.labels.is_empty() && self.pattern.is_none() {
            return Err(invalid(
                site_id,
                &format!("{ctx}: category fields need labels or a pattern"),
            ));
        }

        if let Some(default) = &self.default {
            if !self.kind.accepts_default(default) {
                return Err(invalid(
                    site_id,
                    &format!(
                        "{ctx}: default {default:?} does not fit a {} field",
                        self.kind.as_str()
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Field parsers available to profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Clock time, `HH:MM` with optional meridiem
    Time,
    /// Currency-symbol-prefixed amount
    Money,
    /// Whole number such as seat capacity
    Integer,
    /// Fractional number such as a rating
    Decimal,
    /// Span of time written out ("1h 30m")
    Duration,
    /// One of a set of known labels
    Category,
    /// Free text
    Text,
}

impl FieldKind {
    /// Lowercase name as written in profiles.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Money => "money",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Duration => "duration",
            Self::Category => "category",
            Self::Text => "text",
        }
    }

    fn accepts_default(self, default: &DefaultValue) -> bool {
        match (self, default) {
            (Self::Money | Self::Decimal, DefaultValue::Integer(_) | DefaultValue::Decimal(_))
            | (Self::Integer, DefaultValue::Integer(_))
            | (Self::Category | Self::Text, DefaultValue::Text(_)) => true,
            _ => false,
        }
    }
}

/// Where a field's raw text is taken from within a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "kebab-case")]
pub enum FieldSource {
    /// Whole-container text, whitespace collapsed
    #[default]
    Text,
    /// First descendant matching a selector: its text, or an attribute
    Element {
        /// CSS selector relative to the container
        selector: String,
        /// Attribute to read instead of text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
        /// Take the last match instead of the first
        #[serde(default)]
        last: bool,
    },
    /// Container text after the last occurrence of a marker; empty when
    /// the marker is missing
    After {
        /// Literal marker text
        marker: String,
    },
}

/// A descendant element and, optionally, the attribute to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementLookup {
    /// CSS selector
    pub selector: String,
    /// Attribute to read instead of text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// Declared fallback value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Whole number
    Integer(i64),
    /// Fractional number
    Decimal(f64),
    /// Text
    Text(String),
}

/// A field computed from already-parsed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedField {
    /// Output name
    pub name: String,
    /// Computation
    pub kind: DerivedKind,
    /// Departure-side time field
    pub start: String,
    /// Arrival-side time field
    pub end: String,
    /// Value used when an input is missing: a placeholder text, or a whole
    /// number of minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

impl DerivedField {
    fn validate(&self, site_id: &SiteId, fields: &[FieldSpec]) -> Result<()> {
        match &self.default {
            None | Some(DefaultValue::Text(_)) => {}
            Some(DefaultValue::Integer(n)) if u32::try_from(*n).is_ok() => {}
            Some(other) => {
                return Err(invalid(
                    site_id,
                    &format!(
                        "derived field '{}': default {other:?} is neither text nor a minute count",
                        self.name
                    ),
                ))
            }
        }

        for input in [&self.start, &self.end] {
            match fields.iter().find(|f| &f.name == input) {
                Some(f) if f.kind == FieldKind::Time => {}
                Some(_) => {
                    return Err(invalid(
                        site_id,
                        &format!(
                            "derived field '{}': input '{input}' is not a time field",
                            self.name
                        ),
                    ))
                }
                None => {
                    return Err(invalid(
                        site_id,
                        &format!(
                            "derived field '{}': unknown input field '{input}'",
                            self.name
                        ),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Computations available to derived fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedKind {
    /// Time elapsed from `start` to `end`, rolling over midnight
    Elapsed,
}
