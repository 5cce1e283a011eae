//! Extracted records and their field values.

use crate::patterns::{Elapsed, Money};
use chrono::{DateTime, NaiveTime, Utc};
use harvest_core::SiteId;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One parsed (or defaulted) field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Not found and no default declared; serialized as `null`
    Absent,
    /// Free text or category label
    Text(String),
    /// Whole number
    Integer(i64),
    /// Fractional number
    Decimal(f64),
    /// Currency amount
    Money(Money),
    /// Clock time, serialized as `HH:MM`
    #[serde(serialize_with = "serialize_clock")]
    Time(NaiveTime),
    /// Span of time
    Duration(Elapsed),
}

fn serialize_clock<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format("%H:%M"))
}

impl FieldValue {
    /// Whether the value carries data.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Clock time, if this is a time value.
    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }
}

/// A record assembled from one result container.
///
/// Every declared field of the site's schema is present, either parsed,
/// defaulted, or [`FieldValue::Absent`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedRecord {
    /// Site the record came from
    pub site_id: SiteId,
    /// When the record was extracted
    pub extracted_at: DateTime<Utc>,
    /// Field values by name, derived fields included
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    /// Create an empty record for a site.
    #[must_use]
    pub fn new(site_id: SiteId) -> Self {
        Self {
            site_id,
            extracted_at: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    /// Value of a field; `None` only for names outside the schema.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub(crate) fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }
}
