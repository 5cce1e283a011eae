//! Extraction Pipeline: turns matched result containers into records.
//!
//! Fields are parsed independently. A miss takes the field's declared
//! default; a container whose required field misses is skipped.

use crate::error::{Result, ScanError};
use crate::patterns::{self, Elapsed, Money};
use crate::record::{ExtractedRecord, FieldValue};
use harvest_core::SiteId;
use harvest_site::{
    DefaultValue, DerivedField, DerivedKind, FieldKind, FieldSource, FieldSpec, LocaleRules,
    SelectorCandidate, SiteProfile,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Markup and plain text of one matched result container.
#[derive(Debug, Clone)]
pub struct RawContainer {
    html: String,
    text: String,
}

impl RawContainer {
    /// Build from the container element's outer HTML.
    #[must_use]
    pub fn from_html(outer_html: impl Into<String>) -> Self {
        let html = outer_html.into();
        let fragment = Html::parse_fragment(&html);
        let text = element_text(fragment.root_element());
        Self { html, text }
    }

    /// Outer HTML
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Text nodes joined by spaces, whitespace collapsed
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    patterns::clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn read_element(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(name) => element.value().attr(name).map(patterns::clean_text),
        None => Some(element_text(element)),
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Locate result containers in a saved page, trying candidates in order.
///
/// Returns the first candidate with at least one match, mirroring what the
/// readiness detector does against a live page.
#[must_use]
pub fn find_containers(
    page_html: &str,
    candidates: &[SelectorCandidate],
) -> Option<(SelectorCandidate, Vec<RawContainer>)> {
    let document = Html::parse_document(page_html);

    candidates.iter().find_map(|candidate| {
        let selector = Selector::parse(&candidate.selector).ok()?;
        let containers: Vec<_> = document
            .select(&selector)
            .map(|el| RawContainer::from_html(el.html()))
            .collect();
        (!containers.is_empty()).then(|| (candidate.clone(), containers))
    })
}

struct CompiledField {
    spec: FieldSpec,
    selector: Option<Selector>,
    meridiem: Option<(Selector, Option<String>)>,
    pattern: Option<Regex>,
}

impl CompiledField {
    fn compile(site_id: &SiteId, spec: &FieldSpec) -> Result<Self> {
        let outdated = |reason: String| ScanError::SelectorsOutdated {
            site_id: site_id.clone(),
            reason: format!("field '{}': {reason}", spec.name),
        };

        let selector = match &spec.source {
            FieldSource::Element { selector, .. } => Some(
                Selector::parse(selector)
                    .map_err(|e| outdated(format!("invalid selector '{selector}': {e}")))?,
            ),
            _ => None,
        };

        let meridiem = spec
            .meridiem
            .as_ref()
            .map(|lookup| {
                Selector::parse(&lookup.selector)
                    .map(|sel| (sel, lookup.attribute.clone()))
                    .map_err(|e| outdated(format!("invalid selector '{}': {e}", lookup.selector)))
            })
            .transpose()?;

        let pattern = spec
            .pattern
            .as_deref()
            .map(|p| Regex::new(p).map_err(|e| outdated(format!("invalid pattern: {e}"))))
            .transpose()?;

        Ok(Self {
            spec: spec.clone(),
            selector,
            meridiem,
            pattern,
        })
    }

    /// Raw text the field's parser runs over.
    fn raw_text(&self, fragment: &Html, container: &RawContainer) -> Option<String> {
        match &self.spec.source {
            FieldSource::Text => {
                let text = container.text().to_string();
                let period = self
                    .meridiem
                    .as_ref()
                    .and_then(|(sel, attr)| fragment.select(sel).next().map(|el| (el, attr)))
                    .and_then(|(el, attr)| read_element(el, attr.as_deref()));
                non_empty(join_period(text, period))
            }
            FieldSource::Element {
                attribute, last, ..
            } => {
                let selector = self.selector.as_ref()?;
                let mut matches = fragment.select(selector);
                let element = if *last { matches.last() } else { matches.next() };
                let element = element?;

                let text = read_element(element, attribute.as_deref())?;
                let period = self
                    .meridiem
                    .as_ref()
                    .and_then(|(sel, attr)| {
                        element.select(sel).next().map(|el| (el, attr.as_deref()))
                    })
                    .and_then(|(el, attr)| read_element(el, attr));
                non_empty(join_period(text, period))
            }
            FieldSource::After { marker } => {
                let text = container.text();
                let start = text.rfind(marker.as_str())? + marker.len();
                non_empty(text[start..].trim().to_string())
            }
        }
    }

    fn parse(&self, raw: &str, locale: &LocaleRules) -> Option<FieldValue> {
        let pattern = self.pattern.as_ref();

        match self.spec.kind {
            FieldKind::Time => patterns::parse_time(raw, locale).map(FieldValue::Time),
            FieldKind::Money => patterns::parse_money(raw, locale).map(FieldValue::Money),
            FieldKind::Integer => patterns::parse_integer(
                raw,
                pattern.unwrap_or_else(|| patterns::default_integer_pattern()),
            )
            .map(FieldValue::Integer),
            FieldKind::Decimal => patterns::parse_decimal(
                raw,
                pattern.unwrap_or_else(|| patterns::default_decimal_pattern()),
                locale,
            )
            .map(FieldValue::Decimal),
            FieldKind::Duration => patterns::parse_duration(raw).map(FieldValue::Duration),
            FieldKind::Category => {
                patterns::match_category(raw, &self.spec.labels, pattern).map(FieldValue::Text)
            }
            FieldKind::Text => {
                let text = match pattern {
                    Some(p) => patterns::capture_text(raw, p),
                    None => non_empty(patterns::clean_text(raw)),
                };
                text.map(FieldValue::Text)
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn default_value(&self, locale: &LocaleRules) -> FieldValue {
        let Some(default) = &self.spec.default else {
            return FieldValue::Absent;
        };

        match (self.spec.kind, default) {
            (FieldKind::Money, DefaultValue::Integer(n)) => FieldValue::Money(Money {
                amount: *n as f64,
                currency: locale.default_currency.clone(),
            }),
            (FieldKind::Money, DefaultValue::Decimal(n)) => FieldValue::Money(Money {
                amount: *n,
                currency: locale.default_currency.clone(),
            }),
            (FieldKind::Decimal, DefaultValue::Integer(n)) => FieldValue::Decimal(*n as f64),
            (_, DefaultValue::Decimal(n)) => FieldValue::Decimal(*n),
            (_, DefaultValue::Integer(n)) => FieldValue::Integer(*n),
            (_, DefaultValue::Text(s)) => FieldValue::Text(s.clone()),
        }
    }
}

/// Fallback for a derived field whose inputs are missing. Whole numbers
/// are minutes.
fn derived_default(derived: &DerivedField) -> FieldValue {
    match &derived.default {
        Some(DefaultValue::Text(s)) => FieldValue::Text(s.clone()),
        Some(DefaultValue::Integer(n)) => u32::try_from(*n)
            .map_or(FieldValue::Absent, |m| FieldValue::Duration(Elapsed::from_minutes(m))),
        Some(DefaultValue::Decimal(_)) | None => FieldValue::Absent,
    }
}

fn join_period(text: String, period: Option<String>) -> String {
    match period {
        Some(p) if !p.is_empty() => format!("{text} {p}"),
        _ => text,
    }
}

/// A site's field schema with selectors and patterns compiled once per run.
pub struct CompiledSchema {
    site_id: SiteId,
    locale: LocaleRules,
    fields: Vec<CompiledField>,
    derived: Vec<DerivedField>,
}

impl CompiledSchema {
    /// Compile the schema of a site profile.
    ///
    /// # Errors
    /// Returns `SelectorsOutdated` if a selector or pattern doesn't compile.
    pub fn compile(profile: &SiteProfile) -> Result<Self> {
        let fields = profile
            .fields
            .iter()
            .map(|spec| CompiledField::compile(profile.id(), spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            site_id: profile.id().clone(),
            locale: profile.locale.clone(),
            fields,
            derived: profile.derived.clone(),
        })
    }

    /// Site the schema belongs to
    #[must_use]
    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    /// Names of every field a record carries, derived ones included
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.spec.name.as_str())
            .chain(self.derived.iter().map(|d| d.name.as_str()))
            .collect()
    }

    /// Parse one container; `None` when its required field is missing.
    fn extract_one(&self, index: usize, container: &RawContainer) -> Option<ExtractedRecord> {
        let fragment = Html::parse_fragment(container.html());
        let mut record = ExtractedRecord::new(self.site_id.clone());

        for field in &self.fields {
            let parsed = field
                .raw_text(&fragment, container)
                .and_then(|raw| field.parse(&raw, &self.locale));

            let value = match parsed {
                Some(value) => value,
                None if field.spec.required => {
                    warn!(
                        site_id = %self.site_id,
                        container = index,
                        field = %field.spec.name,
                        "skipping container without identifying field"
                    );
                    return None;
                }
                None => {
                    debug!(
                        site_id = %self.site_id,
                        container = index,
                        field = %field.spec.name,
                        "field missing, using default"
                    );
                    field.default_value(&self.locale)
                }
            };

            record.set(&field.spec.name, value);
        }

        for derived in &self.derived {
            let value = match derived.kind {
                DerivedKind::Elapsed => {
                    let start = record.get(&derived.start).and_then(FieldValue::as_time);
                    let end = record.get(&derived.end).and_then(FieldValue::as_time);
                    match (start, end) {
                        (Some(start), Some(end)) => {
                            FieldValue::Duration(Elapsed::between(start, end))
                        }
                        _ => derived_default(derived),
                    }
                }
            };
            record.set(&derived.name, value);
        }

        Some(record)
    }
}

/// Run the schema over every container, skipping those without their
/// identifying field. Never fails: field misses resolve to defaults.
#[must_use]
pub fn extract(containers: &[RawContainer], schema: &CompiledSchema) -> Vec<ExtractedRecord> {
    let records: Vec<_> = containers
        .iter()
        .enumerate()
        .filter_map(|(index, container)| schema.extract_one(index, container))
        .collect();

    debug!(
        site_id = %schema.site_id,
        containers = containers.len(),
        records = records.len(),
        "extraction complete"
    );

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(toml_src: &str) -> SiteProfile {
        let profile: SiteProfile = toml::from_str(toml_src).expect("parse profile");
        profile.validate().expect("valid profile");
        profile
    }

    fn bus_profile() -> SiteProfile {
        profile(
            r#"
[site]
id = "copetran"
name = "Copetran"
url = "https://tiquetes.copetran.com"
search_url = "https://tiquetes.copetran.com/busqueda"
category = "buses"
last_verified = "2025-04-12"

[readiness]
candidates = [".ticket-card"]

[[fields]]
name = "departure_time"
kind = "time"
required = true

[[fields]]
name = "arrival_time"
kind = "time"
source = { from = "after", marker = "Llegada Aprox" }

[[fields]]
name = "price"
kind = "money"
default = 0

[[fields]]
name = "seats"
kind = "integer"
pattern = '(\d+)\s*sillas\s*disponibles'
default = 0

[[fields]]
name = "bus_type"
kind = "text"
pattern = 'Tipo\s+de\s+bus\s*-\s*([\w\s]+)'
default = "No disponible"

[[derived]]
name = "duration"
kind = "elapsed"
start = "departure_time"
end = "arrival_time"
"#,
        )
    }

    fn lodging_profile() -> SiteProfile {
        profile(
            r#"
[site]
id = "airbnb-ibague"
name = "Airbnb Ibagué"
url = "https://www.airbnb.com.co"
search_url = "https://www.airbnb.com.co/s/Ibague/homes"
category = "lodging"
last_verified = "2025-03-30"

[readiness]
candidates = ["div[itemprop='itemListElement']"]

[[fields]]
name = "title"
kind = "text"
source = { from = "element", selector = "[data-testid='listing-card-title']" }
required = true

[[fields]]
name = "description"
kind = "text"
source = { from = "element", selector = "[data-testid='listing-card-subtitle']" }
default = "N/A"

[[fields]]
name = "price"
kind = "money"
default = 0

[[fields]]
name = "rating"
kind = "decimal"
source = { from = "element", selector = "span.r4a59j5" }
default = 1.0

[[fields]]
name = "image"
kind = "text"
source = { from = "element", selector = "img", attribute = "src" }
"#,
        )
    }

    fn container(html: &str) -> RawContainer {
        RawContainer::from_html(html)
    }

    #[test]
    fn test_raw_container_text_separates_nodes() {
        let c = container("<div><span>11:30 PM</span><span>Terminal</span>\n <b>Ibagué</b></div>");
        assert_eq!(c.text(), "11:30 PM Terminal Ibagué");
    }

    #[test]
    fn test_bus_card_full_record() {
        let schema = CompiledSchema::compile(&bus_profile()).expect("compile");
        let cards = vec![container(
            r#"<div class="ticket-card">
                <p>11:30 PM</p><p>Terminal de Ibagué</p>
                <p>Llegada Aprox</p><p>01:00 AM</p><p>Terminal de Bogotá</p>
                <p>$ 95.000</p><p>12 sillas disponibles</p>
                <p>Tipo de bus - Preferencial</p>
            </div>"#,
        )];

        let records = extract(&cards, &schema);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(
            record.get("departure_time").and_then(FieldValue::as_time),
            chrono::NaiveTime::from_hms_opt(23, 30, 0)
        );
        assert_eq!(
            record.get("arrival_time").and_then(FieldValue::as_time),
            chrono::NaiveTime::from_hms_opt(1, 0, 0)
        );
        assert_eq!(record.get("seats"), Some(&FieldValue::Integer(12)));
        assert_eq!(
            record.get("bus_type").and_then(FieldValue::as_text),
            Some("Preferencial")
        );
        match record.get("duration") {
            Some(FieldValue::Duration(d)) => assert_eq!(d.to_string(), "1 hora 30 minutos"),
            other => panic!("unexpected duration {other:?}"),
        }
        match record.get("price") {
            Some(FieldValue::Money(m)) => {
                assert!((m.amount - 95_000.0).abs() < f64::EPSILON);
                assert_eq!(m.currency, "COP");
            }
            other => panic!("unexpected price {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let schema = CompiledSchema::compile(&bus_profile()).expect("compile");
        let records = extract(&[container("<div><p>06:15 AM</p></div>")], &schema);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.get("departure_time").and_then(FieldValue::as_time).is_some());
        assert_eq!(record.get("arrival_time"), Some(&FieldValue::Absent));
        assert_eq!(record.get("seats"), Some(&FieldValue::Integer(0)));
        assert_eq!(
            record.get("bus_type"),
            Some(&FieldValue::Text("No disponible".to_string()))
        );
        assert_eq!(record.get("duration"), Some(&FieldValue::Absent));
        assert!(matches!(
            record.get("price"),
            Some(FieldValue::Money(Money { amount, .. })) if *amount == 0.0
        ));
    }

    #[test]
    fn test_derived_field_miss_takes_its_default() {
        let mut profile = bus_profile();
        profile.derived[0].default = Some(DefaultValue::Text("No disponible".to_string()));
        let schema = CompiledSchema::compile(&profile).expect("compile");
        let records = extract(&[container("<div><p>06:15 AM</p></div>")], &schema);
        assert_eq!(
            records[0].get("duration"),
            Some(&FieldValue::Text("No disponible".to_string()))
        );

        profile.derived[0].default = Some(DefaultValue::Integer(0));
        let schema = CompiledSchema::compile(&profile).expect("compile");
        let records = extract(&[container("<div><p>06:15 AM</p></div>")], &schema);
        assert_eq!(
            records[0].get("duration"),
            Some(&FieldValue::Duration(Elapsed::from_minutes(0)))
        );
    }

    #[test]
    fn test_every_declared_field_is_present() {
        let schema = CompiledSchema::compile(&bus_profile()).expect("compile");
        let records = extract(&[container("<div>07:00</div>")], &schema);

        let names = schema.field_names();
        assert_eq!(names.len(), 6);
        for name in names {
            assert!(records[0].get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_container_without_identity_is_skipped() {
        let schema = CompiledSchema::compile(&lodging_profile()).expect("compile");
        let cards = vec![
            container(
                r#"<div><div data-testid="listing-card-title">Cabaña en Ibagué</div>
                   <span>$180.000 COP/noche</span></div>"#,
            ),
            container(r#"<div><span>$90.000 COP</span></div>"#),
            container(r#"<div><div data-testid="listing-card-title">Loft centro</div></div>"#),
        ];

        let records = extract(&cards, &schema);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get("title").and_then(FieldValue::as_text), Some("Cabaña en Ibagué"));
        assert!(matches!(
            first.get("price"),
            Some(FieldValue::Money(Money { amount, currency })) if *amount == 180_000.0 && currency == "COP"
        ));

        let second = &records[1];
        assert_eq!(second.get("title").and_then(FieldValue::as_text), Some("Loft centro"));
        assert_eq!(second.get("description"), Some(&FieldValue::Text("N/A".to_string())));
        assert_eq!(second.get("rating"), Some(&FieldValue::Decimal(1.0)));
        assert_eq!(second.get("image"), Some(&FieldValue::Absent));
    }

    #[test]
    fn test_element_attribute_source() {
        let schema = CompiledSchema::compile(&lodging_profile()).expect("compile");
        let cards = vec![container(
            r#"<div><div data-testid="listing-card-title">Casa</div>
               <img src="https://img.example/1.jpg"><span class="r4a59j5">4,92</span></div>"#,
        )];

        let records = extract(&cards, &schema);
        assert_eq!(
            records[0].get("image").and_then(FieldValue::as_text),
            Some("https://img.example/1.jpg")
        );
        assert_eq!(records[0].get("rating"), Some(&FieldValue::Decimal(4.92)));
    }

    #[test]
    fn test_meridiem_from_icon_title() {
        let schema = CompiledSchema::compile(&profile(
            r#"
[site]
id = "omega"
name = "Expreso Omega"
url = "https://www.expresoomega.com"
search_url = "https://www.expresoomega.com/viajes"
category = "buses"
last_verified = "2025-04-12"

[readiness]
candidates = [".resultContainer"]

[locale.meridiem_words]
Madrugada = "am"
Tarde = "pm"

[[fields]]
name = "departure_time"
kind = "time"
source = { from = "element", selector = ".time_and_city" }
meridiem = { selector = "svg[title]", attribute = "title" }
required = true

[[fields]]
name = "arrival_time"
kind = "time"
source = { from = "element", selector = ".time_and_city", last = true }
meridiem = { selector = "svg[title]", attribute = "title" }
"#,
        ))
        .expect("compile");

        let cards = vec![container(
            r#"<div class="resultContainer">
                <div class="time_and_city"><div>01:30</div><svg title="Madrugada"></svg></div>
                <div class="time_and_city"><div>02:40</div><svg title="Tarde"></svg></div>
            </div>"#,
        )];

        let records = extract(&cards, &schema);
        assert_eq!(
            records[0].get("departure_time").and_then(FieldValue::as_time),
            chrono::NaiveTime::from_hms_opt(1, 30, 0)
        );
        assert_eq!(
            records[0].get("arrival_time").and_then(FieldValue::as_time),
            chrono::NaiveTime::from_hms_opt(14, 40, 0)
        );
    }

    #[test]
    fn test_find_containers_in_saved_page() {
        let page = r#"<html><body>
            <div class="travel-card">A</div><div class="travel-card">B</div>
        </body></html>"#;
        let candidates = vec![
            SelectorCandidate {
                priority: 0,
                selector: ".ticket-card-container".to_string(),
            },
            SelectorCandidate {
                priority: 1,
                selector: ".travel-card".to_string(),
            },
        ];

        let (candidate, containers) = find_containers(page, &candidates).expect("match");
        assert_eq!(candidate.priority, 1);
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].text(), "B");

        assert!(find_containers("<html></html>", &candidates).is_none());
    }
}
