//! Payload construction for the analytics collector.
//!
//! A payload is a flat key-value set in Measurement Protocol v1 form. It is
//! built in three layers, each overriding the previous one on key collision:
//!
//! 1. Hit-type fields (`t`, `dl`/`dt` or `ec`/`ea`/`el`/`ev`)
//! 2. [`DefaultParameters`] (`v`, `aip`, `tid`, `uip`, `ua`, `an`, `av`)
//! 3. Caller-supplied extras
//!
//! Formatting is pure: the same event, extras and defaults always produce the
//! same payload.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::config::AnalyticsConfig;

/// A single parameter value.
///
/// `Absent` keys are kept in the payload so extras can still override them,
/// but they are never written to the wire. `Text(String::new())` is a blank
/// value and is sent as an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Absent,
}

impl ParamValue {
    /// Wire representation, or `None` for absent values and non-finite floats.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) => Some(s.clone()),
            ParamValue::Integer(n) => Some(n.to_string()),
            ParamValue::Float(f) if f.is_finite() => Some(f.to_string()),
            ParamValue::Float(_) | ParamValue::Absent => None,
        }
    }

    /// True for values that would not reach the wire and for text that is
    /// empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            ParamValue::Text(s) => s.trim().is_empty(),
            ParamValue::Float(f) => !f.is_finite(),
            ParamValue::Absent => true,
            ParamValue::Integer(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line style value: integers stay numeric, anything else is text.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => ParamValue::Integer(n),
            Err(_) => ParamValue::Text(raw.to_string()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Integer(n)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Absent, Into::into)
    }
}

/// Caller-supplied parameters merged on top of everything else.
pub type Extras = BTreeMap<String, ParamValue>;

/// Flat payload ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, ParamValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overlay `other` on this payload. Keys in `other` win.
    pub fn merge<I>(&mut self, other: I)
    where
        I: IntoIterator<Item = (String, ParamValue)>,
    {
        self.0.extend(other);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key/value pairs to send, with absent values dropped.
    pub fn to_form(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.to_wire().map(|w| (k.clone(), w)))
            .collect()
    }

    /// Hit type (`t`) as it will be sent.
    pub fn hit_type(&self) -> &str {
        self.get("t").and_then(ParamValue::as_text).unwrap_or("unknown")
    }
}

impl IntoIterator for Payload {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Parameters attached to every hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultParameters {
    pub tracking_id: String,
    pub app_name: String,
    pub app_version: String,
}

impl DefaultParameters {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            tracking_id: config.tracking_id.clone(),
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("v", "1");
        payload.insert("aip", "1");
        payload.insert("tid", self.tracking_id.as_str());
        // Filled in by callers that know the end user
        payload.insert("uip", "");
        payload.insert("ua", "");
        payload.insert("an", self.app_name.as_str());
        payload.insert("av", self.app_version.as_str());
        payload
    }
}

/// One analytics hit before formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    Pageview {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Event {
        category: String,
        action: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        value: Option<i64>,
    },
}

impl AnalyticsEvent {
    pub fn pageview(url: impl Into<String>, title: Option<String>) -> Self {
        AnalyticsEvent::Pageview {
            url: url.into(),
            title,
        }
    }

    pub fn event(
        category: impl Into<String>,
        action: impl Into<String>,
        label: Option<String>,
        value: Option<i64>,
    ) -> Self {
        AnalyticsEvent::Event {
            category: category.into(),
            action: action.into(),
            label,
            value,
        }
    }

    pub fn kind(&self) -> HitKind {
        match self {
            AnalyticsEvent::Pageview { .. } => HitKind::Pageview,
            AnalyticsEvent::Event { .. } => HitKind::Event,
        }
    }

    /// Hit-type fields, the bottom layer of the payload.
    fn base_payload(&self) -> Payload {
        let mut payload = Payload::new();
        match self {
            AnalyticsEvent::Pageview { url, title } => {
                payload.insert("t", "pageview");
                payload.insert("dl", url.as_str());
                payload.insert("dt", title.clone());
            }
            AnalyticsEvent::Event {
                category,
                action,
                label,
                value,
            } => {
                payload.insert("t", "event");
                payload.insert("ec", category.as_str());
                payload.insert("ea", action.as_str());
                payload.insert("el", label.clone());
                payload.insert("ev", *value);
            }
        }
        payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Pageview,
    Event,
}

impl HitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitKind::Pageview => "pageview",
            HitKind::Event => "event",
        }
    }

    /// Keys that must carry a non-blank value.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            HitKind::Pageview => &["dl"],
            HitKind::Event => &["ec", "ea"],
        }
    }
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload that would be rejected by the collector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormattingError {
    #[error("{kind} is missing required field '{field}'")]
    MissingField { kind: HitKind, field: &'static str },
}

/// Builds payloads from events, defaults and extras.
#[derive(Debug, Clone)]
pub struct EventFormatter {
    defaults: DefaultParameters,
}

impl EventFormatter {
    pub fn new(defaults: DefaultParameters) -> Self {
        Self { defaults }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(DefaultParameters::from_config(config))
    }

    pub fn defaults(&self) -> &DefaultParameters {
        &self.defaults
    }

    pub fn format(&self, event: &AnalyticsEvent, extras: &Extras) -> Payload {
        let mut payload = event.base_payload();
        payload.merge(self.defaults.to_payload());
        payload.merge(extras.iter().map(|(k, v)| (k.clone(), v.clone())));
        payload
    }

    /// Format and check that the required fields for the event kind survived
    /// the merge.
    pub fn format_checked(
        &self,
        event: &AnalyticsEvent,
        extras: &Extras,
    ) -> Result<Payload, FormattingError> {
        let payload = self.format(event, extras);
        validate(event.kind(), &payload)?;
        Ok(payload)
    }
}

/// Check the required fields of `kind` in a formatted payload.
pub fn validate(kind: HitKind, payload: &Payload) -> Result<(), FormattingError> {
    for field in kind.required_fields() {
        if payload.get(field).is_none_or(ParamValue::is_blank) {
            return Err(FormattingError::MissingField { kind, field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> EventFormatter {
        EventFormatter::new(DefaultParameters {
            tracking_id: "UA-12345-1".into(),
            app_name: "Read the Docs".into(),
            app_version: "5.1.0".into(),
        })
    }

    fn extras(pairs: &[(&str, ParamValue)]) -> Extras {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(payload: &Payload, key: &str) -> Option<String> {
        payload.get(key).and_then(ParamValue::to_wire)
    }

    fn assert_defaults(payload: &Payload) {
        assert_eq!(text(payload, "v").as_deref(), Some("1"));
        assert_eq!(text(payload, "aip").as_deref(), Some("1"));
        assert_eq!(text(payload, "tid").as_deref(), Some("UA-12345-1"));
        assert_eq!(text(payload, "uip").as_deref(), Some(""));
        assert_eq!(text(payload, "ua").as_deref(), Some(""));
        assert_eq!(text(payload, "an").as_deref(), Some("Read the Docs"));
        assert_eq!(text(payload, "av").as_deref(), Some("5.1.0"));
    }

    #[test]
    fn test_pageview_payload() {
        let event = AnalyticsEvent::pageview(
            "https://docs.example.com/en/latest/",
            Some("Welcome".into()),
        );
        let payload = formatter().format(&event, &Extras::new());

        assert_eq!(payload.hit_type(), "pageview");
        assert_eq!(
            text(&payload, "dl").as_deref(),
            Some("https://docs.example.com/en/latest/")
        );
        assert_eq!(text(&payload, "dt").as_deref(), Some("Welcome"));
        assert_defaults(&payload);
        assert_eq!(payload.len(), 10);
    }

    #[test]
    fn test_pageview_without_title_omits_dt_on_wire() {
        let event = AnalyticsEvent::pageview("https://docs.example.com/", None);
        let payload = formatter().format(&event, &Extras::new());

        assert_eq!(payload.get("dt"), Some(&ParamValue::Absent));
        let form = payload.to_form();
        assert!(form.iter().all(|(k, _)| k != "dt"));
        // Blank placeholders are still sent
        assert!(form.contains(&("uip".to_string(), String::new())));
        assert!(form.contains(&("ua".to_string(), String::new())));
    }

    #[test]
    fn test_event_with_label_value_and_extra() {
        let event = AnalyticsEvent::event("download", "click", Some("pdf".into()), Some(3));
        let payload = formatter().format(&event, &extras(&[("foo", "bar".into())]));

        assert_eq!(payload.hit_type(), "event");
        assert_eq!(text(&payload, "ec").as_deref(), Some("download"));
        assert_eq!(text(&payload, "ea").as_deref(), Some("click"));
        assert_eq!(text(&payload, "el").as_deref(), Some("pdf"));
        assert_eq!(text(&payload, "ev").as_deref(), Some("3"));
        assert_eq!(text(&payload, "foo").as_deref(), Some("bar"));
        assert_defaults(&payload);
    }

    #[test]
    fn test_event_optional_fields_absent() {
        let event = AnalyticsEvent::event("search", "query", None, None);
        let form = formatter().format(&event, &Extras::new()).to_form();
        assert!(form.iter().all(|(k, _)| k != "el" && k != "ev"));
    }

    #[test]
    fn test_extras_override_defaults_and_required_fields() {
        let event = AnalyticsEvent::pageview("https://a.example.com/", None);
        let payload = formatter().format(
            &event,
            &extras(&[
                ("dl", "https://b.example.com/".into()),
                ("uip", "203.0.113.9".into()),
                ("tid", "UA-999-9".into()),
            ]),
        );

        assert_eq!(text(&payload, "dl").as_deref(), Some("https://b.example.com/"));
        assert_eq!(text(&payload, "uip").as_deref(), Some("203.0.113.9"));
        assert_eq!(text(&payload, "tid").as_deref(), Some("UA-999-9"));
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let event = AnalyticsEvent::event("download", "click", None, Some(1));
        let extra = extras(&[("cd1", "pip".into()), ("ua", "curl/8.0".into())]);
        let f = formatter();
        assert_eq!(f.format(&event, &extra).to_form(), f.format(&event, &extra).to_form());
    }

    #[test]
    fn test_validation_rejects_blank_url() {
        let event = AnalyticsEvent::pageview("  ", None);
        let err = formatter()
            .format_checked(&event, &Extras::new())
            .unwrap_err();
        assert_eq!(
            err,
            FormattingError::MissingField {
                kind: HitKind::Pageview,
                field: "dl"
            }
        );
    }

    #[test]
    fn test_validation_sees_extras() {
        let event = AnalyticsEvent::event("download", "click", None, None);
        let err = formatter()
            .format_checked(&event, &extras(&[("ea", ParamValue::Absent)]))
            .unwrap_err();
        assert_eq!(err.to_string(), "event is missing required field 'ea'");

        // An extra can also repair a blank required field
        let event = AnalyticsEvent::event("", "click", None, None);
        assert!(
            formatter()
                .format_checked(&event, &extras(&[("ec", "download".into())]))
                .is_ok()
        );
    }

    #[test]
    fn test_param_value_parse_lossy() {
        assert_eq!(ParamValue::parse_lossy("42"), ParamValue::Integer(42));
        assert_eq!(ParamValue::parse_lossy("4.2"), ParamValue::Text("4.2".into()));
        assert_eq!(ParamValue::parse_lossy(""), ParamValue::Text(String::new()));
    }

    #[test]
    fn test_non_finite_floats_not_sent() {
        assert_eq!(ParamValue::Float(1.5).to_wire(), Some("1.5".into()));
        assert_eq!(ParamValue::Float(f64::NAN).to_wire(), None);
        assert_eq!(ParamValue::Float(f64::INFINITY).to_wire(), None);
        assert_eq!(ParamValue::Float(f64::NEG_INFINITY).to_wire(), None);
        assert!(ParamValue::Float(f64::NAN).is_blank());
        assert!(!ParamValue::Float(0.0).is_blank());

        let event = AnalyticsEvent::pageview("https://docs.example.com/", None);
        let mut extras = Extras::new();
        extras.insert("cm1".into(), ParamValue::Float(f64::NAN));
        let form = formatter().format(&event, &extras).to_form();
        assert!(!form.iter().any(|(k, _)| k == "cm1"));
    }

    #[test]
    fn test_payload_serializes_as_flat_map() {
        let event = AnalyticsEvent::pageview("https://docs.example.com/", None);
        let json = serde_json::to_value(formatter().format(&event, &Extras::new())).unwrap();
        assert_eq!(json["t"], "pageview");
        assert!(json["dt"].is_null());
    }
}
