use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const PAGEVIEW: &str = "pageview";
pub const CTA_CLICK: &str = "cta_click";
pub const SCROLL_DEPTH: &str = "scroll_depth";
pub const NAV_CLICK: &str = "nav_click";
pub const SERVICE_CLICK: &str = "service_click";

/// A visitor interaction record as returned by the event store.
///
/// Events are read-only inputs to an aggregation pass. Every descriptive
/// field is optional because the tracker does not guarantee attribution;
/// blank strings are treated the same as missing values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub visitor_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: String,
    pub page_path: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub device_type: Option<String>,
    pub browser_name: Option<String>,
    pub os_name: Option<String>,
    pub language: Option<String>,
    /// `None` when the stored timestamp could not be read.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Event {
    pub fn visitor(&self) -> Option<&str> {
        non_blank(self.visitor_id.as_deref())
    }

    pub fn session(&self) -> Option<&str> {
        non_blank(self.session_id.as_deref())
    }

    pub fn page(&self) -> Option<&str> {
        non_blank(self.page_path.as_deref())
    }

    pub fn is_pageview(&self) -> bool {
        self.event_type == PAGEVIEW
    }

    /// Pageview accounting deliberately accepts any event that carries a page
    /// path, not only events tagged `pageview`.
    pub fn counts_as_pageview(&self) -> bool {
        self.is_pageview() || self.page().is_some()
    }
}

/// Trim a string and drop it when nothing is left.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Free-form event attributes.
///
/// Trackers send either a JSON object or a JSON-encoded string. `Raw` holds
/// the string form until [`Metadata::normalized`] parses it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Metadata {
    #[default]
    Empty,
    Structured(Map<String, Value>),
    Raw(String),
}

impl Metadata {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Structured(map),
            Value::String(raw) => Self::Raw(raw),
            _ => Self::Empty,
        }
    }

    /// Resolve `Raw` into `Structured` when it parses to a JSON object, and
    /// into `Empty` otherwise. Never fails.
    pub fn normalized(&self) -> Cow<'_, Metadata> {
        match self {
            Self::Raw(raw) => Cow::Owned(parse_raw(raw)),
            other => Cow::Borrowed(other),
        }
    }

    /// Read `key` as a display label. Strings are trimmed, numbers and booleans
    /// are rendered as text, anything else counts as missing.
    pub fn label(&self, key: &str) -> Option<String> {
        let Self::Structured(map) = self else {
            return None;
        };
        match map.get(key)? {
            Value::String(s) => non_blank(Some(s.as_str())).map(str::to_string),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Serialized form for storage columns.
    pub fn to_storage_string(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Structured(map) => Some(Value::Object(map.clone()).to_string()),
            Self::Raw(raw) => Some(raw.clone()),
        }
    }
}

fn parse_raw(raw: &str) -> Metadata {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Metadata::Structured(map),
        // Double-encoded payloads arrive as a JSON string holding JSON.
        Ok(Value::String(inner)) if inner != raw => parse_raw(&inner),
        Ok(_) => Metadata::Empty,
        Err(e) => {
            tracing::debug!(error = %e, "unparsable event metadata treated as empty");
            Metadata::Empty
        }
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_none(),
            Self::Structured(map) => map.serialize(serializer),
            Self::Raw(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.map(Self::from_value).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_object_normalizes_to_structured() {
        let meta = Metadata::Raw(r#"{"location":"hero"}"#.to_string());
        assert_eq!(meta.normalized().label("location").as_deref(), Some("hero"));
    }

    #[test]
    fn unparsable_raw_normalizes_to_empty() {
        let meta = Metadata::Raw("not json".to_string());
        assert_eq!(*meta.normalized(), Metadata::Empty);
    }

    #[test]
    fn raw_json_array_normalizes_to_empty() {
        let meta = Metadata::Raw("[1,2,3]".to_string());
        assert_eq!(*meta.normalized(), Metadata::Empty);
    }

    #[test]
    fn double_encoded_raw_is_unwrapped() {
        let encoded = serde_json::to_string(r#"{"depth":75}"#).expect("encode");
        let meta = Metadata::Raw(encoded);
        assert_eq!(meta.normalized().label("depth").as_deref(), Some("75"));
    }

    #[test]
    fn label_ignores_blank_and_nested_values() {
        let meta = Metadata::from_value(json!({ "a": "  ", "b": { "c": 1 }, "d": true }));
        assert_eq!(meta.label("a"), None);
        assert_eq!(meta.label("b"), None);
        assert_eq!(meta.label("d").as_deref(), Some("true"));
        assert_eq!(meta.label("missing"), None);
    }

    #[test]
    fn deserializes_every_wire_shape() {
        let structured: Event = serde_json::from_value(json!({
            "event_type": "cta_click",
            "metadata": { "location": "footer" }
        }))
        .expect("structured");
        assert!(matches!(structured.metadata, Metadata::Structured(_)));

        let raw: Event = serde_json::from_value(json!({
            "event_type": "cta_click",
            "metadata": "{\"location\":\"footer\"}"
        }))
        .expect("raw");
        assert!(matches!(raw.metadata, Metadata::Raw(_)));

        let null: Event = serde_json::from_value(json!({
            "event_type": "cta_click",
            "metadata": null
        }))
        .expect("null");
        assert_eq!(null.metadata, Metadata::Empty);

        let absent: Event =
            serde_json::from_value(json!({ "event_type": "pageview" })).expect("absent");
        assert_eq!(absent.metadata, Metadata::Empty);
    }

    #[test]
    fn page_path_alone_counts_as_pageview() {
        let event = Event {
            event_type: "form_opened".to_string(),
            page_path: Some("/apply".to_string()),
            ..Default::default()
        };
        assert!(event.counts_as_pageview());
        assert!(!event.is_pageview());

        let blank = Event {
            event_type: "form_opened".to_string(),
            page_path: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!blank.counts_as_pageview());
    }
}
