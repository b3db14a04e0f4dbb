use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields every record carries; never compared, never previewed.
pub const RESERVED_FIELDS: [&str; 3] = ["source", "timestamp", "page_url"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

/// Output of one extraction cycle. Serialises as a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    source: String,
    timestamp: DateTime<Utc>,
    page_url: String,
    #[serde(flatten)]
    fields: Fields,
}

impl MetricsRecord {
    pub fn new(source: impl Into<String>, page_url: impl Into<String>, fields: Fields) -> Self {
        Self::captured_at(source, page_url, Utc::now(), fields)
    }

    pub fn captured_at(
        source: impl Into<String>,
        page_url: impl Into<String>,
        timestamp: DateTime<Utc>,
        mut fields: Fields,
    ) -> Self {
        fields.retain(|name, _| !is_reserved(name));
        Self {
            source: source.into(),
            timestamp,
            page_url: page_url.into(),
            fields,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// Non-reserved fields only.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn has_data(&self) -> bool {
        !self.fields.is_empty()
    }

    /// `key: value` lines for display.
    pub fn preview(&self) -> String {
        if self.fields.is_empty() {
            return "(no data to show)".to_string();
        }
        self.fields
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MetricsRecord {
        let mut fields = Fields::new();
        fields.insert("balance_usd".into(), 42.5.into());
        fields.insert("tier".into(), "Tier 3".into());
        fields.insert("auto_recharge".into(), true.into());
        MetricsRecord::new("openai_billing", "https://platform.openai.com/settings/organization/billing/overview", fields)
    }

    #[test]
    fn serialises_flat_with_reserved_fields() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["source"], json!("openai_billing"));
        assert_eq!(value["balance_usd"], json!(42.5));
        assert_eq!(value["auto_recharge"], json!(true));
        assert!(value["timestamp"].is_string());
        assert!(value["page_url"].as_str().unwrap().contains("billing"));
    }

    #[test]
    fn reserved_names_never_become_fields() {
        let mut fields = Fields::new();
        fields.insert("source".into(), "spoof".into());
        fields.insert("credits".into(), 1.0.into());
        let record = MetricsRecord::new("claude_usage", "https://claude.ai/settings/usage", fields);
        assert_eq!(record.source(), "claude_usage");
        assert_eq!(record.fields().len(), 1);
    }

    #[test]
    fn preview_skips_reserved_fields() {
        let preview = sample().preview();
        assert_eq!(preview, "auto_recharge: true\nbalance_usd: 42.5\ntier: Tier 3");
        let empty = MetricsRecord::new("x", "https://x", Fields::new());
        assert_eq!(empty.preview(), "(no data to show)");
    }
}
