use crate::record::{FieldValue, Fields};
use regex::Regex;

/// How a captured string becomes a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Strip currency, percent and grouping separators, then parse as f64.
    Number,
    /// Trimmed text.
    Text,
    /// The pattern matching at all sets the field to `true`.
    Flag,
}

impl Transform {
    pub fn apply(&self, raw: Option<&str>) -> Option<FieldValue> {
        match self {
            Transform::Number => raw.and_then(parse_number).map(FieldValue::Number),
            Transform::Text => raw
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| FieldValue::Text(s.to_string())),
            Transform::Flag => Some(FieldValue::Flag(true)),
        }
    }
}

/// One field group and its ordered alternative patterns.
/// Capture group `i + 1` feeds `targets[i]`; the first alternative whose
/// captures all convert wins.
#[derive(Debug)]
pub struct Rule {
    targets: Vec<(&'static str, Transform)>,
    patterns: Vec<Regex>,
}

impl Rule {
    pub fn new(targets: &[(&'static str, Transform)], patterns: &[&str]) -> Self {
        Self {
            targets: targets.to_vec(),
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("valid extraction pattern"))
                .collect(),
        }
    }

    pub fn number(field: &'static str, patterns: &[&str]) -> Self {
        Self::new(&[(field, Transform::Number)], patterns)
    }

    pub fn text(field: &'static str, patterns: &[&str]) -> Self {
        Self::new(&[(field, Transform::Text)], patterns)
    }

    pub fn flag(field: &'static str, patterns: &[&str]) -> Self {
        Self::new(&[(field, Transform::Flag)], patterns)
    }

    /// Applies the rule to `text`. Returns whether an alternative matched.
    pub fn apply(&self, text: &str, fields: &mut Fields) -> bool {
        for pattern in &self.patterns {
            let Some(caps) = pattern.captures(text) else {
                continue;
            };
            let values: Option<Vec<FieldValue>> = self
                .targets
                .iter()
                .enumerate()
                .map(|(i, (_, transform))| transform.apply(caps.get(i + 1).map(|m| m.as_str())))
                .collect();
            if let Some(values) = values {
                for ((field, _), value) in self.targets.iter().zip(values) {
                    fields.insert(field.to_string(), value);
                }
                return true;
            }
        }
        false
    }

    /// Fields this rule can produce.
    pub fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.targets.iter().map(|(field, _)| *field)
    }
}

pub fn apply_all(rules: &[Rule], text: &str, fields: &mut Fields) {
    for rule in rules {
        if !rule.apply(text, fields) {
            log::debug!("No pattern matched for {:?}", rule.targets().collect::<Vec<_>>());
        }
    }
}

/// Parses `$1,234.50`, `US$ 3`, `73%` style numbers.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("US")
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Text from `start` up to `end` (exclusive), or to the end of the document
/// when `end` is absent or not found after `start`.
pub fn section<'a>(text: &'a str, start: &str, end: Option<&str>) -> Option<&'a str> {
    let from = text.find(start)?;
    let rest = &text[from..];
    match end.and_then(|marker| rest[start.len()..].find(marker)) {
        Some(offset) => Some(&rest[..start.len() + offset]),
        None => Some(rest),
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Inserts `out = consumed / total * 100` rounded to one decimal when both
/// inputs are present and total is positive.
pub fn derive_percent(fields: &mut Fields, consumed: &str, total: &str, out: &'static str) {
    let consumed = fields.get(consumed).and_then(FieldValue::as_number);
    let total = fields.get(total).and_then(FieldValue::as_number);
    if let (Some(consumed), Some(total)) = (consumed, total) {
        if total > 0.0 {
            fields.insert(out.to_string(), FieldValue::Number(round1(consumed / total * 100.0)));
        }
    }
}
