use super::rules::{self, Rule};
use super::{PageParser, Readiness};
use crate::content::ContentAccess;
use crate::record::{FieldValue, Fields};
use crate::selector::CssSelector;
use crate::source::CLAUDE_USAGE;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const PERCENT_USED: &str = r"(?i)(\d{1,3})%\s*used";
const RESETS_IN: &str = r"(?i)Resets?\s+in\s+((?:\d+\s*hr?s?\s*)?(?:\d+\s*min?s?)?)";

static SESSION: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::number("session_percent", &[PERCENT_USED]),
        Rule::text("session_reset", &[RESETS_IN]),
    ]
});

static WEEKLY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::number("weekly_percent", &[PERCENT_USED]),
        Rule::text("weekly_reset", &[RESETS_IN]),
    ]
});

static EXTRA: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::number("extra_spent", &[r"(?i)\$([\d.]+)\s*spent"]),
        Rule::text("extra_resets", &[r"(?i)Resets?\s+([A-Za-z]+ \d+)"]),
        Rule::number(
            "extra_limit",
            &[
                r"(?i)\$([\d,]+(?:\.\d{2})?)\s*Monthly\s+spend\s+limit",
                r"(?i)Monthly\s+spend\s+limit[^$]{0,40}\$([\d,]+(?:\.\d{2})?)",
            ],
        ),
        Rule::number(
            "extra_balance",
            &[
                r"(?i)\$([\d.]+)\s*Current\s+balance",
                r"(?i)Current\s+balance[^$]{0,20}\$([\d.]+)",
            ],
        ),
    ]
});

static PERCENT_SCAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PERCENT_USED).expect("valid extraction pattern"));
static RESET_SCAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RESETS_IN).expect("valid extraction pattern"));

/// claude.ai plan usage limits.
pub struct ClaudeUsageParser;

#[async_trait]
impl PageParser for ClaudeUsageParser {
    fn source_key(&self) -> &'static str {
        CLAUDE_USAGE
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            selector: CssSelector::Or(vec![
                CssSelector::tag("main"),
                CssSelector::tag("h1"),
                CssSelector::has_attr("data-testid"),
            ]),
            timeout: Duration::from_secs(6),
            settle: Duration::from_millis(1800),
        }
    }

    async fn read(&self, content: &dyn ContentAccess) -> Fields {
        let text = content.current_text().await;
        let mut fields = Fields::new();

        let session = rules::section(&text, "Current session", Some("Weekly limits"))
            .or_else(|| rules::section(&text, "Plan usage limits", Some("Weekly limits")));
        if let Some(session) = session {
            rules::apply_all(&SESSION, session, &mut fields);
        }

        if let Some(weekly) = rules::section(&text, "Weekly limits", Some("Extra usage")) {
            rules::apply_all(&WEEKLY, weekly, &mut fields);
        }

        if let Some(extra) = rules::section(&text, "Extra usage", None) {
            rules::apply_all(&EXTRA, extra, &mut fields);
            let switch_on = CssSelector::And(vec![
                CssSelector::attr("role", "switch"),
                CssSelector::attr("aria-checked", "true"),
            ]);
            let enabled = content.select_text(&switch_on).await.is_some();
            fields.insert("extra_enabled".to_string(), FieldValue::Flag(enabled));
        }

        scan_unlabelled(&text, &mut fields);
        fields
    }
}

/// Headings renamed or missing: take the first and second occurrences on
/// the whole page as session and weekly.
fn scan_unlabelled(text: &str, fields: &mut Fields) {
    if !fields.contains_key("session_percent") {
        let mut found = PERCENT_SCAN
            .captures_iter(text)
            .filter_map(|c| rules::parse_number(c.get(1)?.as_str()));
        if let Some(session) = found.next() {
            fields.insert("session_percent".to_string(), FieldValue::Number(session));
        }
        if let Some(weekly) = found.next() {
            fields
                .entry("weekly_percent".to_string())
                .or_insert(FieldValue::Number(weekly));
        }
    }

    if !fields.contains_key("session_reset") {
        let mut found = RESET_SCAN
            .captures_iter(text)
            .filter_map(|c| Some(c.get(1)?.as_str().trim().to_string()))
            .filter(|s| !s.is_empty());
        if let Some(session) = found.next() {
            fields.insert("session_reset".to_string(), FieldValue::Text(session));
        }
        if let Some(weekly) = found.next() {
            fields
                .entry("weekly_reset".to_string())
                .or_insert(FieldValue::Text(weekly));
        }
    }
}
