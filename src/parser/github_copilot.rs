use super::rules::{self, Rule};
use super::{PageParser, Readiness};
use crate::content::ContentAccess;
use crate::record::{FieldValue, Fields};
use crate::selector::CssSelector;
use crate::source::GITHUB_COPILOT;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const INCLUDED_CARD: &str = "included-premium-requests-card";
const BILLED_CARD: &str = "total-billed-amount-card";

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d.]+").expect("valid extraction pattern"));

static TEXT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::number(
            "resets_in_days",
            &[r"(?i)resets?\s+in\s+(\d+)\s*days?", r"(?i)(\d+)\s*days?\s+(?:until\s+)?reset"],
        ),
        Rule::text("next_billing", &[r"(?i)resets?\s+in\s+\d+\s*days?\s+on\s+([^\n.]+)"]),
    ]
});

/// github.com premium request usage.
pub struct GitHubCopilotParser;

fn card_part(card: &str, part: &str) -> CssSelector {
    CssSelector::class_contains(part).within(CssSelector::test_id(card))
}

/// First bare number in `text` once grouping commas are gone.
fn first_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    FIRST_NUMBER
        .find_iter(&cleaned)
        .find_map(|m| rules::parse_number(m.as_str()))
}

#[async_trait]
impl PageParser for GitHubCopilotParser {
    fn source_key(&self) -> &'static str {
        GITHUB_COPILOT
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            selector: CssSelector::test_id(INCLUDED_CARD),
            timeout: Duration::from_secs(10),
            settle: Duration::from_millis(800),
        }
    }

    async fn read(&self, content: &dyn ContentAccess) -> Fields {
        let mut fields = Fields::new();

        if let Some(value) = content.select_text(&card_part(INCLUDED_CARD, "cardValue")).await {
            if let Some(consumed) = rules::parse_number(&value) {
                fields.insert("included_consumed".to_string(), FieldValue::Number(consumed));
            }
        }
        // Entitlement reads "of 1,500 included".
        if let Some(entitlement) = content
            .select_text(&card_part(INCLUDED_CARD, "entitlementText"))
            .await
        {
            if let Some(total) = first_number(&entitlement) {
                fields.insert("included_total".to_string(), FieldValue::Number(total));
            }
        }
        rules::derive_percent(&mut fields, "included_consumed", "included_total", "included_percent");

        if let Some(billed) = content.select_text(&card_part(BILLED_CARD, "cardValue")).await {
            if let Some(amount) = first_number(&billed) {
                fields.insert("billed_usd".to_string(), FieldValue::Number(amount));
            }
        }

        let text = content.current_text().await;
        rules::apply_all(&TEXT_RULES, &text, &mut fields);
        fields
    }
}
