use super::rules::{self, Rule};
use super::{PageParser, Readiness};
use crate::content::ContentAccess;
use crate::record::Fields;
use crate::selector::CssSelector;
use crate::source::CLAUDE_BILLING;
use async_trait::async_trait;
use std::sync::LazyLock;
use std::time::Duration;

const CREDIT_BALANCE_CARD: &str = "credit-balance";

static TEXT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::text(
            "plan",
            &[
                r"(?i)(?:Current\s+)?plan[: \t]+([^\n\r]{1,40})",
                r"(?i)(Pro|Team|Enterprise|Developer|Free|Scale)\s+plan",
            ],
        ),
        Rule::text(
            "next_billing",
            &[r"(?i)(?:next\s+billing|renews?)\D{0,30}?([A-Za-z]+ \d{1,2},? \d{4})"],
        ),
        Rule::number(
            "monthly_usd",
            &[r"(?i)\$([\d.]+)\s*/\s*(?:month|mo)\b", r"(?i)\$([\d.]+)\s*per\s+month"],
        ),
        Rule::number("this_month_usd", &[r"(?i)(?:usage|this\s+month)[^$]{0,30}\$([\d.]+)"]),
        Rule::number("spend_limit_usd", &[r"(?i)(?:spend|credit)\s+limit[^$]{0,30}\$([\d.]+)"]),
    ]
});

static CARD_BALANCE: LazyLock<Rule> = LazyLock::new(|| {
    Rule::number(
        "balance_usd",
        &[r"(?i)US\$\s*([\d,]+(?:\.\d+)?)", r"\$([\d,]+(?:\.\d+)?)"],
    )
});

static TEXT_BALANCE: LazyLock<Rule> = LazyLock::new(|| {
    Rule::number(
        "balance_usd",
        &[
            r"(?i)(?:US)?\$([\d,]+(?:\.\d+)?)\s*Remaining\s+Balance",
            r"(?i)Remaining\s+Balance[\s\S]{0,30}?(?:US)?\$([\d,]+(?:\.\d+)?)",
        ],
    )
});

/// platform.claude.com billing.
pub struct ClaudeBillingParser;

#[async_trait]
impl PageParser for ClaudeBillingParser {
    fn source_key(&self) -> &'static str {
        CLAUDE_BILLING
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            selector: CssSelector::Or(vec![
                CssSelector::test_id(CREDIT_BALANCE_CARD),
                CssSelector::tag("main"),
                CssSelector::has_attr("data-testid"),
            ]),
            timeout: Duration::from_secs(6),
            settle: Duration::from_millis(1800),
        }
    }

    async fn read(&self, content: &dyn ContentAccess) -> Fields {
        let text = content.current_text().await;
        let mut fields = Fields::new();
        rules::apply_all(&TEXT_RULES, &text, &mut fields);

        // The balance card is authoritative; page text is the fallback.
        let card = content
            .select_text(&CssSelector::test_id(CREDIT_BALANCE_CARD))
            .await;
        let from_card = card.is_some_and(|card| CARD_BALANCE.apply(&card, &mut fields));
        if !from_card {
            TEXT_BALANCE.apply(&text, &mut fields);
        }
        fields
    }
}
