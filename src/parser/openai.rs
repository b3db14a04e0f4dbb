use super::rules::{self, Rule, Transform};
use super::{PageParser, Readiness};
use crate::content::ContentAccess;
use crate::record::Fields;
use crate::selector::CssSelector;
use crate::source::OPENAI_BILLING;
use async_trait::async_trait;
use std::sync::LazyLock;
use std::time::Duration;

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::number(
            "balance_usd",
            &[
                r"(?i)Credit\s+balance[\s\S]{0,40}\$([\d,]+(?:\.\d{2})?)",
                r"(?i)\$([\d,]+\.\d{2})\s*(?:USD)?\s*(?:credit|balance)",
                r"(?i)balance[^$]{0,30}\$([\d,]+\.\d{2})",
            ],
        ),
        Rule::new(
            &[
                ("credits_used_usd", Transform::Number),
                ("credits_total_usd", Transform::Number),
            ],
            &[r"(?i)([\d,]+(?:\.\d{2,})?)\s*(?:of|/)\s*([\d,]+(?:\.\d{2,})?)\s*(?:credits?|used)"],
        ),
        Rule::number(
            "hard_limit_usd",
            &[
                r"(?i)(?:hard\s+limit|monthly\s+limit|spend\s+limit)[^$]{0,40}\$([\d,]+(?:\.\d{2})?)",
                r"(?i)\$([\d,]+(?:\.\d{2})?)\s*(?:hard\s+limit|spend\s+limit)",
            ],
        ),
        Rule::number(
            "soft_limit_usd",
            &[r"(?i)(?:soft\s+limit|email\s+alert)[^$]{0,40}\$([\d,]+(?:\.\d{2})?)"],
        ),
        Rule::number(
            "month_usage_usd",
            &[
                r"(?i)\$([\d,]+\.\d{2,4})\s*(?:this\s*month|current\s*period)",
                r"(?i)(?:this\s*month|current\s*period)[^$]{0,30}\$([\d,]+\.\d{2,4})",
            ],
        ),
        Rule::text("tier", &[r"(?i)(?:usage\s+tier|tier)[: \t]+(\w[\w \t-]{0,20})"]),
        Rule::flag("auto_recharge", &[r"(?i)auto.?recharge\s*(?:is\s*)?on\b"]),
    ]
});

/// platform.openai.com billing overview.
pub struct OpenAiBillingParser;

#[async_trait]
impl PageParser for OpenAiBillingParser {
    fn source_key(&self) -> &'static str {
        OPENAI_BILLING
    }

    fn readiness(&self) -> Readiness {
        Readiness {
            selector: CssSelector::Or(vec![
                CssSelector::has_attr("data-testid"),
                CssSelector::class("billing-overview"),
                CssSelector::tag("section"),
            ]),
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(3),
        }
    }

    async fn read(&self, content: &dyn ContentAccess) -> Fields {
        let text = content.current_text().await;
        let mut fields = Fields::new();
        rules::apply_all(&RULES, &text, &mut fields);
        fields
    }
}
