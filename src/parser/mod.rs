//! Per-source page parsers.
//!
//! Every parser waits for a readiness selector (bounded, never fatal), lets
//! the page settle, then reads fields through ordered fallback rules. A
//! read that yields nothing but a single zero is treated as an unrendered
//! placeholder and read once more after a delay.

use crate::content::ContentAccess;
use crate::error::{Error, Result};
use crate::record::{FieldValue, Fields, MetricsRecord};
use crate::selector::CssSelector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

pub mod claude_billing;
pub mod claude_usage;
pub mod github_copilot;
pub mod openai;
pub mod rules;

pub const PLACEHOLDER_RETRY_DELAY: Duration = Duration::from_secs(3);

/// What a parser waits for before reading.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub selector: CssSelector,
    pub timeout: Duration,
    /// Extra delay after the wait, for numbers rendered after the layout.
    pub settle: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Real-page waits.
    #[default]
    Reference,
    /// Every wait collapses to zero.
    Immediate,
}

impl Pacing {
    pub fn scale(&self, wait: Duration) -> Duration {
        match self {
            Pacing::Reference => wait,
            Pacing::Immediate => Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait PageParser: Send + Sync {
    fn source_key(&self) -> &'static str;

    fn readiness(&self) -> Readiness;

    /// Reads every field it can from the current content. Reads the full
    /// document text exactly once.
    async fn read(&self, content: &dyn ContentAccess) -> Fields;
}

pub struct ParserSet {
    parsers: HashMap<&'static str, Box<dyn PageParser>>,
    pacing: Pacing,
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::new(Pacing::Reference)
    }
}

impl ParserSet {
    pub fn new(pacing: Pacing) -> Self {
        let mut set = Self::empty(pacing);
        set.register(Box::new(openai::OpenAiBillingParser));
        set.register(Box::new(claude_usage::ClaudeUsageParser));
        set.register(Box::new(claude_billing::ClaudeBillingParser));
        set.register(Box::new(github_copilot::GitHubCopilotParser));
        set
    }

    /// A set with no parsers registered.
    pub fn empty(pacing: Pacing) -> Self {
        Self {
            parsers: HashMap::new(),
            pacing,
        }
    }

    pub fn register(&mut self, parser: Box<dyn PageParser>) {
        self.parsers.insert(parser.source_key(), parser);
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn supports(&self, key: &str) -> bool {
        self.parsers.contains_key(key)
    }

    pub async fn extract(&self, key: &str, content: &dyn ContentAccess) -> Result<MetricsRecord> {
        let parser = self
            .parsers
            .get(key)
            .ok_or_else(|| Error::UnknownSource(key.to_string()))?;

        let ready = parser.readiness();
        let timeout = self.pacing.scale(ready.timeout);
        if content.wait_for(&ready.selector, timeout).await.is_none() {
            log::debug!(
                "{}: '{}' did not appear within {:?}, reading anyway",
                key,
                ready.selector.to_css_string(),
                timeout
            );
        }
        sleep(self.pacing.scale(ready.settle)).await;

        let mut fields = parser.read(content).await;
        if looks_like_placeholder(&fields) {
            log::debug!("{}: only a zero placeholder found, reading again", key);
            sleep(self.pacing.scale(PLACEHOLDER_RETRY_DELAY)).await;
            fields.extend(parser.read(content).await);
        }

        let url = content.current_url().await;
        Ok(MetricsRecord::new(key, url, fields))
    }
}

/// A lone numeric zero is what pages show before their data arrives.
fn looks_like_placeholder(fields: &Fields) -> bool {
    fields.len() == 1
        && fields
            .values()
            .all(|v| matches!(v, FieldValue::Number(n) if *n == 0.0))
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedText;
    use super::*;
    use crate::source;

    const OPENAI_URL: &str = "https://platform.openai.com/settings/organization/billing/overview";

    #[tokio::test]
    async fn unknown_source_is_a_parse_failure() {
        let set = ParserSet::new(Pacing::Immediate);
        let content = ScriptedText::new(OPENAI_URL, &["anything"]);
        let err = set.extract("gemini_console", &content).await.unwrap_err();
        assert!(matches!(err, Error::UnknownSource(ref k) if k == "gemini_console"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_placeholder_triggers_exactly_one_reread() {
        let set = ParserSet::new(Pacing::Reference);
        let content = ScriptedText::new(
            OPENAI_URL,
            &["Credit balance $0.00", "Credit balance $0.00\n35.00 of 100.00 credits"],
        );
        let record = set.extract(source::OPENAI_BILLING, &content).await.unwrap();
        assert_eq!(content.reads(), 2);
        assert_eq!(record.get("balance_usd"), Some(&FieldValue::Number(0.0)));
        assert_eq!(record.get("credits_used_usd"), Some(&FieldValue::Number(35.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_retry_happens_once_even_if_still_zero() {
        let set = ParserSet::new(Pacing::Reference);
        let content = ScriptedText::new(OPENAI_URL, &["Credit balance $0.00"]);
        let record = set.extract(source::OPENAI_BILLING, &content).await.unwrap();
        assert_eq!(content.reads(), 2);
        assert_eq!(record.fields().len(), 1);
    }

    #[tokio::test]
    async fn real_zero_with_other_fields_is_not_retried() {
        let set = ParserSet::new(Pacing::Immediate);
        let content = ScriptedText::new(OPENAI_URL, &["Credit balance $0.00\n0.00 of 100.00 credits"]);
        set.extract(source::OPENAI_BILLING, &content).await.unwrap();
        assert_eq!(content.reads(), 1);
    }

    #[tokio::test]
    async fn every_registered_source_is_known() {
        let set = ParserSet::default();
        for descriptor in &source::SOURCES {
            assert!(set.supports(descriptor.key));
        }
    }
}
