use serde::Serialize;
use url::Url;

/// A page type the agent knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub host: &'static str,
    pub default_interval_secs: u64,
    pub expected_path_prefix: &'static str,
    /// Canonical page to open for this source.
    pub page_url: &'static str,
}

pub const OPENAI_BILLING: &str = "openai_billing";
pub const CLAUDE_USAGE: &str = "claude_usage";
pub const CLAUDE_BILLING: &str = "claude_billing";
pub const GITHUB_COPILOT: &str = "github_copilot";

pub static SOURCES: [SourceDescriptor; 4] = [
    SourceDescriptor {
        key: OPENAI_BILLING,
        label: "OpenAI Billing",
        host: "platform.openai.com",
        default_interval_secs: 120,
        expected_path_prefix: "/settings/organization/billing",
        page_url: "https://platform.openai.com/settings/organization/billing/overview",
    },
    SourceDescriptor {
        key: CLAUDE_USAGE,
        label: "Claude.ai Usage",
        host: "claude.ai",
        default_interval_secs: 60,
        expected_path_prefix: "/settings/usage",
        page_url: "https://claude.ai/settings/usage",
    },
    SourceDescriptor {
        key: CLAUDE_BILLING,
        label: "Claude API Billing",
        host: "platform.claude.com",
        default_interval_secs: 120,
        expected_path_prefix: "/settings/billing",
        page_url: "https://platform.claude.com/settings/billing",
    },
    SourceDescriptor {
        key: GITHUB_COPILOT,
        label: "GitHub Copilot",
        host: "github.com",
        default_interval_secs: 180,
        expected_path_prefix: "/settings/billing/premium_requests_usage",
        page_url: "https://github.com/settings/billing/premium_requests_usage",
    },
];

pub fn by_key(key: &str) -> Option<&'static SourceDescriptor> {
    SOURCES.iter().find(|s| s.key == key)
}

pub fn by_host(host: &str) -> Option<&'static SourceDescriptor> {
    SOURCES.iter().find(|s| s.host.eq_ignore_ascii_case(host))
}

/// Identifies the source serving `url` by its host.
pub fn for_url(url: &str) -> Option<&'static SourceDescriptor> {
    let parsed = Url::parse(url).ok()?;
    by_host(parsed.host_str()?)
}

impl SourceDescriptor {
    /// Whether `url` still points at the page this source parses.
    pub fn matches_path(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.path().starts_with(self.expected_path_prefix),
            Err(_) => false,
        }
    }
}
