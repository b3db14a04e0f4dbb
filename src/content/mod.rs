use crate::error::Result;
use crate::selector::CssSelector;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

pub mod html;
pub mod remote;

pub use html::HtmlDocument;
pub use remote::RemotePage;

const WAIT_POLL_STEP: Duration = Duration::from_millis(100);

/// Read access to the document the agent is watching.
#[async_trait]
pub trait ContentAccess: Send + Sync {
    async fn current_url(&self) -> String;

    /// Visible text of the whole document, one text run per line.
    async fn current_text(&self) -> String;

    /// Text of the first element matching `selector`.
    async fn select_text(&self, selector: &CssSelector) -> Option<String>;

    /// Waits until `selector` matches or `timeout` elapses.
    /// Always checks at least once, even with a zero timeout.
    async fn wait_for(&self, selector: &CssSelector, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(text) = self.select_text(selector).await {
                return Some(text);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep(WAIT_POLL_STEP.min(deadline - now)).await;
        }
    }

    /// Feed of URL changes, for documents that navigate in place.
    fn watch_url(&self) -> Option<watch::Receiver<String>> {
        None
    }

    /// Reloads the whole document.
    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}
