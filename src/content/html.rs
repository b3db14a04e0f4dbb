use super::ContentAccess;
use crate::selector::CssSelector;
use async_trait::async_trait;
use select::document::Document;
use select::node::Node;
use select::predicate::Text;
use tokio::sync::{watch, RwLock};

const HIDDEN_TAGS: [&str; 5] = ["head", "script", "style", "noscript", "template"];

/// An in-memory HTML page. Mutations and in-place navigation are applied
/// through `replace_html` and `navigate`.
pub struct HtmlDocument {
    html: RwLock<String>,
    url: watch::Sender<String>,
}

impl HtmlDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let (url_tx, _) = watch::channel(url.into());
        Self {
            html: RwLock::new(html.into()),
            url: url_tx,
        }
    }

    pub async fn replace_html(&self, html: impl Into<String>) {
        *self.html.write().await = html.into();
    }

    /// Swaps the content and publishes the new URL if it changed.
    pub async fn navigate(&self, url: impl Into<String>, html: impl Into<String>) {
        self.replace_html(html).await;
        let url = url.into();
        self.url.send_if_modified(|current| {
            if *current != url {
                *current = url;
                true
            } else {
                false
            }
        });
    }

    pub async fn html(&self) -> String {
        self.html.read().await.clone()
    }
}

/// Text runs outside head/script/style, trimmed, one per line.
pub fn visible_text(html: &str) -> String {
    let doc = Document::from(html);
    doc.find(Text)
        .filter(|node| !is_hidden(node))
        .filter_map(|node| node.as_text().map(str::trim))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn first_match_text(html: &str, selector: &CssSelector) -> Option<String> {
    let doc = Document::from(html);
    let node = doc.find(selector).next()?;
    Some(collapse_whitespace(&node.text()))
}

fn is_hidden(node: &Node) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.name().is_some_and(|name| HIDDEN_TAGS.contains(&name)) {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ContentAccess for HtmlDocument {
    async fn current_url(&self) -> String {
        self.url.borrow().clone()
    }

    async fn current_text(&self) -> String {
        visible_text(&self.html.read().await)
    }

    async fn select_text(&self, selector: &CssSelector) -> Option<String> {
        first_match_text(&self.html.read().await, selector)
    }

    fn watch_url(&self) -> Option<watch::Receiver<String>> {
        Some(self.url.subscribe())
    }
}
