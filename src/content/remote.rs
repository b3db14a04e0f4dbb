use super::{ContentAccess, HtmlDocument};
use crate::error::{Error, Result};
use crate::selector::CssSelector;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;

/// A page fetched over HTTP. `reload` fetches it again.
pub struct RemotePage {
    client: Client,
    url: String,
    document: HtmlDocument,
}

impl RemotePage {
    pub async fn open(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("quota-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let url = url.into();
        let html = fetch(&client, &url).await?;
        Ok(Self {
            client,
            document: HtmlDocument::new(url.clone(), html),
            url,
        })
    }
}

async fn fetch(client: &Client, url: &str) -> Result<String> {
    log::info!("Fetching: {}", url);

    let res = client.get(url).send().await?;
    let status = res.status();
    if !status.is_success() {
        return Err(Error::Internal(format!("HTTP error: {} for {}", status, url)));
    }

    let html = res.text().await?;
    log::debug!("HTML length: {} bytes", html.len());
    Ok(html)
}

#[async_trait]
impl ContentAccess for RemotePage {
    async fn current_url(&self) -> String {
        self.document.current_url().await
    }

    async fn current_text(&self) -> String {
        self.document.current_text().await
    }

    async fn select_text(&self, selector: &CssSelector) -> Option<String> {
        self.document.select_text(selector).await
    }

    fn watch_url(&self) -> Option<watch::Receiver<String>> {
        self.document.watch_url()
    }

    async fn reload(&self) -> Result<()> {
        let html = fetch(&self.client, &self.url).await?;
        self.document.replace_html(html).await;
        Ok(())
    }
}
