use crate::cdp::{CdpClient, LaunchError};
use crate::client::ChromiumPage;
use locus_common::DevToolsError;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// A browser plus the page the engine evaluates against.
pub struct HeadlessSession {
    client: CdpClient,
    page: Arc<ChromiumPage>,
}

impl HeadlessSession {
    pub async fn launch(visible: bool) -> Result<Self, LaunchError> {
        info!("Launching headless session (Chromium)...");
        let client = CdpClient::launch(visible).await?;
        let page = ChromiumPage::attach(client.page.clone()).await?;
        Ok(Self {
            client,
            page: Arc::new(page),
        })
    }

    pub fn page(&self) -> Arc<ChromiumPage> {
        self.page.clone()
    }

    pub async fn navigate(&self, url: &str) -> Result<NavigationResult, DevToolsError> {
        info!("Navigating to: {}", url);
        let page = &self.client.page;
        page.goto(url)
            .await
            .map_err(|e| DevToolsError::Protocol(format!("Navigation failed: {}", e)))?;
        self.page.invalidate();

        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| DevToolsError::Protocol(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }

    pub async fn close(self) -> Result<(), LaunchError> {
        self.client.close().await
    }
}
