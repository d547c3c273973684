use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{JobFlowError, Result};

/// 网页抓取 trait - 公司调研节点消费的窄接口
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub type DynFetcher = Arc<dyn Fetcher>;

/// 预置页面内容的实现，测试与离线运行使用
#[derive(Default)]
pub struct StaticFetcher {
    pages: RwLock<HashMap<String, String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.write().insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| JobFlowError::Fetch(format!("no canned page for `{url}`")))
    }
}

#[cfg(feature = "web-research")]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "web-research")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "web-research")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "web-research")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| JobFlowError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobFlowError::Fetch(format!(
                "request to `{url}` failed with status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| JobFlowError::Fetch(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_fetcher_serves_canned_pages() -> anyhow::Result<()> {
        let fetcher = StaticFetcher::new().with_page("https://acme.test/about", "We build rockets");
        let body = fetcher.fetch("https://acme.test/about").await?;
        assert_eq!(body, "We build rockets");

        let err = fetcher.fetch("https://acme.test/missing").await.unwrap_err();
        assert!(matches!(err, JobFlowError::Fetch(_)));
        Ok(())
    }
}
