use async_trait::async_trait;
use tracing::warn;

/// Best-effort HTTP content access. Any failure, transport-level or a
/// non-success status, surfaces as `None` rather than an error; the skills
/// decide what a missing payload means.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Option<serde_json::Value>;
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, url: &str) -> Option<reqwest::Response> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} returned {}", url, status);
            return None;
        }
        Some(response)
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Option<serde_json::Value> {
        let response = self.get(url).await?;
        match response.json().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Response from {} was not valid JSON: {}", url, e);
                None
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = self.get(url).await?;
        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Failed to read response body from {}: {}", url, e);
                None
            }
        }
    }
}
