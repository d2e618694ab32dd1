use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::fetch::ContentFetcher;

/// Authoritative day boundary for all daily gating. `None` means the date
/// could not be resolved; callers proceed without gating in that case.
#[async_trait]
pub trait DateSource: Send + Sync {
    async fn today(&self) -> Option<NaiveDate>;
}

/// Resolves the calendar date from a trusted external time endpoint instead
/// of the process clock, so every user and feature shares one day boundary
/// even on hosts with a skewed clock.
pub struct HttpDateSource {
    fetcher: Arc<dyn ContentFetcher>,
    url: String,
}

impl HttpDateSource {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, url: String) -> Self {
        Self { fetcher, url }
    }
}

#[async_trait]
impl DateSource for HttpDateSource {
    async fn today(&self) -> Option<NaiveDate> {
        let body = self.fetcher.fetch_text(&self.url).await?;
        let date = parse_sys_time(&body);
        if date.is_none() {
            warn!("Time endpoint {} returned an unparseable payload", self.url);
        }
        date
    }
}

#[derive(Debug, Deserialize)]
struct SysTimePayload {
    #[serde(rename = "sysTime2")]
    sys_time2: String,
}

/// The endpoint answers `{"sysTime2":"YYYY-MM-DD HH:MM:SS", ...}`; the first
/// ten characters are the date.
fn parse_sys_time(body: &str) -> Option<NaiveDate> {
    let payload: SysTimePayload = serde_json::from_str(body).ok()?;
    let date_part = payload.sys_time2.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
