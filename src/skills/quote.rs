use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::clock::DateSource;
use crate::fetch::ContentFetcher;
use crate::platform::IncomingMessage;
use crate::state::{DailyPayload, DispatchState};

/// Keyword that follows an alias to request the daily quote.
pub const QUOTE_KEYWORD: &str = "fw";

/// Feature key in the daily store.
pub const FEATURE: &str = "daily_quote";

const FETCH_FAILED: &str = "api调用失败";

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    code: i64,
    data: Option<Vec<QuoteItem>>,
}

#[derive(Debug, Deserialize)]
struct QuoteItem {
    content: String,
}

/// Serve one quote per user per day. A fresh record replays the cached text
/// without a new fetch; a fetch failure replies a fallback and records
/// nothing, so the next invocation retries instead of replaying the failure.
pub async fn daily_quote(
    state: &DispatchState,
    fetcher: &dyn ContentFetcher,
    dates: &dyn DateSource,
    url: &str,
    msg: &IncomingMessage,
) -> String {
    let today = dates.today().await;

    if let Some(today) = today {
        let daily = state.daily.lock().await;
        if daily.is_fresh(&msg.user_id, FEATURE, today) {
            if let Some(DailyPayload::Quote(text)) =
                daily.get(&msg.user_id, FEATURE).map(|r| r.payload.clone())
            {
                return format!("@{} {}", msg.user_name, text);
            }
        }
    }

    match fetch_quote(fetcher, url).await {
        Some(content) => {
            state.daily.lock().await.put(
                &msg.user_id,
                FEATURE,
                today,
                DailyPayload::Quote(content.clone()),
            );
            format!("@{} {}", msg.user_name, content)
        }
        None => {
            warn!(user = %msg.user_id, feature = FEATURE, "Quote fetch failed");
            format!("@{} {}", msg.user_name, FETCH_FAILED)
        }
    }
}

/// Fetch a quote batch and pick one uniformly at random. Any envelope
/// anomaly (error code, missing or empty data) counts as a failure.
async fn fetch_quote(fetcher: &dyn ContentFetcher, url: &str) -> Option<String> {
    let value = fetcher.fetch_json(url).await?;
    let envelope: QuoteEnvelope = serde_json::from_value(value).ok()?;
    if envelope.code != 1 {
        return None;
    }
    let mut items = envelope.data?;
    if items.is_empty() {
        return None;
    }
    let pick = rand::thread_rng().gen_range(0..items.len());
    Some(items.swap_remove(pick).content)
}
