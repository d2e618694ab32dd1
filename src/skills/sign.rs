use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::clock::DateSource;
use crate::fetch::ContentFetcher;
use crate::platform::IncomingMessage;
use crate::state::{DailyPayload, DispatchState};

/// Keyword that follows an alias to draw today's sign.
pub const DRAW_KEYWORD: &str = "抽签";
/// Keyword that follows an alias to interpret today's sign.
pub const INTERPRET_KEYWORD: &str = "解签";

/// Feature key in the daily store shared by draw and interpret.
pub const FEATURE: &str = "draw";

const ALREADY_DRAWN: &str = "你今天已经抽过签了";
const NOT_DRAWN_YET: &str = "你今天还没有抽签呢";
const DATASET_UNAVAILABLE: &str = "签筒暂时不可用，请稍后再试";

/// One entry of the externally hosted sign dataset.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SignEntry {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub explain: String,
}

/// Fetch-once view of the sign dataset. The cell stays empty on failure, so
/// the next caller fetches again; a populated cell is reused for the life of
/// the process.
async fn load_signs<'a>(
    state: &'a DispatchState,
    fetcher: &dyn ContentFetcher,
    url: &str,
) -> Result<&'a [SignEntry]> {
    let entries = state
        .signs
        .get_or_try_init(|| async {
            let body = fetcher
                .fetch_text(url)
                .await
                .ok_or_else(|| anyhow!("sign dataset fetch returned nothing"))?;
            let entries: Vec<SignEntry> =
                serde_json::from_str(&body).context("sign dataset is not a JSON entry array")?;
            if entries.is_empty() {
                return Err(anyhow!("sign dataset is empty"));
            }
            info!("Loaded {} sign entries", entries.len());
            Ok(entries)
        })
        .await?;
    Ok(entries)
}

/// Draw a sign: once per user per resolved day. The result withholds the
/// explanation; that is what the interpret skill is for.
pub async fn draw(
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
            return format!("@{} {}", msg.user_name, ALREADY_DRAWN);
        }
    }

    let entries = match load_signs(state, fetcher, url).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                user = %msg.user_id,
                feature = FEATURE,
                "Sign dataset unavailable: {:#}",
                e
            );
            return format!("@{} {}", msg.user_name, DATASET_UNAVAILABLE);
        }
    };

    let index = rand::thread_rng().gen_range(0..entries.len());
    let entry = &entries[index];

    state
        .daily
        .lock()
        .await
        .put(&msg.user_id, FEATURE, today, DailyPayload::SignIndex(index));

    format!("@{} \r\n{}\r\n{}", msg.user_name, entry.name, entry.value)
}

/// Interpret today's sign: looks up the index stored by `draw` and adds the
/// explanation field. Requires a draw first; while the external date is
/// unresolved, any stored draw is accepted since freshness cannot be checked.
pub async fn interpret(
    state: &DispatchState,
    fetcher: &dyn ContentFetcher,
    dates: &dyn DateSource,
    url: &str,
    msg: &IncomingMessage,
) -> String {
    let today = dates.today().await;

    let stored = {
        let daily = state.daily.lock().await;
        let usable = match today {
            Some(today) => daily.is_fresh(&msg.user_id, FEATURE, today),
            None => daily.get(&msg.user_id, FEATURE).is_some(),
        };
        if usable {
            match daily.get(&msg.user_id, FEATURE).map(|r| r.payload.clone()) {
                Some(DailyPayload::SignIndex(index)) => Some(index),
                _ => None,
            }
        } else {
            None
        }
    };

    let Some(index) = stored else {
        return format!("@{} {}", msg.user_name, NOT_DRAWN_YET);
    };

    let entry = match load_signs(state, fetcher, url).await {
        Ok(entries) => entries.get(index).cloned(),
        Err(e) => {
            warn!(
                user = %msg.user_id,
                feature = FEATURE,
                "Sign dataset unavailable: {:#}",
                e
            );
            None
        }
    };

    match entry {
        Some(entry) => format!(
            "@{} \r\n{}\r\n{}\r\n----------\r\n{}",
            msg.user_name, entry.name, entry.value, entry.explain
        ),
        None => format!("@{} {}", msg.user_name, DATASET_UNAVAILABLE),
    }
}
