use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::chunk::chunk;
use crate::classify;
use crate::clock::DateSource;
use crate::config::Config;
use crate::fetch::ContentFetcher;
use crate::llm::CompletionProvider;
use crate::platform::{IncomingMessage, Transport};
use crate::skills::{
    alias_keyword_match, completion, quote, sign, SkillKind, SkillRegistry, ECHO_KEYWORD,
    ECHO_REPLY,
};
use crate::state::DispatchState;
use crate::trigger::TriggerMatcher;

/// What happened to one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Dropped by the classifier before any skill was considered.
    Skipped,
    /// No skill predicate matched; the event was not addressed to the bot.
    NoMatch,
    /// A skill consumed the event and its reply was delivered.
    Replied(SkillKind),
}

/// The dispatch core: classifies an event, routes it to at most one skill,
/// and delivers the segmented reply. Platform-agnostic; owns all mutable
/// state for one bot account.
pub struct Dispatcher {
    llm: Arc<dyn CompletionProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    dates: Arc<dyn DateSource>,
    matcher: TriggerMatcher,
    registry: SkillRegistry,
    state: DispatchState,
    /// System prompt for the completion skill, date-stamped at startup.
    persona: String,
    aliases: Vec<String>,
    suppress_self_chat: bool,
    segment_max_chars: usize,
    sign_data_url: String,
    quote_url: String,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        llm: Arc<dyn CompletionProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        dates: Arc<dyn DateSource>,
    ) -> Self {
        let persona = format!(
            "{}\nCurrent date: {}",
            config.llm.system_prompt,
            chrono::Local::now().format("%Y-%m-%d")
        );
        Self {
            llm,
            fetcher,
            dates,
            matcher: TriggerMatcher::new(
                config.dispatch.trigger_keyword.clone(),
                config.dispatch.aliases.clone(),
            ),
            registry: SkillRegistry::from_config(&config.skills),
            state: DispatchState::new(),
            persona,
            aliases: config.dispatch.aliases.clone(),
            suppress_self_chat: config.dispatch.suppress_self_chat,
            segment_max_chars: config.dispatch.segment_max_chars,
            sign_data_url: config.providers.sign_data_url.clone(),
            quote_url: config.providers.quote_url.clone(),
        }
    }

    /// One round-trip through the completion provider to confirm the API
    /// works. Failure is logged, not fatal; the bot still starts.
    pub async fn startup_probe(&self) {
        match self.llm.complete(&self.persona, "Say Hello World").await {
            Ok(_) => info!("Completion provider self-test succeeded, ready to handle messages"),
            Err(e) => warn!("Completion provider self-test failed: {}", e),
        }
    }

    /// Handle one incoming event end to end. Skill-level failures are
    /// absorbed into fallback replies; only a failed segment delivery
    /// propagates, since a half-sent reply is something the caller should
    /// know about.
    pub async fn dispatch(
        &self,
        msg: &IncomingMessage,
        transport: &dyn Transport,
    ) -> Result<DispatchOutcome> {
        if classify::is_nonsense(msg, self.suppress_self_chat) {
            debug!("Classifier dropped message from {}", msg.user_id);
            return Ok(DispatchOutcome::Skipped);
        }

        let trigger = self.matcher.match_text(&msg.text, msg.is_private());
        if let Some(ctx) = &trigger {
            debug!(
                "Trigger matched (alias {:?}) with payload: {}",
                ctx.alias, ctx.cleaned
            );
        }

        for skill in self.registry.order() {
            let reply = match skill {
                SkillKind::Echo => {
                    if msg.text.contains(ECHO_KEYWORD) {
                        Some(ECHO_REPLY.to_string())
                    } else {
                        None
                    }
                }
                SkillKind::Draw => {
                    if alias_keyword_match(&msg.text, &self.aliases, sign::DRAW_KEYWORD) {
                        Some(
                            sign::draw(
                                &self.state,
                                self.fetcher.as_ref(),
                                self.dates.as_ref(),
                                &self.sign_data_url,
                                msg,
                            )
                            .await,
                        )
                    } else {
                        None
                    }
                }
                SkillKind::Interpret => {
                    if alias_keyword_match(&msg.text, &self.aliases, sign::INTERPRET_KEYWORD) {
                        Some(
                            sign::interpret(
                                &self.state,
                                self.fetcher.as_ref(),
                                self.dates.as_ref(),
                                &self.sign_data_url,
                                msg,
                            )
                            .await,
                        )
                    } else {
                        None
                    }
                }
                SkillKind::DailyQuote => {
                    if alias_keyword_match(&msg.text, &self.aliases, quote::QUOTE_KEYWORD) {
                        Some(
                            quote::daily_quote(
                                &self.state,
                                self.fetcher.as_ref(),
                                self.dates.as_ref(),
                                &self.quote_url,
                                msg,
                            )
                            .await,
                        )
                    } else {
                        None
                    }
                }
                SkillKind::Completion => match &trigger {
                    Some(ctx) => Some(
                        completion::completion(self.llm.as_ref(), &self.persona, msg, &ctx.cleaned)
                            .await,
                    ),
                    None => None,
                },
            };

            if let Some(reply) = reply {
                info!("Skill {} fired for user {}", skill.name(), msg.user_id);
                self.deliver(transport, &reply).await?;
                return Ok(DispatchOutcome::Replied(*skill));
            }
        }

        Ok(DispatchOutcome::NoMatch)
    }

    /// Send the reply as ordered segments. Stops at the first failed send;
    /// skipping ahead would deliver fragments that make no sense alone.
    async fn deliver(&self, transport: &dyn Transport, reply: &str) -> Result<()> {
        for segment in chunk(reply, self.segment_max_chars) {
            transport
                .say(&segment)
                .await
                .context("Failed to deliver reply segment")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::llm::ProviderError;
    use crate::platform::ContentKind;
    use crate::state::DailyPayload;

    const SIGN_URL: &str = "https://signs.test/data.json";
    const QUOTE_URL: &str = "https://quotes.test/batch";

    struct MockCompletion {
        reply: String,
        fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockCompletion {
        fn answering(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for MockCompletion {
        async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            if self.fail {
                Err(ProviderError {
                    status: Some(500),
                    message: "mock failure".to_string(),
                })
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    #[derive(Default)]
    struct MockFetcher {
        text: Mutex<HashMap<String, String>>,
        json: Mutex<HashMap<String, serde_json::Value>>,
        text_calls: AtomicUsize,
        json_calls: AtomicUsize,
    }

    impl MockFetcher {
        fn with_text(self, url: &str, body: &str) -> Self {
            self.text
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
            self
        }

        fn set_json(&self, url: &str, value: serde_json::Value) {
            self.json.lock().unwrap().insert(url.to_string(), value);
        }
    }

    #[async_trait]
    impl ContentFetcher for MockFetcher {
        async fn fetch_json(&self, url: &str) -> Option<serde_json::Value> {
            self.json_calls.fetch_add(1, Ordering::SeqCst);
            self.json.lock().unwrap().get(url).cloned()
        }

        async fn fetch_text(&self, url: &str) -> Option<String> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            self.text.lock().unwrap().get(url).cloned()
        }
    }

    struct FixedDate(Option<NaiveDate>);

    #[async_trait]
    impl DateSource for FixedDate {
        async fn today(&self) -> Option<NaiveDate> {
            self.0
        }
    }

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn say(&self, text: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("transport down");
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn test_config(keyword: &str) -> Config {
        toml::from_str(&format!(
            r#"
            [telegram]
            bot_token = "t"

            [llm]
            api_key = "k"

            [dispatch]
            trigger_keyword = "{keyword}"
            aliases = ["@220", "@BotAlias"]

            [providers]
            time_url = "https://time.test/now"
            sign_data_url = "{SIGN_URL}"
            quote_url = "{QUOTE_URL}"
            "#
        ))
        .unwrap()
    }

    fn group_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            room_id: Some("room-9".to_string()),
            is_self: false,
            kind: ContentKind::Text,
            text: text.to_string(),
        }
    }

    fn private_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            room_id: None,
            ..group_message(text)
        }
    }

    fn sign_dataset() -> &'static str {
        r#"[{"name":"第一签","value":"上上","explain":"万事大吉"}]"#
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 4, n).unwrap()
    }

    fn dispatcher_with(
        keyword: &str,
        llm: Arc<MockCompletion>,
        fetcher: Arc<MockFetcher>,
        today: Option<NaiveDate>,
    ) -> Dispatcher {
        Dispatcher::new(&test_config(keyword), llm, fetcher, Arc::new(FixedDate(today)))
    }

    #[tokio::test]
    async fn group_completion_end_to_end() {
        let llm = Arc::new(MockCompletion::answering("42"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm.clone(), fetcher, Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("@BotAlias keyword hello"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied(SkillKind::Completion));
        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "hello");
        assert!(calls[0].0.contains("Current date:"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("@alice"));
        assert!(sent[0].contains("hello"));
        assert!(sent[0].contains("42"));
    }

    #[tokio::test]
    async fn private_completion_has_no_mention_prefix() {
        let llm = Arc::new(MockCompletion::answering("sure"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher, Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&private_message("keyword hi there"), &transport)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].starts_with("hi there\n"));
        assert!(!sent[0].starts_with("@"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_fallback_reply() {
        let llm = Arc::new(MockCompletion::failing());
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher, Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&private_message("keyword hi"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied(SkillKind::Completion));
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].contains("摆烂"));
    }

    #[tokio::test]
    async fn unaddressed_group_message_is_a_miss() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm.clone(), fetcher, Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("keyword hello"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::NoMatch);
        assert!(llm.calls.lock().unwrap().is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifier_skips_before_any_skill() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default());
        let mut config = test_config("keyword");
        config.dispatch.suppress_self_chat = true;
        let dispatcher = Dispatcher::new(
            &config,
            llm.clone(),
            fetcher,
            Arc::new(FixedDate(Some(day(1)))),
        );
        let transport = MockTransport::default();

        let mut msg = private_message("keyword hello");
        msg.is_self = true;
        let outcome = dispatcher.dispatch(&msg, &transport).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);

        let mut msg = private_message("keyword hello");
        msg.kind = ContentKind::Image;
        let outcome = dispatcher.dispatch(&msg, &transport).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);

        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn echo_fires_on_substring_anywhere() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm.clone(), fetcher, Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("大家觉得麦扣怎么样"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied(SkillKind::Echo));
        assert_eq!(transport.sent.lock().unwrap().as_slice(), [ECHO_REPLY]);
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn draw_populates_cache_and_records_the_day() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let dispatcher = dispatcher_with("keyword", llm, fetcher.clone(), Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied(SkillKind::Draw));
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 1);

        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].contains("第一签"));
        assert!(sent[0].contains("上上"));
        assert!(!sent[0].contains("万事大吉"));

        let daily = dispatcher.state.daily.lock().await;
        let record = daily.get("u1", sign::FEATURE).unwrap();
        assert_eq!(record.date, Some(day(1)));
        assert_eq!(record.payload, DailyPayload::SignIndex(0));
    }

    #[tokio::test]
    async fn second_draw_same_day_is_rejected_without_redraw() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let dispatcher = dispatcher_with("keyword", llm, fetcher.clone(), Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();
        let recorded = {
            let daily = dispatcher.state.daily.lock().await;
            daily.get("u1", sign::FEATURE).cloned().unwrap()
        };

        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert!(sent[1].contains("你今天已经抽过签了"));
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 1);

        let daily = dispatcher.state.daily.lock().await;
        assert_eq!(daily.get("u1", sign::FEATURE), Some(&recorded));
    }

    #[tokio::test]
    async fn interpret_before_draw_fetches_nothing() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let dispatcher = dispatcher_with("keyword", llm, fetcher.clone(), Some(day(1)));
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("@220 解签"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Replied(SkillKind::Interpret));
        assert!(transport.sent.lock().unwrap()[0].contains("你今天还没有抽签呢"));
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interpret_after_draw_reveals_the_explanation() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let dispatcher = dispatcher_with("keyword", llm, fetcher, Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();
        dispatcher
            .dispatch(&group_message("@220 解签"), &transport)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert!(sent[1].contains("第一签"));
        assert!(sent[1].contains("万事大吉"));
    }

    #[tokio::test]
    async fn failed_dataset_fetch_records_nothing_and_retries() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher.clone(), Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 1);
        {
            let daily = dispatcher.state.daily.lock().await;
            assert!(daily.get("u1", sign::FEATURE).is_none());
        }

        // The dataset comes back; the same day's draw now succeeds.
        fetcher
            .text
            .lock()
            .unwrap()
            .insert(SIGN_URL.to_string(), sign_dataset().to_string());
        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 2);

        let sent = transport.sent.lock().unwrap();
        assert!(sent[1].contains("第一签"));
    }

    #[tokio::test]
    async fn draw_proceeds_ungated_when_date_is_unresolved() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let dispatcher = dispatcher_with("keyword", llm, fetcher, None);
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();
        dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();

        // No gating without a resolved date: both draws produce a sign.
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].contains("第一签"));
        assert!(sent[1].contains("第一签"));

        // Interpretation still works off the undated record.
        drop(sent);
        dispatcher
            .dispatch(&group_message("@220 解签"), &transport)
            .await
            .unwrap();
        assert!(transport.sent.lock().unwrap()[2].contains("万事大吉"));
    }

    #[tokio::test]
    async fn quote_failure_is_not_cached_and_success_is() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher.clone(), Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&group_message("@220 fw"), &transport)
            .await
            .unwrap();
        assert!(transport.sent.lock().unwrap()[0].contains("api调用失败"));
        {
            let daily = dispatcher.state.daily.lock().await;
            assert!(daily.get("u1", quote::FEATURE).is_none());
        }

        // Provider recovers; the same day's next call fetches again.
        fetcher.set_json(
            QUOTE_URL,
            serde_json::json!({"code": 1, "data": [{"content": "学而时习之"}]}),
        );
        dispatcher
            .dispatch(&group_message("@220 fw"), &transport)
            .await
            .unwrap();
        assert_eq!(fetcher.json_calls.load(Ordering::SeqCst), 2);
        assert!(transport.sent.lock().unwrap()[1].contains("学而时习之"));

        // Now cached: a third call replays without fetching.
        dispatcher
            .dispatch(&group_message("@220 fw"), &transport)
            .await
            .unwrap();
        assert_eq!(fetcher.json_calls.load(Ordering::SeqCst), 2);
        assert!(transport.sent.lock().unwrap()[2].contains("学而时习之"));
    }

    #[tokio::test]
    async fn long_reply_is_delivered_in_ordered_segments() {
        // 10 chars of question + separator + 1181 chars of answer = 1203.
        let answer = "y".repeat(1181);
        let llm = Arc::new(MockCompletion::answering(&answer));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher, Some(day(1)));
        let transport = MockTransport::default();

        dispatcher
            .dispatch(&private_message("keyword xxxxxxxxxx"), &transport)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].chars().count(), 500);
        assert_eq!(sent[1].chars().count(), 500);
        assert_eq!(sent[2].chars().count(), 203);
        assert_eq!(sent.concat().chars().count(), 1203);
    }

    #[tokio::test]
    async fn failed_segment_delivery_propagates() {
        let llm = Arc::new(MockCompletion::answering("hello"));
        let fetcher = Arc::new(MockFetcher::default());
        let dispatcher = dispatcher_with("keyword", llm, fetcher, Some(day(1)));
        let transport = MockTransport {
            fail: true,
            ..MockTransport::default()
        };

        let result = dispatcher
            .dispatch(&private_message("keyword hi"), &transport)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disabled_skill_never_fires() {
        let llm = Arc::new(MockCompletion::answering("no"));
        let fetcher = Arc::new(MockFetcher::default().with_text(SIGN_URL, sign_dataset()));
        let mut config = test_config("keyword");
        config.skills.draw = false;
        config.skills.completion = false;
        let dispatcher = Dispatcher::new(
            &config,
            llm,
            fetcher.clone(),
            Arc::new(FixedDate(Some(day(1)))),
        );
        let transport = MockTransport::default();

        let outcome = dispatcher
            .dispatch(&group_message("@220 抽签"), &transport)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::NoMatch);
        assert_eq!(fetcher.text_calls.load(Ordering::SeqCst), 0);
    }
}
