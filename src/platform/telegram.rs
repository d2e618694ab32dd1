use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Me};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::platform::{ContentKind, IncomingMessage, Transport};

/// Reply handle bound to one Telegram chat.
struct TelegramTransport {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn say(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", self.chat_id))?;
        Ok(())
    }
}

fn content_kind(msg: &Message) -> ContentKind {
    if msg.text().is_some() {
        ContentKind::Text
    } else if msg.photo().is_some() {
        ContentKind::Image
    } else if msg.voice().is_some() || msg.audio().is_some() {
        ContentKind::Audio
    } else if msg.video().is_some() || msg.video_note().is_some() {
        ContentKind::Video
    } else if msg.sticker().is_some() {
        ContentKind::Sticker
    } else if msg.location().is_some() {
        ContentKind::Location
    } else if msg.document().is_some() {
        ContentKind::Attachment
    } else {
        ContentKind::Other
    }
}

/// Run the Telegram platform
pub async fn run(dispatcher: Arc<Dispatcher>, bot_token: &str) -> Result<()> {
    let bot = Bot::new(bot_token);
    let me = bot
        .get_me()
        .await
        .context("Failed to identify the bot account")?;

    info!("Starting Telegram platform as {}", me.user.first_name);

    let handler = Update::filter_message().endpoint(handle_message);

    teloxide::dispatching::Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher, me])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    dispatcher: Arc<Dispatcher>,
    me: Me,
) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let incoming = IncomingMessage {
        user_id: user.id.0.to_string(),
        user_name: user.first_name.clone(),
        room_id: if msg.chat.is_private() {
            None
        } else {
            Some(msg.chat.id.0.to_string())
        },
        is_self: user.id == me.user.id,
        kind: content_kind(&msg),
        text: msg.text().unwrap_or_default().to_string(),
    };

    let transport = TelegramTransport {
        bot,
        chat_id: msg.chat.id,
    };

    match dispatcher.dispatch(&incoming, &transport).await {
        Ok(outcome) => debug!(
            "Dispatch outcome for message from {}: {:?}",
            incoming.user_id, outcome
        ),
        // A failed segment leaves the reply half-delivered; log it loudly
        // but keep the update loop alive.
        Err(e) => error!("Reply delivery failed: {:#}", e),
    }

    Ok(())
}
