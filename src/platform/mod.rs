pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Payload kind of a chat event. Only `Text` reaches the dispatcher; the
/// rest exist so the classifier can name what it drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    Audio,
    Video,
    Sticker,
    Location,
    Attachment,
    Other,
}

/// A message received from any platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform-specific user ID as string
    pub user_id: String,
    /// Display name of the user
    pub user_name: String,
    /// Group/room ID; None means a one-to-one chat
    pub room_id: Option<String>,
    /// Whether the sender is the bot account itself
    pub is_self: bool,
    /// Payload kind
    pub kind: ContentKind,
    /// The message text
    pub text: String,
}

impl IncomingMessage {
    pub fn is_private(&self) -> bool {
        self.room_id.is_none()
    }
}

/// Reply channel for one conversation. The platform adapter binds the
/// destination (peer or room) into the handle; the dispatcher only pushes
/// text segments, in order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}
