use crate::platform::{ContentKind, IncomingMessage};

/// Display name the platform uses for its own service notifications.
const SERVICE_ACCOUNT_NAME: &str = "微信团队";

/// Placeholder texts the platform injects for content it cannot deliver:
/// voice/video call notices, red-envelope notices, location links.
const NOTICE_SNIPPETS: [&str; 3] = [
    "收到一条视频/语音聊天消息，请在手机上查看",
    "收到红包，请在手机上查看",
    "/cgi-bin/mmwebwx-bin/webwxgetpubliclinkimg",
];

/// Filter out events that must never reach dispatch. Pure check, no I/O.
pub fn is_nonsense(msg: &IncomingMessage, suppress_self_chat: bool) -> bool {
    (suppress_self_chat && msg.is_self)
        || msg.kind != ContentKind::Text
        || msg.user_name == SERVICE_ACCOUNT_NAME
        || NOTICE_SNIPPETS.iter().any(|s| msg.text.contains(s))
}
