/// Delimiter some clients insert between quoted/forwarded content and the
/// sender's own words when replying to an earlier message.
pub const QUOTE_DELIMITER: &str = "- - - - - - - - - - - - - - -";

/// Outcome of a successful trigger match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
    /// Alias that addressed the bot; None in private chat.
    pub alias: Option<String>,
    /// User's payload with the invocation prefix stripped.
    pub cleaned: String,
}

/// Decides whether raw text addresses the bot, and strips the invocation
/// prefix. Group matching works on alias+keyword text rather than mention
/// metadata because clients render "@mention" inconsistently.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    keyword: String,
    aliases: Vec<String>,
}

impl TriggerMatcher {
    pub fn new(keyword: String, aliases: Vec<String>) -> Self {
        Self { keyword, aliases }
    }

    pub fn match_text(&self, text: &str, is_private: bool) -> Option<TriggerContext> {
        // Anything above the last quote delimiter is someone else's words.
        let text = own_words(text);
        if is_private {
            self.match_private(text)
        } else {
            self.match_group(text)
        }
    }

    fn match_private(&self, text: &str) -> Option<TriggerContext> {
        if self.keyword.is_empty() {
            return Some(TriggerContext {
                alias: None,
                cleaned: text.to_string(),
            });
        }
        let rest = text.strip_prefix(&self.keyword)?;
        Some(TriggerContext {
            alias: None,
            cleaned: skip_separator(rest).to_string(),
        })
    }

    fn match_group(&self, text: &str) -> Option<TriggerContext> {
        let stripped = strip_whitespace(text);
        let keyword_stripped = strip_whitespace(&self.keyword);
        let alias = self.aliases.iter().find(|alias| {
            let prefix = format!("{}{}", strip_whitespace(alias), keyword_stripped);
            stripped.starts_with(&prefix)
        })?;

        let cleaned = if self.keyword.is_empty() {
            // Alias-only addressing: drop the alias when it appears literally.
            text.strip_prefix(alias.as_str())
                .unwrap_or(text)
                .trim_start()
                .to_string()
        } else {
            // The payload starts after the keyword's last occurrence plus one
            // separator character. When whitespace was typed inside the
            // keyword itself, it never occurs literally and there is no
            // payload to recover.
            match text.rfind(&self.keyword) {
                Some(pos) => skip_separator(&text[pos + self.keyword.len()..]).to_string(),
                None => String::new(),
            }
        };

        Some(TriggerContext {
            alias: Some(alias.clone()),
            cleaned,
        })
    }
}

/// Portion of the text after the last quote delimiter, or the whole text.
/// The line break framing the delimiter is not part of the user's words.
fn own_words(text: &str) -> &str {
    match text.rfind(QUOTE_DELIMITER) {
        Some(pos) => text[pos + QUOTE_DELIMITER.len()..].trim_start(),
        None => text,
    }
}

pub(crate) fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Skip exactly one separator character, if any.
fn skip_separator(s: &str) -> &str {
    let mut chars = s.chars();
    chars.next();
    chars.as_str()
}
