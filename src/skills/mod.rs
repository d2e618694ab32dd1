pub mod completion;
pub mod quote;
pub mod sign;

use tracing::info;

use crate::config::SkillsConfig;
use crate::trigger::strip_whitespace;

/// Substring that triggers the echo skill anywhere in a message.
pub const ECHO_KEYWORD: &str = "麦扣";
pub const ECHO_REPLY: &str = "🤖️：call我做咩啊大佬";

/// The closed set of skills, in dispatch priority order. The first skill
/// whose predicate matches consumes the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillKind {
    Echo,
    Draw,
    Interpret,
    DailyQuote,
    Completion,
}

impl SkillKind {
    pub fn name(self) -> &'static str {
        match self {
            SkillKind::Echo => "echo",
            SkillKind::Draw => "draw",
            SkillKind::Interpret => "interpret",
            SkillKind::DailyQuote => "daily_quote",
            SkillKind::Completion => "completion",
        }
    }
}

/// Ordered list of enabled skills. Disabled skills are removed from the
/// order at startup rather than checked per message.
#[derive(Debug, Clone)]
pub struct SkillRegistry {
    order: Vec<SkillKind>,
}

impl SkillRegistry {
    pub fn from_config(config: &SkillsConfig) -> Self {
        let mut order = Vec::new();
        if config.echo {
            order.push(SkillKind::Echo);
        }
        if config.draw {
            order.push(SkillKind::Draw);
        }
        if config.interpret {
            order.push(SkillKind::Interpret);
        }
        if config.daily_quote {
            order.push(SkillKind::DailyQuote);
        }
        if config.completion {
            order.push(SkillKind::Completion);
        }
        for skill in &order {
            info!("Registered skill: {}", skill.name());
        }
        Self { order }
    }

    pub fn order(&self) -> &[SkillKind] {
        &self.order
    }
}

/// Whether the whitespace-stripped text starts with any stripped
/// `alias + keyword` pair. This is how the keyword-prefixed skills detect
/// their own invocation, independently of the generic trigger matcher.
pub fn alias_keyword_match(text: &str, aliases: &[String], keyword: &str) -> bool {
    let stripped = strip_whitespace(text);
    aliases.iter().any(|alias| {
        let prefix = format!("{}{}", strip_whitespace(alias), strip_whitespace(keyword));
        stripped.starts_with(&prefix)
    })
}
