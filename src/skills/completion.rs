use tracing::error;

use crate::llm::CompletionProvider;
use crate::platform::IncomingMessage;

/// Line between the quoted question and the answer in composed replies.
pub const ANSWER_SEPARATOR: &str = "----------";

const ERROR_REPLY: &str = "🤖️：ChatGPT摆烂了，请稍后再试～";

/// Default skill: forward the cleaned text to the completion provider and
/// compose the reply around it. Provider failures never escape; the user
/// gets a fixed apology instead.
pub async fn completion(
    llm: &dyn CompletionProvider,
    persona: &str,
    msg: &IncomingMessage,
    cleaned: &str,
) -> String {
    let answer = match llm.complete(persona, cleaned).await {
        Ok(answer) => answer,
        Err(e) => {
            error!(
                user = %msg.user_id,
                status = ?e.status,
                "Completion provider failed: {}",
                e
            );
            ERROR_REPLY.to_string()
        }
    };

    // The whole reply quotes the question; group replies also address the
    // asker since many questions can be in flight in one room.
    if msg.is_private() {
        format!("{}\n{}\n{}", cleaned, ANSWER_SEPARATOR, answer)
    } else {
        format!(
            "@{}\n{}\n{}\n{}",
            msg.user_name, cleaned, ANSWER_SEPARATOR, answer
        )
    }
}
