//! Prompt assembly for grounded answers.

use crate::generation::{PromptMessage, PromptRole};
use crate::models::{ChatTurn, ChunkMatch, Role};

/// Instructions placed ahead of the document context.
pub const SYSTEM_INSTRUCTIONS: &str = "You are an intelligent document assistant. Answer questions based on the provided document context. If the context doesn't contain enough information to answer, say so clearly.\n\nWhen referencing information from the context, cite your sources using [1], [2], etc. corresponding to the context chunk numbers.\n\nBe concise, accurate, and helpful.";

/// Replaces the context block when retrieval found nothing.
pub const NO_CONTEXT_NOTICE: &str = "No relevant document context was found for this query. Let the user know and try to help based on general knowledge.";

/// Number each match from 1 and join them with blank lines.
pub fn build_context(matches: &[ChunkMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(index, chunk)| format!("[{}] {}", index + 1, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full system prompt for `context`; an empty context yields the no-context notice.
pub fn system_prompt(context: &str) -> String {
    if context.is_empty() {
        format!("{SYSTEM_INSTRUCTIONS}\n\n{NO_CONTEXT_NOTICE}")
    } else {
        format!("{SYSTEM_INSTRUCTIONS}\n\n## Document Context\n\n{context}")
    }
}

/// System prompt, then the last `history_limit` turns, then the question.
pub fn build_messages(
    system: String,
    history: &[ChatTurn],
    question: &str,
    history_limit: usize,
) -> Vec<PromptMessage> {
    let recent = &history[history.len().saturating_sub(history_limit)..];
    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(PromptMessage::new(PromptRole::System, system));
    messages.extend(recent.iter().map(|turn| {
        let role = match turn.role {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        };
        PromptMessage::new(role, turn.content.clone())
    }));
    messages.push(PromptMessage::new(PromptRole::User, question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> ChunkMatch {
        ChunkMatch {
            id: content.to_string(),
            document_id: "doc".into(),
            content: content.to_string(),
            similarity: 0.9,
        }
    }

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn context_numbers_chunks_from_one() {
        let context = build_context(&[chunk("alpha"), chunk("beta")]);
        assert_eq!(context, "[1] alpha\n\n[2] beta");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn system_prompt_switches_on_empty_context() {
        let with = system_prompt("[1] alpha");
        assert!(with.ends_with("## Document Context\n\n[1] alpha"));
        assert!(with.starts_with("You are an intelligent document assistant."));

        let without = system_prompt("");
        assert!(without.ends_with(NO_CONTEXT_NOTICE));
        assert!(!without.contains("## Document Context"));
    }

    #[test]
    fn keeps_only_recent_history() {
        let history: Vec<ChatTurn> = (0..14)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                turn(role, &format!("turn {i}"))
            })
            .collect();
        let messages = build_messages("sys".into(), &history, "question?", 10);

        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[1].content, "turn 4");
        assert_eq!(messages[10].content, "turn 13");
        assert_eq!(messages[10].role, PromptRole::Assistant);
        assert_eq!(messages[11], PromptMessage::new(PromptRole::User, "question?"));
    }

    #[test]
    fn short_history_is_kept_whole() {
        let history = vec![turn(Role::User, "hi"), turn(Role::Assistant, "hello")];
        let messages = build_messages("sys".into(), &history, "next", 10);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, PromptRole::Assistant);
    }
}
