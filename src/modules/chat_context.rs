// Prompt assembly for the chat panel: token estimates, context truncation and
// the final message list sent to the provider.

use serde::{Deserialize, Serialize};

use crate::modules::conversation::{ChatTurn, TurnKind};

pub const DEFAULT_CONTEXT_TOKENS: usize = 2000;
pub const CHARS_PER_TOKEN: usize = 4;
pub const HISTORY_WINDOW: usize = 10;
/// Per-note cap applied when a note is read into context.
pub const MAX_NOTE_CHARS: usize = 8000;
pub const TRUNCATION_MARKER: &str = "...[truncated]";
/// A truncated note shorter than this is dropped instead.
const MIN_TRUNCATED_CHARS: usize = 100;

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant integrated into a note-taking app called Aura. \
You help users with their notes, writing, research, and questions. \
Always provide helpful, accurate, and relevant responses.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A note handed to the model as grounding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContextNote {
    pub title: String,
    pub content: String,
    pub path: Option<String>,
}

impl ContextNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            path: None,
        }
    }

    fn header(&self) -> String {
        let title = if self.title.is_empty() { "Untitled" } else { &self.title };
        format!("Note: {}\n", title)
    }

    /// The note as it appears in the prompt.
    pub fn rendered(&self) -> String {
        format!("{}{}", self.header(), self.content)
    }
}

/// Rough token count: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Cuts `text` to `max_chars` characters and appends the marker when it was longer.
pub fn cap_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(max_chars).collect();
    capped.push_str(TRUNCATION_MARKER);
    capped
}

/// Keeps whole notes while they fit in `max_tokens`. The first note that does
/// not fit is cut to the remaining budget (marker included) and everything
/// after it is dropped.
pub fn truncate_context(notes: &[ContextNote], max_tokens: usize) -> Vec<ContextNote> {
    let mut kept = Vec::new();
    let mut used = 0;

    for note in notes {
        let tokens = estimate_tokens(&note.rendered());
        if used + tokens <= max_tokens {
            kept.push(note.clone());
            used += tokens;
            continue;
        }

        let budget_chars = (max_tokens - used) * CHARS_PER_TOKEN;
        let overhead = note.header().chars().count() + TRUNCATION_MARKER.chars().count();
        let body_chars = budget_chars.saturating_sub(overhead);
        if body_chars > MIN_TRUNCATED_CHARS {
            let body: String = note.content.chars().take(body_chars).collect();
            let truncated = ContextNote {
                content: format!("{}{}", body, TRUNCATION_MARKER),
                ..note.clone()
            };
            used += estimate_tokens(&truncated.rendered());
            kept.push(truncated);
        }
        break;
    }

    log::debug!(
        "[Chat] Context truncated: {} -> {} notes, ~{} tokens",
        notes.len(),
        kept.len(),
        used
    );
    kept
}

pub fn context_message(context: &[ContextNote]) -> Option<ChatMessage> {
    if context.is_empty() {
        return None;
    }
    let body = context
        .iter()
        .map(ContextNote::rendered)
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    Some(ChatMessage::system(format!(
        "CURRENT CONTEXT - The user is currently viewing and asking about the following note(s):\n\n{}\n\n\
IMPORTANT: When the user says \"this note\" or \"summarize this\", they are referring to the note(s) shown above, \
NOT any notes mentioned in previous conversation history. Always prioritize the current context over conversation history.",
        body
    )))
}

/// Builds the provider request: framing, optional context, recent history,
/// then the outgoing message.
///
/// History drops error and context-marker turns, and user turns identical to
/// `user_message` (the transcript usually already holds the outgoing turn).
pub fn assemble_messages(
    user_message: &str,
    context: &[ContextNote],
    history: &[ChatTurn],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    messages.extend(context_message(context));

    let eligible: Vec<ChatMessage> = history
        .iter()
        .filter_map(|turn| match turn.kind {
            TurnKind::User if turn.content == user_message => None,
            TurnKind::User => Some(ChatMessage::user(turn.content.clone())),
            TurnKind::Assistant => Some(ChatMessage::assistant(turn.content.clone())),
            TurnKind::Error | TurnKind::Context => None,
        })
        .collect();
    let skip = eligible.len().saturating_sub(HISTORY_WINDOW);
    messages.extend(eligible.into_iter().skip(skip));

    messages.push(ChatMessage::user(user_message));
    messages
}
