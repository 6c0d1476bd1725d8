// Chat transcript kept by the side panel.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    User,
    Assistant,
    Error,
    /// Marker listing the notes attached to the next user turn.
    Context,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    #[serde(rename = "type")]
    pub kind: TurnKind,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn push(&mut self, kind: TurnKind, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            kind,
            content: content.into(),
            timestamp: Local::now(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(TurnKind::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(TurnKind::Assistant, content);
    }

    pub fn push_error(&mut self, content: impl Into<String>) {
        self.push(TurnKind::Error, content);
    }

    /// Adds a `Context: a, b` marker. Nothing is recorded for an empty list.
    pub fn push_context(&mut self, titles: &[String]) {
        if !titles.is_empty() {
            self.push(TurnKind::Context, format!("Context: {}", titles.join(", ")));
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Markdown transcript for saving into the vault.
    ///
    /// `context` lists the attached notes as (title, is_active_note).
    pub fn to_markdown(&self, provider: &str, context: &[(String, bool)]) -> String {
        let mut md = String::from("# Chat Export\n\n");
        md.push_str(&format!("**Date**: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
        md.push_str(&format!("**Provider**: {}\n", provider));
        md.push_str(&format!("**Messages**: {}\n\n", self.turns.len()));

        if !context.is_empty() {
            md.push_str("## Context Used\n\n");
            for (title, active) in context {
                let suffix = if *active { " (Active Note)" } else { "" };
                md.push_str(&format!("- {}{}\n", title, suffix));
            }
            md.push('\n');
        }

        md.push_str("## Conversation\n\n");
        for turn in &self.turns {
            let time = turn.timestamp.format("%H:%M:%S");
            match turn.kind {
                TurnKind::User => md.push_str(&format!("### You - {}\n{}\n\n", time, turn.content)),
                TurnKind::Assistant => md.push_str(&format!("### AI - {}\n{}\n\n", time, turn.content)),
                TurnKind::Error => md.push_str(&format!("### Error - {}\n{}\n\n", time, turn.content)),
                TurnKind::Context => md.push_str(&format!("*{}*\n\n", turn.content)),
            }
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_context_skips_empty() {
        let mut convo = Conversation::default();
        convo.push_context(&[]);
        assert!(convo.is_empty());

        convo.push_context(&["a.md".to_string(), "b.md".to_string()]);
        assert_eq!(convo.turns()[0].content, "Context: a.md, b.md");
        assert_eq!(convo.turns()[0].kind, TurnKind::Context);
    }

    #[test]
    fn test_markdown_export() {
        let mut convo = Conversation::default();
        convo.push_context(&["Plan.md".to_string()]);
        convo.push_user("summarize");
        convo.push_assistant("done");
        convo.push_error("Error: offline");

        let md = convo.to_markdown("OpenAI", &[("Plan.md".to_string(), true)]);

        assert!(md.starts_with("# Chat Export\n\n"));
        assert!(md.contains("**Provider**: OpenAI\n"));
        assert!(md.contains("**Messages**: 4\n"));
        assert!(md.contains("- Plan.md (Active Note)\n"));
        assert!(md.contains("*Context: Plan.md*\n"));
        assert!(md.contains("### You - "));
        assert!(md.contains("\nsummarize\n"));
        assert!(md.contains("### AI - "));
        assert!(md.contains("### Error - "));
    }

    #[test]
    fn test_turn_json_uses_type_field() {
        let mut convo = Conversation::default();
        convo.push_user("hi");
        let json = serde_json::to_value(&convo.turns()[0]).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["content"], "hi");
    }
}
