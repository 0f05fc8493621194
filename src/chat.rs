//! Conversational tool state: initiation, optimistic turns and the local turn cap.
//!
//! A turn is two-phase. `begin_turn` appends the respondent's message and marks the
//! tool `Provisional`; `confirm_turn` replaces the transcript with the service's canonical
//! one, `abandon_turn` rolls the provisional message back.

use crate::domain::{ChatMessage, ChatRole, ResponseTool, ToolKind};
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Confirmed,
    /// A user message was appended locally and the service reply is outstanding.
    Provisional,
}

/// Messages the respondent may see; system turns stay in the transcript for the service only.
pub fn visible(messages: &[ChatMessage]) -> impl Iterator<Item = &ChatMessage> {
    messages.iter().filter(|m| m.role != ChatRole::System)
}

pub fn user_turns(messages: &[ChatMessage]) -> usize {
    messages.iter().filter(|m| m.role == ChatRole::User).count()
}

impl ResponseTool {
    pub fn is_chat_bot(&self) -> bool {
        matches!(self.tool.kind, ToolKind::ChatBot { .. })
    }

    pub fn max_chat_count(&self) -> Option<u32> {
        match &self.tool.kind {
            ToolKind::ChatBot { max_chat_count, .. } => *max_chat_count,
            _ => None,
        }
    }

    pub fn user_turns(&self) -> usize {
        user_turns(&self.messages)
    }

    pub fn turn_limit_reached(&self) -> bool {
        match self.max_chat_count() {
            Some(max) => self.user_turns() >= max as usize,
            None => false,
        }
    }

    /// Whether the input affordance should be enabled.
    pub fn can_send(&self) -> bool {
        self.is_chat_bot()
            && self.chat_initiated
            && self.turn_phase == TurnPhase::Confirmed
            && !self.turn_limit_reached()
    }

    fn ensure_chat_bot(&self) -> Result<()> {
        if self.is_chat_bot() {
            Ok(())
        } else {
            Err(EngineError::InteractionMismatch(self.tool.kind.label().to_string()))
        }
    }

    /// Mark an initiation as in flight. Only valid before the chat has started.
    pub fn begin_initiation(&mut self) -> Result<()> {
        self.ensure_chat_bot()?;
        if self.chat_initiated {
            return Err(EngineError::ChatAlreadyInitiated);
        }
        if self.turn_phase == TurnPhase::Provisional {
            return Err(EngineError::TurnInFlight);
        }
        self.turn_phase = TurnPhase::Provisional;
        Ok(())
    }

    pub fn abandon_initiation(&mut self) {
        if !self.chat_initiated {
            self.turn_phase = TurnPhase::Confirmed;
        }
    }

    /// Opening turns from the service replace whatever the transcript held.
    pub fn complete_initiation(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.chat_initiated = true;
        self.turn_phase = TurnPhase::Confirmed;
    }

    pub fn begin_turn(&mut self, content: &str) -> Result<()> {
        self.ensure_chat_bot()?;
        if !self.chat_initiated {
            return Err(EngineError::ChatNotInitiated);
        }
        if self.turn_phase == TurnPhase::Provisional {
            return Err(EngineError::TurnInFlight);
        }
        if let Some(max) = self.max_chat_count() {
            if self.user_turns() >= max as usize {
                return Err(EngineError::TurnLimitReached(max));
            }
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        self.messages.push(ChatMessage::user(content));
        self.turn_phase = TurnPhase::Provisional;
        Ok(())
    }

    /// Adopt the service transcript wholesale.
    pub fn confirm_turn(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.chat_initiated = true;
        self.turn_phase = TurnPhase::Confirmed;
    }

    pub fn abandon_turn(&mut self) {
        if self.turn_phase != TurnPhase::Provisional {
            return;
        }
        if matches!(self.messages.last(), Some(m) if m.role == ChatRole::User) {
            self.messages.pop();
        }
        self.turn_phase = TurnPhase::Confirmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tool;

    fn chat_tool(max: Option<u32>) -> ResponseTool {
        ResponseTool::from(&Tool {
            index: 0,
            unique_name: "bot".into(),
            placeholder_text: String::new(),
            kind: ToolKind::ChatBot { chat_bot_instructions: "coach".into(), max_chat_count: max },
        })
    }

    fn started(max: Option<u32>) -> ResponseTool {
        let mut t = chat_tool(max);
        t.complete_initiation(vec![ChatMessage::system("coach"), ChatMessage::assistant("Hi")]);
        t
    }

    #[test]
    fn turns_require_initiation() {
        let mut t = chat_tool(None);
        assert!(matches!(t.begin_turn("hello"), Err(EngineError::ChatNotInitiated)));
        t.begin_initiation().unwrap();
        assert!(matches!(t.begin_initiation(), Err(EngineError::TurnInFlight)));
        t.abandon_initiation();
        t.begin_initiation().unwrap();
        t.complete_initiation(vec![ChatMessage::assistant("Hi")]);
        assert_eq!(t.turn_phase, TurnPhase::Confirmed);
        assert!(matches!(t.begin_initiation(), Err(EngineError::ChatAlreadyInitiated)));
    }

    #[test]
    fn provisional_turn_is_replaced_by_service_transcript() {
        let mut t = started(None);
        t.begin_turn("  how do I start?  ").unwrap();
        assert_eq!(t.turn_phase, TurnPhase::Provisional);
        assert_eq!(t.messages.last(), Some(&ChatMessage::user("how do I start?")));
        assert!(!t.can_send());

        let canonical = vec![
            ChatMessage::system("coach"),
            ChatMessage::assistant("Hi"),
            ChatMessage::user("how do I start?"),
            ChatMessage::assistant("Pick one small goal."),
        ];
        t.confirm_turn(canonical.clone());
        assert_eq!(t.messages, canonical);
        assert_eq!(t.turn_phase, TurnPhase::Confirmed);
    }

    #[test]
    fn abandon_rolls_back_only_the_provisional_message() {
        let mut t = started(None);
        t.begin_turn("first").unwrap();
        t.abandon_turn();
        assert_eq!(t.messages.len(), 2);
        t.abandon_turn();
        assert_eq!(t.messages.len(), 2);
    }

    #[test]
    fn limit_counts_user_turns_only() {
        let mut t = started(Some(1));
        assert_eq!(visible(&t.messages).count(), 1);
        assert!(t.can_send());
        t.begin_turn("one").unwrap();
        t.confirm_turn(vec![ChatMessage::system("coach"), ChatMessage::user("one"), ChatMessage::assistant("ok")]);
        assert!(t.turn_limit_reached());
        assert!(!t.can_send());
        assert!(matches!(t.begin_turn("two"), Err(EngineError::TurnLimitReached(1))));
    }

    #[test]
    fn empty_messages_and_other_tools_are_rejected() {
        let mut t = started(None);
        assert!(matches!(t.begin_turn("   "), Err(EngineError::EmptyMessage)));
        let mut text = ResponseTool::from(&Tool {
            index: 0,
            unique_name: "t".into(),
            placeholder_text: String::new(),
            kind: ToolKind::Text,
        });
        assert!(matches!(text.begin_turn("x"), Err(EngineError::InteractionMismatch(_))));
    }
}
