//! Per-tool response contract: answer shape, interaction mapping and "answered" checks.

use tracing::debug;

use crate::domain::{AssetId, ResponseTool, ToolKind};
use crate::error::{EngineError, Result};

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 10;

/// How a tool's answer is shaped. `Unsupported` is a terminal case for tags this build does not know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseShape<'a> {
    FreeText,
    Rating { min: i64, max: i64 },
    SingleChoice { options: &'a [String] },
    MultiChoice { options: &'a [String] },
    Conversation,
    Asset,
    Unsupported,
}

pub fn shape(kind: &ToolKind) -> ResponseShape<'_> {
    match kind {
        ToolKind::Text | ToolKind::Journal => ResponseShape::FreeText,
        ToolKind::Rating => ResponseShape::Rating { min: RATING_MIN, max: RATING_MAX },
        ToolKind::McqSingle { options } => ResponseShape::SingleChoice { options },
        ToolKind::McqMultiselect { options } => ResponseShape::MultiChoice { options },
        ToolKind::ChatBot { .. } => ResponseShape::Conversation,
        ToolKind::FileUpload | ToolKind::Audio | ToolKind::Video => ResponseShape::Asset,
        ToolKind::Unsupported { .. } => ResponseShape::Unsupported,
    }
}

/// A raw respondent event on a scalar tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Text(String),
    Rate(i64),
    Choose(String),
    /// Flip one option in a multiselect.
    Toggle(String),
    Select(Vec<String>),
    Attach(AssetId),
    Clear,
}

/// Decode a stored multiselect answer. Malformed JSON is an empty selection.
pub fn decode_selection(raw: Option<&str>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(s) if s.trim().is_empty() => Vec::new(),
        Some(s) => serde_json::from_str::<Vec<String>>(s).unwrap_or_else(|e| {
            debug!(target: "response", error = %e, "Unreadable multiselect answer; treating as empty");
            Vec::new()
        }),
    }
}

pub fn encode_selection(selected: &[String]) -> String {
    serde_json::to_string(selected).unwrap_or_else(|_| "[]".into())
}

pub fn clamp_rating(value: i64) -> i64 {
    value.clamp(RATING_MIN, RATING_MAX)
}

/// Map `interaction` onto the next stored `response` for `tool`.
pub fn apply(tool: &ResponseTool, interaction: Interaction) -> Result<Option<String>> {
    let mismatch = || EngineError::InteractionMismatch(tool.tool.kind.label().to_string());

    if interaction == Interaction::Clear {
        return match shape(&tool.tool.kind) {
            ResponseShape::Conversation | ResponseShape::Unsupported => Err(mismatch()),
            _ => Ok(None),
        };
    }

    match (shape(&tool.tool.kind), interaction) {
        (ResponseShape::FreeText, Interaction::Text(s)) => Ok(Some(s)),
        (ResponseShape::Rating { .. }, Interaction::Rate(v)) => Ok(Some(clamp_rating(v).to_string())),
        (ResponseShape::SingleChoice { options }, Interaction::Choose(choice)) => {
            if options.contains(&choice) {
                Ok(Some(choice))
            } else {
                Err(EngineError::NotAnOption(choice))
            }
        }
        (ResponseShape::MultiChoice { options }, Interaction::Toggle(choice)) => {
            if !options.contains(&choice) {
                return Err(EngineError::NotAnOption(choice));
            }
            let mut selected = decode_selection(tool.response.as_deref());
            selected.retain(|s| options.contains(s));
            if let Some(pos) = selected.iter().position(|s| *s == choice) {
                selected.remove(pos);
            } else {
                selected.push(choice);
            }
            Ok(Some(encode_selection(&selected)))
        }
        (ResponseShape::MultiChoice { options }, Interaction::Select(choices)) => {
            if let Some(bad) = choices.iter().find(|c| !options.contains(*c)) {
                return Err(EngineError::NotAnOption(bad.clone()));
            }
            let mut selected: Vec<String> = Vec::with_capacity(choices.len());
            for c in choices {
                if !selected.contains(&c) {
                    selected.push(c);
                }
            }
            Ok(Some(encode_selection(&selected)))
        }
        (ResponseShape::Asset, Interaction::Attach(asset)) => Ok(Some(asset.0)),
        _ => Err(mismatch()),
    }
}

/// Check a raw response written directly to a scalar tool against its contract.
/// Ratings are clamped and multiselect payloads are re-encoded without duplicates.
pub fn validate_response(tool: &ResponseTool, response: Option<String>) -> Result<Option<String>> {
    let label = tool.tool.kind.label();
    let invalid = |value: &str| EngineError::InvalidValue { tool_type: label.to_string(), value: value.to_string() };
    let shape = shape(&tool.tool.kind);
    if matches!(shape, ResponseShape::Conversation | ResponseShape::Unsupported) {
        return Err(EngineError::InteractionMismatch(label.to_string()));
    }
    let Some(raw) = response else { return Ok(None) };

    match shape {
        ResponseShape::Rating { .. } => match raw.trim().parse::<i64>() {
            Ok(v) => Ok(Some(clamp_rating(v).to_string())),
            Err(_) => Err(invalid(&raw)),
        },
        ResponseShape::SingleChoice { options } => {
            if options.contains(&raw) {
                Ok(Some(raw))
            } else {
                Err(EngineError::NotAnOption(raw))
            }
        }
        ResponseShape::MultiChoice { options } => {
            let choices: Vec<String> = serde_json::from_str(&raw).map_err(|_| invalid(&raw))?;
            if let Some(bad) = choices.iter().find(|c| !options.contains(*c)) {
                return Err(EngineError::NotAnOption(bad.clone()));
            }
            let mut selected: Vec<String> = Vec::with_capacity(choices.len());
            for c in choices {
                if !selected.contains(&c) {
                    selected.push(c);
                }
            }
            Ok(Some(encode_selection(&selected)))
        }
        _ => Ok(Some(raw)),
    }
}

pub fn is_answered(tool: &ResponseTool) -> bool {
    let response = tool.response.as_deref().unwrap_or("");
    match shape(&tool.tool.kind) {
        ResponseShape::FreeText | ResponseShape::Asset => !response.is_empty(),
        ResponseShape::Rating { min, max } => {
            matches!(response.trim().parse::<i64>(), Ok(v) if (min..=max).contains(&v))
        }
        ResponseShape::SingleChoice { options } => !response.is_empty() && options.iter().any(|o| o == response),
        ResponseShape::MultiChoice { options } => {
            let selected = decode_selection(tool.response.as_deref());
            !selected.is_empty() && selected.iter().all(|s| options.contains(s))
        }
        ResponseShape::Conversation => tool.user_turns() > 0,
        ResponseShape::Unsupported => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, Tool};

    fn rt(kind: ToolKind) -> ResponseTool {
        ResponseTool::from(&Tool { index: 0, unique_name: "t".into(), placeholder_text: String::new(), kind })
    }

    fn opts() -> Vec<String> {
        vec!["red".into(), "green".into(), "blue".into()]
    }

    #[test]
    fn text_answered_iff_non_empty() {
        let mut t = rt(ToolKind::Journal);
        assert!(!is_answered(&t));
        t.response = apply(&t, Interaction::Text("today".into())).unwrap();
        assert!(is_answered(&t));
        t.response = Some(String::new());
        assert!(!is_answered(&t));
    }

    #[test]
    fn rating_is_clamped() {
        let t = rt(ToolKind::Rating);
        assert_eq!(apply(&t, Interaction::Rate(14)).unwrap().as_deref(), Some("10"));
        assert_eq!(apply(&t, Interaction::Rate(0)).unwrap().as_deref(), Some("1"));
        let mut stored = rt(ToolKind::Rating);
        stored.response = Some("11".into());
        assert!(!is_answered(&stored));
        stored.response = Some("7".into());
        assert!(is_answered(&stored));
    }

    #[test]
    fn single_choice_must_be_an_option() {
        let t = rt(ToolKind::McqSingle { options: opts() });
        assert!(matches!(apply(&t, Interaction::Choose("pink".into())), Err(EngineError::NotAnOption(_))));
        let mut t2 = t.clone();
        t2.response = apply(&t, Interaction::Choose("green".into())).unwrap();
        assert!(is_answered(&t2));
        t2.response = Some("pink".into());
        assert!(!is_answered(&t2));
    }

    #[test]
    fn multiselect_toggle_and_malformed_payload() {
        let mut t = rt(ToolKind::McqMultiselect { options: opts() });
        t.response = Some("{not json".into());
        assert!(decode_selection(t.response.as_deref()).is_empty());
        assert!(!is_answered(&t));

        t.response = apply(&t, Interaction::Toggle("red".into())).unwrap();
        t.response = apply(&t, Interaction::Toggle("blue".into())).unwrap();
        assert_eq!(decode_selection(t.response.as_deref()), vec!["red".to_string(), "blue".to_string()]);
        t.response = apply(&t, Interaction::Toggle("red".into())).unwrap();
        assert_eq!(decode_selection(t.response.as_deref()), vec!["blue".to_string()]);
        assert!(is_answered(&t));
    }

    #[test]
    fn selection_round_trips_including_empty() {
        for set in [vec![], vec!["a".to_string()], vec!["x \"quoted\"".to_string(), "ü".to_string()]] {
            assert_eq!(decode_selection(Some(encode_selection(&set).as_str())), set);
        }
    }

    #[test]
    fn chat_answered_from_user_messages() {
        let mut t = rt(ToolKind::ChatBot { chat_bot_instructions: String::new(), max_chat_count: None });
        t.messages = vec![ChatMessage::system("s"), ChatMessage::assistant("hi")];
        assert!(!is_answered(&t));
        t.messages.push(ChatMessage::user("hello"));
        assert!(is_answered(&t));
        assert!(apply(&t, Interaction::Text("x".into())).is_err());
    }

    #[test]
    fn raw_responses_follow_the_tool_contract() {
        let rating = rt(ToolKind::Rating);
        assert_eq!(validate_response(&rating, Some("42".into())).unwrap().as_deref(), Some("10"));
        assert_eq!(validate_response(&rating, Some(" 3 ".into())).unwrap().as_deref(), Some("3"));
        assert!(matches!(validate_response(&rating, Some("lots".into())), Err(EngineError::InvalidValue { .. })));
        assert_eq!(validate_response(&rating, None).unwrap(), None);

        let single = rt(ToolKind::McqSingle { options: opts() });
        assert!(matches!(validate_response(&single, Some("pink".into())), Err(EngineError::NotAnOption(_))));
        assert_eq!(validate_response(&single, Some("red".into())).unwrap().as_deref(), Some("red"));

        let multi = rt(ToolKind::McqMultiselect { options: opts() });
        assert_eq!(
            validate_response(&multi, Some(r#"["blue","red","blue"]"#.into())).unwrap().as_deref(),
            Some(r#"["blue","red"]"#)
        );
        assert!(matches!(validate_response(&multi, Some("red".into())), Err(EngineError::InvalidValue { .. })));
        assert!(matches!(validate_response(&multi, Some(r#"["pink"]"#.into())), Err(EngineError::NotAnOption(_))));

        assert_eq!(validate_response(&rt(ToolKind::Text), Some("free".into())).unwrap().as_deref(), Some("free"));
        let chat = rt(ToolKind::ChatBot { chat_bot_instructions: String::new(), max_chat_count: None });
        assert!(matches!(validate_response(&chat, Some("hi".into())), Err(EngineError::InteractionMismatch(_))));
    }

    #[test]
    fn unsupported_is_terminal() {
        let t = rt(ToolKind::Unsupported { tool_type: "SLIDER".into(), fields: Default::default() });
        assert_eq!(shape(&t.tool.kind), ResponseShape::Unsupported);
        assert!(!is_answered(&t));
        assert!(apply(&t, Interaction::Clear).is_err());
    }
}
