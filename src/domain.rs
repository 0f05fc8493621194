//! Domain models: the authored exercise (pages + tools) and the respondent-facing mirror.
//!
//! Wire names are camelCase; the tool tag is `toolType` in SCREAMING_SNAKE_CASE.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::chat::TurnPhase;

/// Opaque identifier returned by the asset store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// The closed set of tool kinds an author can place on a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolType {
  Text,
  Journal,
  Rating,
  McqSingle,
  McqMultiselect,
  ChatBot,
  FileUpload,
  Audio,
  Video,
}

impl ToolType {
  pub fn as_str(self) -> &'static str {
    match self {
      ToolType::Text => "TEXT",
      ToolType::Journal => "JOURNAL",
      ToolType::Rating => "RATING",
      ToolType::McqSingle => "MCQ_SINGLE",
      ToolType::McqMultiselect => "MCQ_MULTISELECT",
      ToolType::ChatBot => "CHAT_BOT",
      ToolType::FileUpload => "FILE_UPLOAD",
      ToolType::Audio => "AUDIO",
      ToolType::Video => "VIDEO",
    }
  }
}

impl fmt::Display for ToolType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Variant-specific part of a tool, tagged by `toolType`.
/// Unknown tags land in `Unsupported` with their raw fields, and are written back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
#[serde(tag = "toolType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolKind {
  Text,
  Journal,
  Rating,
  McqSingle {
    #[serde(default)] options: Vec<String>,
  },
  McqMultiselect {
    #[serde(default)] options: Vec<String>,
  },
  ChatBot {
    #[serde(default, rename = "chatBotInstructions")] chat_bot_instructions: String,
    #[serde(default, rename = "maxChatCount")] max_chat_count: Option<u32>,
  },
  FileUpload,
  Audio,
  Video,
  #[serde(skip)]
  Unsupported {
    tool_type: String,
    fields: Map<String, Value>,
  },
}

const TOOL_TAG: &str = "toolType";

impl Serialize for ToolKind {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      ToolKind::Unsupported { tool_type, fields } => {
        let mut raw = fields.clone();
        raw.insert(TOOL_TAG.into(), Value::String(tool_type.clone()));
        raw.serialize(serializer)
      }
      known => ToolKind::serialize(known, serializer),
    }
  }
}

impl<'de> Deserialize<'de> for ToolKind {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let mut raw = Map::<String, Value>::deserialize(deserializer)?;
    let tool_type = match raw.get(TOOL_TAG) {
      Some(Value::String(t)) => t.clone(),
      _ => return Err(de::Error::missing_field(TOOL_TAG)),
    };
    if serde_json::from_value::<ToolType>(Value::String(tool_type.clone())).is_ok() {
      return ToolKind::deserialize(Value::Object(raw)).map_err(de::Error::custom);
    }
    raw.remove(TOOL_TAG);
    Ok(ToolKind::Unsupported { tool_type, fields: raw })
  }
}

impl ToolKind {
  pub fn tool_type(&self) -> Option<ToolType> {
    Some(match self {
      ToolKind::Text => ToolType::Text,
      ToolKind::Journal => ToolType::Journal,
      ToolKind::Rating => ToolType::Rating,
      ToolKind::McqSingle { .. } => ToolType::McqSingle,
      ToolKind::McqMultiselect { .. } => ToolType::McqMultiselect,
      ToolKind::ChatBot { .. } => ToolType::ChatBot,
      ToolKind::FileUpload => ToolType::FileUpload,
      ToolKind::Audio => ToolType::Audio,
      ToolKind::Video => ToolType::Video,
      ToolKind::Unsupported { .. } => return None,
    })
  }

  pub fn label(&self) -> &'static str {
    self.tool_type().map(ToolType::as_str).unwrap_or("UNSUPPORTED")
  }

  pub fn options(&self) -> Option<&[String]> {
    match self {
      ToolKind::McqSingle { options } | ToolKind::McqMultiselect { options } => Some(options),
      _ => None,
    }
  }

  pub fn options_mut(&mut self) -> Option<&mut Vec<String>> {
    match self {
      ToolKind::McqSingle { options } | ToolKind::McqMultiselect { options } => Some(options),
      _ => None,
    }
  }
}

/// One response-collecting unit placed on a page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
  pub index: usize,
  /// Stable join key between the authored tool and a response's answer slot. Never regenerated.
  pub unique_name: String,
  #[serde(default)] pub placeholder_text: String,
  #[serde(flatten)]
  pub kind: ToolKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
  pub index: usize,
  #[serde(default)] pub tools: Vec<Tool>,
  #[serde(default)] pub display_images: Vec<AssetId>,
  /// Parallel to `display_images`.
  #[serde(default)] pub display_image_descriptions: Vec<Option<String>>,
  #[serde(default)] pub files: Vec<AssetId>,
  #[serde(default)] pub display_text: String,
  #[serde(default)] pub timer_seconds: u32,
  #[serde(default)] pub extraction_prompt: String,
}

impl Page {
  pub fn empty(index: usize) -> Self {
    Self {
      index,
      tools: Vec::new(),
      display_images: Vec::new(),
      display_image_descriptions: Vec::new(),
      files: Vec::new(),
      display_text: String::new(),
      timer_seconds: 0,
      extraction_prompt: String::new(),
    }
  }
}

/// Authored document. `pages` is never empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
  /// None until the backend has persisted the document once.
  #[serde(default)] pub id: Option<String>,
  #[serde(default)] pub activity_id: Option<String>,
  pub pages: Vec<Page>,
  #[serde(default)] pub extraction_prompt: String,
  #[serde(default)] pub is_locked: bool,
}

impl Exercise {
  /// A fresh, unsaved draft with a single empty page.
  pub fn draft() -> Self {
    Self {
      id: None,
      activity_id: None,
      pages: vec![Page::empty(0)],
      extraction_prompt: String::new(),
      is_locked: false,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  System,
  User,
  Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: ChatRole,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self { Self { role: ChatRole::System, content: content.into() } }
  pub fn user(content: impl Into<String>) -> Self { Self { role: ChatRole::User, content: content.into() } }
  pub fn assistant(content: impl Into<String>) -> Self { Self { role: ChatRole::Assistant, content: content.into() } }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
  Paused,
  Completed,
}

/// A tool as the respondent sees it: the authored tool plus its answer slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTool {
  #[serde(flatten)]
  pub tool: Tool,
  #[serde(default)] pub response: Option<String>,
  #[serde(default)] pub messages: Vec<ChatMessage>,
  #[serde(default)] pub chat_initiated: bool,
  /// Local-only marker for an optimistic chat turn awaiting the service.
  #[serde(skip)]
  pub turn_phase: TurnPhase,
}

impl From<&Tool> for ResponseTool {
  fn from(tool: &Tool) -> Self {
    Self {
      tool: tool.clone(),
      response: None,
      messages: Vec::new(),
      chat_initiated: false,
      turn_phase: TurnPhase::Confirmed,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePage {
  pub index: usize,
  #[serde(default)] pub tools: Vec<ResponseTool>,
  #[serde(default)] pub display_images: Vec<AssetId>,
  #[serde(default)] pub display_image_descriptions: Vec<Option<String>>,
  #[serde(default)] pub files: Vec<AssetId>,
  #[serde(default)] pub display_text: String,
  #[serde(default)] pub timer_seconds: u32,
}

impl From<&Page> for ResponsePage {
  fn from(page: &Page) -> Self {
    Self {
      index: page.index,
      tools: page.tools.iter().map(ResponseTool::from).collect(),
      display_images: page.display_images.clone(),
      display_image_descriptions: page.display_image_descriptions.clone(),
      files: page.files.clone(),
      display_text: page.display_text.clone(),
      timer_seconds: page.timer_seconds,
    }
  }
}

/// A respondent's answers, structurally mirroring `Exercise::pages`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResponse {
  pub id: String,
  pub exercise_id: String,
  #[serde(default)] pub milestone_tracker_id: String,
  pub status: ResponseStatus,
  #[serde(default)] pub details: String,
  #[serde(default)] pub evaluation_text: String,
  #[serde(default)] pub pages: Vec<ResponsePage>,
}

impl ExerciseResponse {
  /// Fresh PAUSED response mirroring every page and tool of `exercise`.
  pub fn mirror(id: String, exercise_id: String, milestone_tracker_id: String, exercise: &Exercise) -> Self {
    Self {
      id,
      exercise_id,
      milestone_tracker_id,
      status: ResponseStatus::Paused,
      details: String::new(),
      evaluation_text: String::new(),
      pages: exercise.pages.iter().map(ResponsePage::from).collect(),
    }
  }

  pub fn is_completed(&self) -> bool { self.status == ResponseStatus::Completed }

  pub fn tool(&self, page: usize, unique_name: &str) -> Option<&ResponseTool> {
    self.pages.get(page)?.tools.iter().find(|t| t.tool.unique_name == unique_name)
  }

  pub fn tool_mut(&mut self, page: usize, unique_name: &str) -> Option<&mut ResponseTool> {
    self.pages.get_mut(page)?.tools.iter_mut().find(|t| t.tool.unique_name == unique_name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn tool_wire_shape_uses_tag_and_camel_case() {
    let tool = Tool {
      index: 0,
      unique_name: "chat-1".into(),
      placeholder_text: String::new(),
      kind: ToolKind::ChatBot { chat_bot_instructions: "Be kind".into(), max_chat_count: Some(3) },
    };
    let v = serde_json::to_value(&tool).unwrap();
    assert_eq!(v["toolType"], "CHAT_BOT");
    assert_eq!(v["uniqueName"], "chat-1");
    assert_eq!(v["chatBotInstructions"], "Be kind");
    assert_eq!(v["maxChatCount"], 3);
  }

  #[test]
  fn unknown_tool_type_survives_a_round_trip() {
    let raw = json!({ "index": 0, "uniqueName": "x", "placeholderText": "", "toolType": "SLIDER", "min": 1, "max": 5 });
    let tool: Tool = serde_json::from_value(raw.clone()).unwrap();
    assert!(matches!(&tool.kind, ToolKind::Unsupported { tool_type, .. } if tool_type == "SLIDER"));
    assert_eq!(tool.kind.tool_type(), None);
    assert_eq!(serde_json::to_value(&tool).unwrap(), raw);

    let mut answered = json!({ "response": null, "messages": [], "chatInitiated": false });
    answered.as_object_mut().unwrap().extend(raw.as_object().unwrap().clone());
    let rt: ResponseTool = serde_json::from_value(answered.clone()).unwrap();
    assert_eq!(serde_json::to_value(&rt).unwrap(), answered);
  }

  #[test]
  fn known_tag_with_bad_fields_is_an_error() {
    let raw = json!({ "index": 0, "uniqueName": "x", "toolType": "MCQ_SINGLE", "options": "not a list" });
    assert!(serde_json::from_value::<Tool>(raw).is_err());
    let untagged = json!({ "index": 0, "uniqueName": "x" });
    assert!(serde_json::from_value::<Tool>(untagged).is_err());
  }

  #[test]
  fn response_tool_carries_answer_fields_next_to_tool() {
    let raw = json!({
      "index": 1, "uniqueName": "mcq-a", "toolType": "MCQ_MULTISELECT",
      "options": ["a", "b"], "response": "[\"a\"]", "messages": [], "chatInitiated": false
    });
    let rt: ResponseTool = serde_json::from_value(raw).unwrap();
    assert_eq!(rt.tool.kind.options().map(|o| o.len()), Some(2));
    assert_eq!(rt.response.as_deref(), Some("[\"a\"]"));
    assert_eq!(rt.turn_phase, TurnPhase::Confirmed);
  }

  #[test]
  fn mirror_copies_structure_and_starts_paused() {
    let mut ex = Exercise::draft();
    ex.pages[0].tools.push(Tool { index: 0, unique_name: "t".into(), placeholder_text: String::new(), kind: ToolKind::Text });
    let r = ExerciseResponse::mirror("r1".into(), "e1".into(), "m1".into(), &ex);
    assert_eq!(r.status, ResponseStatus::Paused);
    assert_eq!(r.pages.len(), 1);
    assert!(r.tool(0, "t").is_some());
    assert!(r.tool(0, "missing").is_none());
  }
}
