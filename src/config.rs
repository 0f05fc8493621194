//! Loading engine configuration (prompts, authoring defaults, autosave) from TOML.
//!
//! Every section and field is optional; missing values fall back to `Default`.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub authoring: AuthoringDefaults,
  #[serde(default)]
  pub autosave: AutosaveConfig,
}

/// Prompts used by the conversation and text services.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Wraps the author's chat-bot instructions; `{instructions}` is substituted.
  pub chat_system_template: String,
  /// Opening user turn sent when a conversation is initiated.
  pub chat_opening_user: String,
  pub describe_image_system: String,
  pub enhance_system: String,
  /// `{keyword}`, `{context}` and `{text}` are substituted.
  pub enhance_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      chat_system_template: "You are a supportive coach guiding a participant through a written exercise. Follow the author's instructions below. Keep every reply under 120 words and ask one question at a time.\n\nInstructions:\n{instructions}".into(),
      chat_opening_user: "Please start the conversation.".into(),
      describe_image_system: "Describe the image in one or two plain sentences for a participant who cannot see it. Output ONLY the description.".into(),
      enhance_system: "You improve short pieces of exercise content written by a trainer. Keep the author's intent and language. Output ONLY the improved text.".into(),
      enhance_user_template: "Field: {keyword}\nExercise: {context}\n\nCurrent text:\n{text}".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthoringDefaults {
  /// Placeholder options given to a new choice tool. Always two.
  pub mcq_options: [String; 2],
  pub chat_bot_instructions: String,
}

impl Default for AuthoringDefaults {
  fn default() -> Self {
    Self {
      mcq_options: ["Option 1".into(), "Option 2".into()],
      chat_bot_instructions: "Ask the participant how they feel about this exercise and help them reflect on their answers.".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
  pub enabled: bool,
  pub period_secs: u64,
}

impl Default for AutosaveConfig {
  fn default() -> Self {
    Self { enabled: true, period_secs: 10 }
  }
}

impl AutosaveConfig {
  pub fn period(&self) -> Duration {
    Duration::from_secs(self.period_secs.max(1))
  }
}

/// Attempt to load `EngineConfig` from EXERCISE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("EXERCISE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "exercise_engine", %path, "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "exercise_engine", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "exercise_engine", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
