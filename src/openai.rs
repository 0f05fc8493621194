//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions: multi-turn coaching replies, image descriptions and
//! author text enhancement. Calls are instrumented and log model names, latencies and
//! response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{ChatMessage, ChatRole};
use crate::util::fill_template;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Plain-text chat completion over an arbitrary message list.
  #[instrument(level = "info", skip(self, messages), fields(model = %model, turns = messages.len()))]
  async fn chat(&self, model: &str, messages: Vec<ChatMessageReq>, temperature: f32) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "exercise-engine/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "OpenAI call failed");
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");
    Ok(text)
  }

  // --- High-level helpers (domain-specialized) ---

  /// Next assistant reply for a coaching transcript. System turns in `transcript` are
  /// replaced by one built from the author's instructions.
  #[instrument(level = "info", skip(self, prompts, instructions, transcript), fields(turns = transcript.len()))]
  pub async fn coach_reply(
    &self,
    prompts: &Prompts,
    instructions: &str,
    transcript: &[ChatMessage],
  ) -> Result<String, String> {
    let system = fill_template(&prompts.chat_system_template, &[("instructions", instructions)]);
    let mut messages = vec![ChatMessageReq::text("system", &system)];
    let mut has_user = false;
    for m in transcript.iter().filter(|m| m.role != ChatRole::System) {
      has_user |= m.role == ChatRole::User;
      messages.push(ChatMessageReq::text(role_name(m.role), &m.content));
    }
    if !has_user {
      messages.push(ChatMessageReq::text("user", &prompts.chat_opening_user));
    }
    self.chat(&self.strong_model, messages, 0.6).await
  }

  #[instrument(level = "info", skip_all, fields(bytes = bytes.len(), %mime))]
  pub async fn describe_image(&self, prompts: &Prompts, mime: &str, bytes: &[u8]) -> Result<String, String> {
    let data_url = format!("data:{};base64,{}", mime, BASE64.encode(bytes));
    let messages = vec![
      ChatMessageReq::text("system", &prompts.describe_image_system),
      ChatMessageReq {
        role: "user".into(),
        content: json!([{ "type": "image_url", "image_url": { "url": data_url } }]),
      },
    ];
    self.chat(&self.fast_model, messages, 0.2).await
  }

  #[instrument(level = "info", skip_all, fields(%keyword, text_len = text.len()))]
  pub async fn enhance(&self, prompts: &Prompts, keyword: &str, context: &str, text: &str) -> Result<String, String> {
    let user = fill_template(
      &prompts.enhance_user_template,
      &[("keyword", keyword), ("context", context), ("text", text)],
    );
    let messages = vec![
      ChatMessageReq::text("system", &prompts.enhance_system),
      ChatMessageReq::text("user", &user),
    ];
    self.chat(&self.fast_model, messages, 0.4).await
  }
}

fn role_name(role: ChatRole) -> &'static str {
  match role {
    ChatRole::System => "system",
    ChatRole::User => "user",
    ChatRole::Assistant => "assistant",
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
/// `content` is a string or, for vision input, an array of parts.
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: Value }

impl ChatMessageReq {
  fn text(role: &str, content: &str) -> Self {
    Self { role: role.into(), content: Value::String(content.into()) }
  }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
