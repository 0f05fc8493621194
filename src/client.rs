//! HTTP client for the exercise backend.
//!
//! Implements the same service seams as the in-process `AppState`, so an editor or a
//! respondent session can run against a remote server unchanged. Error bodies
//! (`{error, message}`) are mapped back onto `EngineError`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::USER_AGENT;
use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::domain::{AssetId, Exercise, ExerciseResponse, ResponseTool};
use crate::error::{EngineError, Result};
use crate::protocol::*;
use crate::service::{AssetStore, ChatTurnReply, ConversationService, ExerciseApi};

#[derive(Clone)]
pub struct RemoteApi {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl RemoteApi {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api/v1{}", self.base_url, path)
  }

  async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T> {
    let mut req = self.client.request(method, self.url(path)).header(USER_AGENT, "exercise-engine/0.1");
    if let Some(b) = body {
      req = req.json(b);
    }
    let start = std::time::Instant::now();
    let res = req.send().await?;
    debug!(target: "exercise_engine", %path, status = %res.status(), elapsed = ?start.elapsed(), "Backend call");
    decode(res).await
  }
}

/// Success bodies decode into `T`; error bodies into the matching `EngineError`.
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
  let status = res.status();
  if status.is_success() {
    return Ok(res.json::<T>().await?);
  }
  let body = res.text().await.unwrap_or_default();
  Err(match serde_json::from_str::<ErrorOut>(&body) {
    Ok(e) => EngineError::from_code(&e.error, e.message),
    Err(_) => EngineError::Service(format!("HTTP {status}: {body}")),
  })
}

#[async_trait]
impl ExerciseApi for RemoteApi {
  #[instrument(level = "info", skip(self))]
  async fn create_exercise(&self, activity_id: &str) -> Result<Exercise> {
    let body = CreateExerciseIn { activity_id: activity_id.to_string() };
    self.send(Method::POST, "/exercises", Some(&body)).await
  }

  async fn get_exercise(&self, id: &str) -> Result<Exercise> {
    self.send::<(), _>(Method::GET, &format!("/exercises/{id}"), None).await
  }

  #[instrument(level = "info", skip(self, exercise), fields(id = ?exercise.id))]
  async fn save_exercise(&self, exercise: &Exercise) -> Result<Exercise> {
    self.send(Method::PUT, "/exercises", Some(exercise)).await
  }

  async fn lock_exercise(&self, id: &str) -> Result<bool> {
    let out: OkOut = self.send::<(), _>(Method::POST, &format!("/exercises/{id}/lock"), None).await?;
    Ok(out.ok)
  }

  async fn unlock_exercise(&self, id: &str) -> Result<bool> {
    let out: OkOut = self.send::<(), _>(Method::POST, &format!("/exercises/{id}/unlock"), None).await?;
    Ok(out.ok)
  }

  async fn get_response(&self, id: &str) -> Result<ExerciseResponse> {
    self.send::<(), _>(Method::GET, &format!("/responses/{id}"), None).await
  }

  #[instrument(level = "debug", skip(self, response), fields(id = %response.id))]
  async fn save_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse> {
    self.send(Method::PUT, "/responses", Some(response)).await
  }

  #[instrument(level = "info", skip(self, response), fields(id = %response.id))]
  async fn submit_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse> {
    self.send(Method::POST, "/responses/submit", Some(response)).await
  }
}

#[async_trait]
impl ConversationService for RemoteApi {
  #[instrument(level = "info", skip(self, tool), fields(unique_name = %tool.tool.unique_name, turns = tool.messages.len()))]
  async fn send_chat_turn(&self, tool: &ResponseTool) -> Result<ChatTurnReply> {
    self.send(Method::POST, "/chat/turn", Some(tool)).await
  }

  async fn describe_image(&self, asset: &AssetId) -> Result<Option<String>> {
    let out: DescribeOut = self.send::<(), _>(Method::POST, &format!("/assets/{asset}/describe"), None).await?;
    Ok(out.description)
  }

  async fn enhance_text(&self, keyword: &str, context_id: &str, current_text: &str) -> Result<String> {
    let body = EnhanceIn {
      keyword: keyword.to_string(),
      context_id: context_id.to_string(),
      current_text: current_text.to_string(),
    };
    let out: TextOut = self.send(Method::POST, "/enhance", Some(&body)).await?;
    Ok(out.text)
  }
}

#[async_trait]
impl AssetStore for RemoteApi {
  #[instrument(level = "info", skip(self, bytes), fields(bytes = bytes.len(), %content_type))]
  async fn upload_asset(&self, bytes: Vec<u8>, content_type: &str) -> Result<AssetId> {
    let body = UploadIn { content_type: content_type.to_string(), data_base64: BASE64.encode(&bytes) };
    let out: AssetOut = self.send(Method::POST, "/assets", Some(&body)).await?;
    Ok(AssetId(out.asset_id))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::{AuthoringDefaults, AutosaveConfig, EngineConfig};
  use crate::domain::{ResponseStatus, ToolType};
  use crate::editor::ExerciseEditor;
  use crate::routes::build_router;
  use crate::service::Services;
  use crate::session::{ResponseSession, SubmitOutcome};
  use crate::state::AppState;
  use crate::tool::Interaction;

  /// Serve a fresh backend on an ephemeral port.
  async fn serve() -> (Arc<AppState>, RemoteApi) {
    let state = Arc::new(AppState::with_config(EngineConfig::default(), None));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    (state, RemoteApi::new(format!("http://{addr}/")).unwrap())
  }

  #[tokio::test]
  async fn author_and_respond_over_http() {
    let (state, api) = serve().await;
    let services = Services::from_backend(Arc::new(api));

    let mut editor = ExerciseEditor::create(services.clone(), "act-9", AuthoringDefaults::default()).await.unwrap();
    let rating = editor.add_tool(0, ToolType::Rating).unwrap();
    editor.add_tool(0, ToolType::ChatBot).unwrap();
    let asset = editor.add_display_image(0, vec![1, 2, 3], "image/png").await.unwrap();
    assert_eq!(state.asset(&asset).await.map(|a| a.bytes), Some(vec![1, 2, 3]));
    let prompt = editor.request_lock().unwrap();
    editor.lock(prompt.confirm()).await.unwrap();

    let id = editor.exercise().id.clone().unwrap();
    let assigned = state.assign_response(&id, "m1").await.unwrap();
    let manual = AutosaveConfig { enabled: false, period_secs: 10 };
    let mut session = ResponseSession::open(services, &assigned.id, &manual).await.unwrap();
    session.answer(0, &rating, Interaction::Rate(6)).await.unwrap();
    session.save().await.unwrap();
    assert_eq!(session.submit().await.unwrap(), SubmitOutcome::Submitted);

    let stored = state.get_response(&assigned.id).await.unwrap();
    assert_eq!(stored.status, ResponseStatus::Completed);
    assert_eq!(stored.tool(0, &rating).unwrap().response.as_deref(), Some("6"));
  }

  #[tokio::test]
  async fn wire_errors_map_back() {
    let (_state, api) = serve().await;
    assert!(matches!(api.get_exercise("missing").await, Err(EngineError::NotFound(_))));

    let ex = api.create_exercise("a").await.unwrap();
    let id = ex.id.clone().unwrap();
    assert!(api.lock_exercise(&id).await.unwrap());
    assert!(!api.lock_exercise(&id).await.unwrap());
    assert!(matches!(api.save_exercise(&ex).await, Err(EngineError::ExerciseLocked)));
  }

  #[tokio::test]
  async fn unreachable_backend_is_a_network_error() {
    let api = RemoteApi::new("http://127.0.0.1:9").unwrap();
    let err = api.get_response("r").await.unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Network);
  }
}
