//! HTTP endpoint handlers. These are thin wrappers that forward to the in-memory backend.
//! Each handler is instrumented with ids and sizes; document contents are never logged.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{error, info, instrument, warn};

use crate::domain::{AssetId, Exercise, ExerciseResponse, ResponseTool};
use crate::error::{EngineError, ErrorKind};
use crate::protocol::*;
use crate::service::{AssetStore, ChatTurnReply, ConversationService, ExerciseApi};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, EngineError>;

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let status = match self.kind() {
      ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
      ErrorKind::TerminalState => StatusCode::CONFLICT,
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Decode => StatusCode::BAD_REQUEST,
      ErrorKind::Network => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
      error!(target: "exercise_engine", error = %self, "Request failed");
    } else {
      warn!(target: "exercise_engine", error = %self, code = self.code(), "Request rejected");
    }
    let body = ErrorOut { error: self.code().to_string(), message: self.to_string() };
    (status, Json(body)).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let exercises = state.exercises.read().await.len();
  let responses = state.responses.read().await.len();
  Json(HealthOut { ok: true, openai: state.openai.is_some(), exercises, responses })
}

// -------- Exercises --------

#[instrument(level = "info", skip(state, body), fields(activity_id = %body.activity_id))]
pub async fn http_create_exercise(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateExerciseIn>,
) -> ApiResult<Exercise> {
  Ok(Json(state.create_exercise(&body.activity_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_exercise(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Exercise> {
  Ok(Json(state.get_exercise(&id).await?))
}

#[instrument(level = "info", skip(state, body), fields(id = ?body.id, pages = body.pages.len()))]
pub async fn http_save_exercise(State(state): State<Arc<AppState>>, Json(body): Json<Exercise>) -> ApiResult<Exercise> {
  let saved = state.save_exercise(&body).await?;
  info!(target: "exercise", id = ?saved.id, "HTTP exercise saved");
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state))]
pub async fn http_lock_exercise(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<OkOut> {
  Ok(Json(OkOut { ok: state.lock_exercise(&id).await? }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_unlock_exercise(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<OkOut> {
  Ok(Json(OkOut { ok: state.unlock_exercise(&id).await? }))
}

#[instrument(level = "info", skip(state, body), fields(milestone_tracker_id = %body.milestone_tracker_id))]
pub async fn http_assign_response(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AssignIn>,
) -> ApiResult<ExerciseResponse> {
  Ok(Json(state.assign_response(&id, &body.milestone_tracker_id).await?))
}

// -------- Responses --------

#[instrument(level = "info", skip(state))]
pub async fn http_get_response(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<ExerciseResponse> {
  Ok(Json(state.get_response(&id).await?))
}

#[instrument(level = "debug", skip(state, body), fields(id = %body.id))]
pub async fn http_save_response(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExerciseResponse>,
) -> ApiResult<ExerciseResponse> {
  Ok(Json(state.save_response(&body).await?))
}

#[instrument(level = "info", skip(state, body), fields(id = %body.id))]
pub async fn http_submit_response(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExerciseResponse>,
) -> ApiResult<ExerciseResponse> {
  Ok(Json(state.submit_response(&body).await?))
}

// -------- Conversation, assets, text --------

#[instrument(level = "info", skip(state, body), fields(unique_name = %body.tool.unique_name, turns = body.messages.len()))]
pub async fn http_chat_turn(State(state): State<Arc<AppState>>, Json(body): Json<ResponseTool>) -> ApiResult<ChatTurnReply> {
  let reply = state.send_chat_turn(&body).await?;
  info!(target: "chat", unique_name = %body.tool.unique_name, turns = reply.messages.len(), "HTTP chat turn served");
  Ok(Json(reply))
}

#[instrument(level = "info", skip(state, body), fields(content_type = %body.content_type, b64_len = body.data_base64.len()))]
pub async fn http_upload_asset(State(state): State<Arc<AppState>>, Json(body): Json<UploadIn>) -> ApiResult<AssetOut> {
  let bytes = BASE64
    .decode(body.data_base64.as_bytes())
    .map_err(|e| EngineError::Decode(format!("asset payload: {e}")))?;
  let id = state.upload_asset(bytes, &body.content_type).await?;
  Ok(Json(AssetOut { asset_id: id.0 }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_describe_asset(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<DescribeOut> {
  let description = state.describe_image(&AssetId(id)).await?;
  Ok(Json(DescribeOut { description }))
}

#[instrument(level = "info", skip(state, body), fields(keyword = %body.keyword, context_id = %body.context_id, text_len = body.current_text.len()))]
pub async fn http_enhance_text(State(state): State<Arc<AppState>>, Json(body): Json<EnhanceIn>) -> ApiResult<TextOut> {
  let text = state.enhance_text(&body.keyword, &body.context_id, &body.current_text).await?;
  Ok(Json(TextOut { text }))
}
