//! Application state: in-memory exercise/response/asset stores, config and OpenAI client.
//!
//! This is the reference backend for every service seam. It owns the authoritative copy of
//! each document and normalizes what clients send:
//!   - exercises are reindexed and cannot change their lock flag through a save
//!   - responses keep their stored id, exercise, status and structure; only answers are taken
//!     from the client, and COMPLETED is final
//!   - unlocking an exercise deletes all of its responses

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_config_from_env, EngineConfig};
use crate::domain::{AssetId, Exercise, ExerciseResponse, ResponseStatus, ResponseTool, Tool};
use crate::error::{EngineError, Result};
use crate::lock::{self, LockEvent, LockState};
use crate::logic::{do_chat_turn, do_describe_image, do_enhance_text};
use crate::openai::OpenAI;
use crate::service::{AssetStore, ChatTurnReply, ConversationService, ExerciseApi};

#[derive(Clone, Debug)]
pub struct StoredAsset {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct AppState {
    pub exercises: Arc<RwLock<HashMap<String, Exercise>>>,
    pub responses: Arc<RwLock<HashMap<String, ExerciseResponse>>>,
    pub assets: Arc<RwLock<HashMap<String, StoredAsset>>>,
    pub openai: Option<OpenAI>,
    pub config: EngineConfig,
}

impl AppState {
    /// Build state from env: load config, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env().unwrap_or_default();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "exercise_engine", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
        } else {
            info!(target: "exercise_engine", "OpenAI disabled (no OPENAI_API_KEY). Using local fallbacks.");
        }
        Self::with_config(config, openai)
    }

    pub fn with_config(config: EngineConfig, openai: Option<OpenAI>) -> Self {
        Self {
            exercises: Arc::new(RwLock::new(HashMap::new())),
            responses: Arc::new(RwLock::new(HashMap::new())),
            assets: Arc::new(RwLock::new(HashMap::new())),
            openai,
            config,
        }
    }

    pub async fn asset(&self, id: &AssetId) -> Option<StoredAsset> {
        self.assets.read().await.get(&id.0).cloned()
    }

    /// Create a PAUSED response for a respondent. Only locked exercises can be assigned.
    #[instrument(level = "info", skip(self), fields(%exercise_id, %milestone_tracker_id))]
    pub async fn assign_response(&self, exercise_id: &str, milestone_tracker_id: &str) -> Result<ExerciseResponse> {
        let exercise = self.get_exercise(exercise_id).await?;
        if LockState::of(&exercise) != LockState::Locked {
            return Err(EngineError::NotLocked);
        }
        let response = ExerciseResponse::mirror(
            Uuid::new_v4().to_string(),
            exercise_id.to_string(),
            milestone_tracker_id.to_string(),
            &exercise,
        );
        self.responses.write().await.insert(response.id.clone(), response.clone());
        info!(target: "response", id = %response.id, "Response assigned");
        Ok(response)
    }

    pub async fn responses_for(&self, exercise_id: &str) -> Vec<ExerciseResponse> {
        self.responses
            .read()
            .await
            .values()
            .filter(|r| r.exercise_id == exercise_id)
            .cloned()
            .collect()
    }

    /// The authored definition of the tool named `unique_name`, from whichever exercise holds it.
    pub async fn authored_tool(&self, unique_name: &str) -> Option<Tool> {
        self.exercises
            .read()
            .await
            .values()
            .flat_map(|e| e.pages.iter())
            .flat_map(|p| p.tools.iter())
            .find(|t| t.unique_name == unique_name)
            .cloned()
    }

    /// Merge client-sent answers into the stored record. Only answer slots are taken from the
    /// client, matched by page and `uniqueName`; pages, tool definitions and unknown names are ignored.
    async fn store_answers(&self, incoming: &ExerciseResponse, complete: bool) -> Result<ExerciseResponse> {
        let mut responses = self.responses.write().await;
        let stored = responses
            .get_mut(&incoming.id)
            .ok_or_else(|| EngineError::NotFound(format!("response {}", incoming.id)))?;
        if stored.is_completed() {
            return Err(if complete { EngineError::AlreadySubmitted } else { EngineError::ResponseCompleted });
        }
        for (p, page) in stored.pages.iter_mut().enumerate() {
            let Some(sent) = incoming.pages.get(p) else { continue };
            for tool in &mut page.tools {
                let Some(answer) = sent.tools.iter().find(|t| t.tool.unique_name == tool.tool.unique_name) else {
                    continue;
                };
                tool.response = answer.response.clone();
                tool.messages = answer.messages.clone();
                tool.chat_initiated = answer.chat_initiated;
            }
        }
        stored.details = incoming.details.clone();
        if complete {
            stored.status = ResponseStatus::Completed;
        }
        Ok(stored.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExerciseApi for AppState {
    #[instrument(level = "info", skip(self))]
    async fn create_exercise(&self, activity_id: &str) -> Result<Exercise> {
        let exercise = Exercise {
            id: Some(Uuid::new_v4().to_string()),
            activity_id: Some(activity_id.to_string()),
            ..Exercise::draft()
        };
        let id = exercise.id.clone().unwrap_or_default();
        self.exercises.write().await.insert(id.clone(), exercise.clone());
        info!(target: "exercise", %id, "Exercise created");
        Ok(exercise)
    }

    async fn get_exercise(&self, id: &str) -> Result<Exercise> {
        self.exercises
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("exercise {id}")))
    }

    #[instrument(level = "info", skip(self, exercise), fields(id = ?exercise.id, pages = exercise.pages.len()))]
    async fn save_exercise(&self, exercise: &Exercise) -> Result<Exercise> {
        let mut exercises = self.exercises.write().await;
        let mut incoming = exercise.clone();
        match incoming.id.clone() {
            Some(id) => {
                let stored = exercises
                    .get(&id)
                    .ok_or_else(|| EngineError::NotFound(format!("exercise {id}")))?;
                stored.ensure_unlocked()?;
                incoming.is_locked = stored.is_locked;
                if incoming.activity_id.is_none() {
                    incoming.activity_id = stored.activity_id.clone();
                }
            }
            None => {
                incoming.id = Some(Uuid::new_v4().to_string());
                incoming.is_locked = false;
            }
        }
        incoming.normalize();
        let id = incoming.id.clone().unwrap_or_default();
        exercises.insert(id, incoming.clone());
        Ok(incoming)
    }

    #[instrument(level = "info", skip(self))]
    async fn lock_exercise(&self, id: &str) -> Result<bool> {
        let mut exercises = self.exercises.write().await;
        let exercise = exercises
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("exercise {id}")))?;
        match lock::apply(exercise, LockEvent::Lock) {
            Ok(()) => {
                info!(target: "exercise", %id, "Exercise locked");
                Ok(true)
            }
            Err(e) => {
                warn!(target: "exercise", %id, error = %e, "Lock refused");
                Ok(false)
            }
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn unlock_exercise(&self, id: &str) -> Result<bool> {
        {
            let mut exercises = self.exercises.write().await;
            let exercise = exercises
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(format!("exercise {id}")))?;
            if let Err(e) = lock::apply(exercise, LockEvent::Unlock) {
                warn!(target: "exercise", %id, error = %e, "Unlock refused");
                return Ok(false);
            }
        }
        let mut responses = self.responses.write().await;
        let before = responses.len();
        responses.retain(|_, r| r.exercise_id != id);
        warn!(target: "exercise", %id, discarded = before - responses.len(), "Exercise unlocked; responses discarded");
        Ok(true)
    }

    async fn get_response(&self, id: &str) -> Result<ExerciseResponse> {
        self.responses
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("response {id}")))
    }

    #[instrument(level = "debug", skip(self, response), fields(id = %response.id))]
    async fn save_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse> {
        self.store_answers(response, false).await
    }

    #[instrument(level = "info", skip(self, response), fields(id = %response.id))]
    async fn submit_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse> {
        let out = self.store_answers(response, true).await?;
        info!(target: "response", id = %out.id, "Response submitted");
        Ok(out)
    }
}

#[async_trait]
impl ConversationService for AppState {
    async fn send_chat_turn(&self, tool: &ResponseTool) -> Result<ChatTurnReply> {
        do_chat_turn(self, tool).await
    }

    async fn describe_image(&self, asset: &AssetId) -> Result<Option<String>> {
        do_describe_image(self, asset).await
    }

    async fn enhance_text(&self, keyword: &str, context_id: &str, current_text: &str) -> Result<String> {
        Ok(do_enhance_text(self, keyword, context_id, current_text).await)
    }
}

#[async_trait]
impl AssetStore for AppState {
    #[instrument(level = "info", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload_asset(&self, bytes: Vec<u8>, content_type: &str) -> Result<AssetId> {
        let id = Uuid::new_v4().to_string();
        self.assets.write().await.insert(
            id.clone(),
            StoredAsset { content_type: content_type.to_string(), bytes },
        );
        Ok(AssetId(id))
    }
}
