//! Service seams consumed by the editor and the respondent session.
//!
//! `state::AppState` implements all three in-process; `client::RemoteApi` implements them over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AssetId, ChatMessage, Exercise, ExerciseResponse, ResponseTool};
use crate::error::Result;

#[async_trait]
pub trait ExerciseApi: Send + Sync {
    async fn create_exercise(&self, activity_id: &str) -> Result<Exercise>;
    async fn get_exercise(&self, id: &str) -> Result<Exercise>;
    async fn save_exercise(&self, exercise: &Exercise) -> Result<Exercise>;
    async fn lock_exercise(&self, id: &str) -> Result<bool>;
    async fn unlock_exercise(&self, id: &str) -> Result<bool>;
    async fn get_response(&self, id: &str) -> Result<ExerciseResponse>;
    async fn save_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse>;
    async fn submit_response(&self, response: &ExerciseResponse) -> Result<ExerciseResponse>;
}

/// Canonical transcript returned for a chat turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurnReply {
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn send_chat_turn(&self, tool: &ResponseTool) -> Result<ChatTurnReply>;
    /// Best effort; `Ok(None)` when no description could be produced.
    async fn describe_image(&self, asset: &AssetId) -> Result<Option<String>>;
    async fn enhance_text(&self, keyword: &str, context_id: &str, current_text: &str) -> Result<String>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload_asset(&self, bytes: Vec<u8>, content_type: &str) -> Result<AssetId>;
}

/// Handles an editing context needs, cheap to clone into background tasks.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn ExerciseApi>,
    pub conversation: Arc<dyn ConversationService>,
    pub assets: Arc<dyn AssetStore>,
}

impl Services {
    /// One backend serving every seam.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ExerciseApi + ConversationService + AssetStore + 'static,
    {
        Self {
            api: backend.clone(),
            conversation: backend.clone(),
            assets: backend,
        }
    }
}
