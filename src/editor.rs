//! Authoring context for one `Exercise`: document operations, the active page pointer,
//! persistence, lock/unlock and page assets.
//!
//! Validation and lock refusals happen here before any request is made. Explicit
//! save/lock/unlock failures are returned to the caller with local state unchanged.

use tracing::{info, instrument, warn};

use crate::config::AuthoringDefaults;
use crate::document::{PagePatch, ToolField};
use crate::domain::{AssetId, Exercise, Page, Tool, ToolType};
use crate::error::{EngineError, Result};
use crate::lock::{self, LockConfirmation, LockEvent, LockPrompt, LockState, UnlockConfirmation, UnlockPrompt};
use crate::service::Services;

pub struct ExerciseEditor {
    exercise: Exercise,
    active_page: usize,
    dirty: bool,
    services: Services,
    defaults: AuthoringDefaults,
}

impl ExerciseEditor {
    pub fn new(services: Services, mut exercise: Exercise, defaults: AuthoringDefaults) -> Self {
        exercise.normalize();
        Self { exercise, active_page: 0, dirty: false, services, defaults }
    }

    #[instrument(level = "info", skip(services, defaults))]
    pub async fn create(services: Services, activity_id: &str, defaults: AuthoringDefaults) -> Result<Self> {
        let exercise = services.api.create_exercise(activity_id).await?;
        Ok(Self::new(services, exercise, defaults))
    }

    #[instrument(level = "info", skip(services, defaults))]
    pub async fn open(services: Services, id: &str, defaults: AuthoringDefaults) -> Result<Self> {
        let exercise = services.api.get_exercise(id).await?;
        Ok(Self::new(services, exercise, defaults))
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn active_page(&self) -> usize {
        self.active_page
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lock_state(&self) -> LockState {
        LockState::of(&self.exercise)
    }

    pub fn select_page(&mut self, page: usize) -> Result<()> {
        if page >= self.exercise.pages.len() {
            return Err(EngineError::NoSuchPage(page));
        }
        self.active_page = page;
        Ok(())
    }

    fn clamp_active(&mut self) {
        let last = self.exercise.pages.len().saturating_sub(1);
        self.active_page = self.active_page.min(last);
    }

    fn edit<T>(&mut self, op: impl FnOnce(&mut Exercise) -> Result<T>) -> Result<T> {
        let out = op(&mut self.exercise)?;
        self.dirty = true;
        Ok(out)
    }

    pub fn add_page(&mut self) -> Result<usize> {
        self.edit(Exercise::add_page)
    }

    pub fn delete_page(&mut self, page: usize) -> Result<Page> {
        let removed = self.edit(|ex| ex.delete_page(page)).inspect_err(|e| {
            warn!(target: "exercise", page, error = %e, "Page not deleted");
        })?;
        self.clamp_active();
        Ok(removed)
    }

    pub fn update_page(&mut self, page: usize, patch: PagePatch) -> Result<()> {
        self.edit(|ex| ex.update_page(page, patch))
    }

    pub fn add_tool(&mut self, page: usize, tool_type: ToolType) -> Result<String> {
        let defaults = &self.defaults;
        let exercise = &mut self.exercise;
        let name = exercise.add_tool(page, tool_type, defaults)?;
        self.dirty = true;
        Ok(name)
    }

    pub fn delete_tool(&mut self, page: usize, tool: usize) -> Result<Tool> {
        self.edit(|ex| ex.delete_tool(page, tool))
    }

    pub fn update_tool(&mut self, page: usize, tool: usize, field: ToolField) -> Result<()> {
        self.edit(|ex| ex.update_tool(page, tool, field))
    }

    pub fn reorder_tools(&mut self, page: usize, from: usize, to: usize) -> Result<()> {
        self.edit(|ex| ex.reorder_tools(page, from, to))
    }

    pub fn add_option(&mut self, page: usize, tool: usize, option: String) -> Result<usize> {
        self.edit(|ex| ex.add_option(page, tool, option))
    }

    pub fn update_option(&mut self, page: usize, tool: usize, option: usize, text: String) -> Result<()> {
        self.edit(|ex| ex.update_option(page, tool, option, text))
    }

    pub fn remove_option(&mut self, page: usize, tool: usize, option: usize) -> Result<String> {
        self.edit(|ex| ex.remove_option(page, tool, option)).inspect_err(|e| {
            warn!(target: "exercise", page, tool, error = %e, "Option not removed");
        })
    }

    /// Push the document and adopt the server echo as the new local state.
    #[instrument(level = "info", skip(self), fields(id = ?self.exercise.id))]
    pub async fn save(&mut self) -> Result<()> {
        self.exercise.ensure_unlocked()?;
        let echoed = self.services.api.save_exercise(&self.exercise).await?;
        self.exercise = echoed;
        self.dirty = false;
        self.clamp_active();
        Ok(())
    }

    pub fn request_lock(&self) -> Result<LockPrompt> {
        lock::request_lock(&self.exercise)
    }

    /// Pending edits are saved first so the locked content is what the author sees.
    #[instrument(level = "info", skip(self, confirmation), fields(id = ?self.exercise.id))]
    pub async fn lock(&mut self, confirmation: LockConfirmation) -> Result<()> {
        lock::check_lock(&self.exercise, &confirmation)?;
        if self.dirty {
            self.save().await?;
        }
        let id = self.exercise.id.clone().ok_or(EngineError::NotPersisted)?;
        if !self.services.api.lock_exercise(&id).await? {
            return Err(EngineError::Service(format!("backend refused to lock exercise {id}")));
        }
        lock::apply(&mut self.exercise, LockEvent::Lock)?;
        info!(target: "exercise", %id, "Exercise locked");
        Ok(())
    }

    pub fn request_unlock(&self) -> Result<UnlockPrompt> {
        lock::request_unlock(&self.exercise)
    }

    #[instrument(level = "info", skip(self, confirmation), fields(id = ?self.exercise.id))]
    pub async fn unlock(&mut self, confirmation: UnlockConfirmation) -> Result<()> {
        lock::check_unlock(&self.exercise, &confirmation)?;
        let id = self.exercise.id.clone().ok_or(EngineError::NotPersisted)?;
        if !self.services.api.unlock_exercise(&id).await? {
            return Err(EngineError::Service(format!("backend refused to unlock exercise {id}")));
        }
        lock::apply(&mut self.exercise, LockEvent::Unlock)?;
        warn!(target: "exercise", %id, "Exercise unlocked; participant responses discarded");
        Ok(())
    }

    fn ensure_page(&self, page: usize) -> Result<()> {
        self.exercise.ensure_unlocked()?;
        if page >= self.exercise.pages.len() {
            return Err(EngineError::NoSuchPage(page));
        }
        Ok(())
    }

    /// Upload an image and attach it to `page`. A failed description leaves the slot empty.
    #[instrument(level = "info", skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn add_display_image(&mut self, page: usize, bytes: Vec<u8>, content_type: &str) -> Result<AssetId> {
        self.ensure_page(page)?;
        let asset = self.services.assets.upload_asset(bytes, content_type).await?;
        let description = match self.services.conversation.describe_image(&asset).await {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "exercise", %asset, error = %e, "Image description unavailable");
                None
            }
        };
        let id = asset.clone();
        self.edit(|ex| ex.add_display_image(page, id, description))?;
        Ok(asset)
    }

    pub fn remove_display_image(&mut self, page: usize, image: usize) -> Result<AssetId> {
        self.edit(|ex| ex.remove_display_image(page, image))
    }

    #[instrument(level = "info", skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn add_file(&mut self, page: usize, bytes: Vec<u8>, content_type: &str) -> Result<AssetId> {
        self.ensure_page(page)?;
        let asset = self.services.assets.upload_asset(bytes, content_type).await?;
        let id = asset.clone();
        self.edit(|ex| ex.add_file(page, id))?;
        Ok(asset)
    }

    pub fn remove_file(&mut self, page: usize, file: usize) -> Result<AssetId> {
        self.edit(|ex| ex.remove_file(page, file))
    }

    /// Suggested rewrite of `current_text`; the caller decides whether to apply it.
    pub async fn enhance_text(&self, keyword: &str, current_text: &str) -> Result<String> {
        let context_id = self.exercise.id.as_deref().unwrap_or("draft");
        self.services.conversation.enhance_text(keyword, context_id, current_text).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::service::ExerciseApi;
    use crate::state::AppState;

    fn backend() -> Arc<AppState> {
        Arc::new(AppState::with_config(EngineConfig::default(), None))
    }

    async fn editor(backend: &Arc<AppState>) -> ExerciseEditor {
        ExerciseEditor::create(Services::from_backend(backend.clone()), "act-1", AuthoringDefaults::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn deleting_pages_clamps_the_active_pointer() {
        let mut ed = editor(&backend()).await;
        assert!(matches!(ed.delete_page(0), Err(EngineError::LastPage)));
        assert_eq!(ed.exercise().pages.len(), 1);

        ed.add_page().unwrap();
        ed.add_page().unwrap();
        ed.select_page(2).unwrap();
        ed.delete_page(2).unwrap();
        assert_eq!(ed.active_page(), 1);
        assert!(matches!(ed.select_page(5), Err(EngineError::NoSuchPage(5))));
    }

    #[tokio::test]
    async fn save_adopts_the_echo_and_clears_dirty() {
        let be = backend();
        let mut ed = editor(&be).await;
        let name = ed.add_tool(0, ToolType::McqSingle).unwrap();
        assert!(ed.is_dirty());
        ed.save().await.unwrap();
        assert!(!ed.is_dirty());

        let stored = be.get_exercise(ed.exercise().id.as_deref().unwrap()).await.unwrap();
        assert_eq!(&stored, ed.exercise());
        assert_eq!(stored.pages[0].tools[0].unique_name, name);
        assert_eq!(stored.pages[0].tools[0].kind.options().map(<[String]>::len), Some(2));
        assert!(matches!(ed.remove_option(0, 0, 1), Err(EngineError::TooFewOptions)));
    }

    #[tokio::test]
    async fn lock_saves_pending_edits_and_unlock_discards_responses() {
        let be = backend();
        let mut ed = editor(&be).await;
        ed.add_tool(0, ToolType::Rating).unwrap();
        let before = ed.exercise().pages.clone();

        let prompt = ed.request_lock().unwrap();
        assert_eq!(prompt.severity, lock::Severity::Caution);
        ed.lock(prompt.confirm()).await.unwrap();
        assert_eq!(ed.lock_state(), LockState::Locked);
        assert!(!ed.is_dirty());

        let id = ed.exercise().id.clone().unwrap();
        assert!(be.get_exercise(&id).await.unwrap().is_locked);
        be.assign_response(&id, "tracker").await.unwrap();

        assert!(matches!(ed.add_page(), Err(EngineError::ExerciseLocked)));
        assert!(matches!(ed.save().await, Err(EngineError::ExerciseLocked)));
        assert!(matches!(ed.request_lock(), Err(EngineError::AlreadyLocked)));

        let prompt = ed.request_unlock().unwrap();
        assert_eq!(prompt.severity, lock::Severity::Irreversible);
        ed.unlock(prompt.confirm_irreversible()).await.unwrap();
        assert_eq!(ed.lock_state(), LockState::Draft);
        assert_eq!(ed.exercise().pages, before);
        assert!(be.responses_for(&id).await.is_empty());
    }

    #[tokio::test]
    async fn backend_refusal_leaves_local_state_unchanged() {
        let be = backend();
        let mut ed = editor(&be).await;
        let id = ed.exercise().id.clone().unwrap();
        let prompt = ed.request_lock().unwrap();
        be.lock_exercise(&id).await.unwrap();

        assert!(matches!(ed.lock(prompt.confirm()).await, Err(EngineError::Service(_))));
        assert_eq!(ed.lock_state(), LockState::Draft);
    }

    #[tokio::test]
    async fn confirmation_for_another_exercise_is_rejected() {
        let be = backend();
        let mut first = editor(&be).await;
        let second = editor(&be).await;
        let foreign = second.request_lock().unwrap().confirm();
        assert!(matches!(first.lock(foreign).await, Err(EngineError::ConfirmationMismatch(_))));
    }

    #[tokio::test]
    async fn images_upload_with_best_effort_description() {
        let be = backend();
        let mut ed = editor(&be).await;
        let asset = ed.add_display_image(0, vec![0x89, 0x50], "image/png").await.unwrap();
        let page = &ed.exercise().pages[0];
        assert_eq!(page.display_images, vec![asset.clone()]);
        assert_eq!(page.display_image_descriptions, vec![None]);
        assert!(be.asset(&asset).await.is_some());

        ed.add_file(0, b"%PDF".to_vec(), "application/pdf").await.unwrap();
        ed.remove_display_image(0, 0).unwrap();
        assert!(ed.exercise().pages[0].display_image_descriptions.is_empty());
        assert_eq!(ed.exercise().pages[0].files.len(), 1);
        assert!(matches!(ed.add_file(3, vec![], "text/plain").await, Err(EngineError::NoSuchPage(3))));
    }

    #[tokio::test]
    async fn enhancement_is_returned_not_applied() {
        let mut ed = editor(&backend()).await;
        ed.update_page(0, PagePatch { display_text: Some("hi   there".into()), ..Default::default() }).unwrap();
        let suggestion = ed.enhance_text("displayText", "hi   there").await.unwrap();
        assert_eq!(suggestion, "hi there");
        assert_eq!(ed.exercise().pages[0].display_text, "hi   there");
    }
}
