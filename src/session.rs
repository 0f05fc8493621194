//! Respondent editing context for one `ExerciseResponse`.
//!
//! PAUSED --submit--> COMPLETED. While PAUSED the respondent mutates answers locally; `save`
//! (explicit or via autosave) pushes the whole document and adopts the server echo. Once
//! COMPLETED every mutation is refused before any network call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::autosave::{Autosave, Flush};
use crate::chat::TurnPhase;
use crate::config::AutosaveConfig;
use crate::domain::{ChatMessage, ExerciseResponse, ResponseStatus, ResponseTool};
use crate::error::{EngineError, Result};
use crate::service::{ExerciseApi, Services};
use crate::tool::{self, Interaction, ResponseShape};

/// New value for a tool's answer slot.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolValue {
    Response(Option<String>),
    /// Replaces the transcript and marks the chat as started.
    ChatMessages(Vec<ChatMessage>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    /// Nothing was sent; the response was already COMPLETED.
    AlreadySubmitted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageProgress {
    pub index: usize,
    pub answered: usize,
    pub total: usize,
}

pub struct ResponseSession {
    doc: Arc<Mutex<Local>>,
    services: Services,
    autosave: Autosave,
}

/// The working copy plus a revision counter. Each answer slot remembers the revision of its
/// last local edit so a save echo never overwrites input made while that save was in flight.
struct Local {
    doc: ExerciseResponse,
    revision: u64,
    edited: HashMap<(usize, String), u64>,
}

impl Local {
    fn new(doc: ExerciseResponse) -> Self {
        Self { doc, revision: 0, edited: HashMap::new() }
    }

    fn touch(&mut self, page: usize, unique_name: &str) {
        self.revision += 1;
        self.edited.insert((page, unique_name.to_string()), self.revision);
    }

    fn edited_after(&self, page: usize, unique_name: &str, since: u64) -> bool {
        self.edited
            .get(&(page, unique_name.to_string()))
            .is_some_and(|rev| *rev > since)
    }
}

fn ensure_editable(doc: &ExerciseResponse) -> Result<()> {
    if doc.is_completed() {
        return Err(EngineError::ResponseCompleted);
    }
    Ok(())
}

fn tool_mut<'a>(doc: &'a mut ExerciseResponse, page: usize, unique_name: &str) -> Result<&'a mut ResponseTool> {
    if page >= doc.pages.len() {
        return Err(EngineError::NoSuchPage(page));
    }
    doc.tool_mut(page, unique_name).ok_or_else(|| EngineError::UnknownTool {
        page,
        name: unique_name.to_string(),
    })
}

/// Replace local state with the echo of the save snapshotted at revision `since`.
/// Answer slots edited after that point, and chat turns still in flight, keep their local value.
fn adopt_echo(local: &mut Local, echoed: ExerciseResponse, since: u64) {
    let mut newer: Vec<(usize, ResponseTool)> = Vec::new();
    for (p, page) in local.doc.pages.iter().enumerate() {
        for t in &page.tools {
            if t.turn_phase == TurnPhase::Provisional || local.edited_after(p, &t.tool.unique_name, since) {
                newer.push((p, t.clone()));
            }
        }
    }

    local.doc = echoed;

    for (page, mine) in newer {
        let Some(t) = local.doc.tool_mut(page, &mine.tool.unique_name) else { continue };
        t.response = mine.response;
        t.messages = mine.messages;
        t.chat_initiated = mine.chat_initiated;
        t.turn_phase = mine.turn_phase;
    }
    local.edited.retain(|_, rev| *rev > since);
}

/// Push the current document and adopt the echo. Shared by explicit saves and autosave.
/// A backend that reports the response as already submitted turns the local copy read-only.
async fn flush(local: &Mutex<Local>, api: &dyn ExerciseApi) -> Result<()> {
    let (snapshot, since) = {
        let l = local.lock().await;
        ensure_editable(&l.doc)?;
        (l.doc.clone(), l.revision)
    };
    let echoed = match api.save_response(&snapshot).await {
        Ok(echoed) => echoed,
        Err(EngineError::ResponseCompleted | EngineError::AlreadySubmitted) => {
            local.lock().await.doc.status = ResponseStatus::Completed;
            info!(target: "response", id = %snapshot.id, "Response was submitted elsewhere; now read-only");
            return Err(EngineError::ResponseCompleted);
        }
        Err(e) => return Err(e),
    };
    let mut l = local.lock().await;
    if l.doc.is_completed() {
        // A submit landed while this save was in flight; COMPLETED stays.
        return Ok(());
    }
    adopt_echo(&mut l, echoed, since);
    Ok(())
}

impl ResponseSession {
    #[instrument(level = "info", skip(services, autosave))]
    pub async fn open(services: Services, response_id: &str, autosave: &AutosaveConfig) -> Result<Self> {
        let doc = services.api.get_response(response_id).await?;
        Ok(Self::from_document(services, doc, autosave).await)
    }

    /// Wrap a loaded document; autosave starts if configured and the response is still PAUSED.
    pub async fn from_document(services: Services, doc: ExerciseResponse, autosave: &AutosaveConfig) -> Self {
        let paused = !doc.is_completed();
        let mut session = Self {
            doc: Arc::new(Mutex::new(Local::new(doc))),
            services,
            autosave: Autosave::new(autosave.period()),
        };
        if autosave.enabled && paused {
            session.arm_autosave();
        }
        session
    }

    fn arm_autosave(&mut self) {
        let weak = Arc::downgrade(&self.doc);
        let api = self.services.api.clone();
        self.autosave.start(move || {
            let weak = weak.clone();
            let api = api.clone();
            async move {
                let Some(doc) = weak.upgrade() else {
                    return Ok(Flush::Stop);
                };
                match flush(&doc, api.as_ref()).await {
                    Ok(()) => Ok(Flush::Continue),
                    Err(EngineError::ResponseCompleted) => Ok(Flush::Stop),
                    Err(EngineError::NotFound(what)) => {
                        warn!(target: "autosave", %what, "Response is gone from the backend; autosave stopped");
                        Ok(Flush::Stop)
                    }
                    Err(e) => Err(e),
                }
            }
        });
    }

    pub async fn snapshot(&self) -> ExerciseResponse {
        self.doc.lock().await.doc.clone()
    }

    pub async fn status(&self) -> ResponseStatus {
        self.doc.lock().await.doc.status
    }

    pub fn autosave_enabled(&self) -> bool {
        self.autosave.is_running()
    }

    /// Toggling on re-arms the timer from zero; toggling off cancels it outright.
    pub async fn set_autosave(&mut self, enabled: bool) {
        if enabled && !self.doc.lock().await.doc.is_completed() {
            self.arm_autosave();
        } else {
            self.autosave.stop();
        }
    }

    /// Local-only overwrite of one answer slot, located by `unique_name` on `page`.
    /// Scalar values are checked against the tool contract; transcripts only fit chat tools.
    pub async fn set_tool_response(&self, page: usize, unique_name: &str, value: ToolValue) -> Result<()> {
        let mut l = self.doc.lock().await;
        ensure_editable(&l.doc)?;
        let t = tool_mut(&mut l.doc, page, unique_name)?;
        match value {
            ToolValue::Response(response) => t.response = tool::validate_response(t, response)?,
            ToolValue::ChatMessages(messages) => {
                if tool::shape(&t.tool.kind) != ResponseShape::Conversation {
                    return Err(EngineError::InteractionMismatch(t.tool.kind.label().to_string()));
                }
                t.messages = messages;
                t.chat_initiated = true;
            }
        }
        l.touch(page, unique_name);
        Ok(())
    }

    /// Map a raw interaction through the tool contract, then store it.
    pub async fn answer(&self, page: usize, unique_name: &str, interaction: Interaction) -> Result<()> {
        let mut l = self.doc.lock().await;
        ensure_editable(&l.doc)?;
        let t = tool_mut(&mut l.doc, page, unique_name)?;
        t.response = tool::apply(t, interaction)?;
        l.touch(page, unique_name);
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    pub async fn save(&self) -> Result<()> {
        flush(&self.doc, self.services.api.as_ref()).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        let snapshot = {
            let l = self.doc.lock().await;
            if l.doc.is_completed() {
                info!(target: "response", id = %l.doc.id, "Submit ignored: already submitted");
                return Ok(SubmitOutcome::AlreadySubmitted);
            }
            l.doc.clone()
        };
        match self.services.api.submit_response(&snapshot).await {
            Ok(done) => {
                self.doc.lock().await.doc = done;
                self.autosave.stop();
                info!(target: "response", id = %snapshot.id, "Response submitted");
                Ok(SubmitOutcome::Submitted)
            }
            Err(EngineError::AlreadySubmitted) => {
                self.doc.lock().await.doc.status = ResponseStatus::Completed;
                self.autosave.stop();
                Ok(SubmitOutcome::AlreadySubmitted)
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the conversation service for the opening turns of a chat tool.
    #[instrument(level = "info", skip(self))]
    pub async fn initiate_chat(&self, page: usize, unique_name: &str) -> Result<()> {
        let tool = {
            let mut l = self.doc.lock().await;
            ensure_editable(&l.doc)?;
            let t = tool_mut(&mut l.doc, page, unique_name)?;
            t.begin_initiation()?;
            let tool = t.clone();
            l.touch(page, unique_name);
            tool
        };
        let result = self.services.conversation.send_chat_turn(&tool).await;
        let mut l = self.doc.lock().await;
        ensure_editable(&l.doc)?;
        let t = tool_mut(&mut l.doc, page, unique_name)?;
        let outcome = match result {
            Ok(reply) => {
                t.complete_initiation(reply.messages);
                debug!(target: "chat", %unique_name, turns = t.messages.len(), "Chat initiated");
                Ok(())
            }
            Err(e) => {
                t.abandon_initiation();
                warn!(target: "chat", %unique_name, error = %e, "Chat initiation failed");
                Err(e)
            }
        };
        l.touch(page, unique_name);
        outcome
    }

    /// Optimistically append the respondent's message, then adopt the service transcript.
    #[instrument(level = "info", skip(self, content), fields(content_len = content.len()))]
    pub async fn send_chat_message(&self, page: usize, unique_name: &str, content: &str) -> Result<()> {
        let tool = {
            let mut l = self.doc.lock().await;
            ensure_editable(&l.doc)?;
            let t = tool_mut(&mut l.doc, page, unique_name)?;
            t.begin_turn(content)?;
            let tool = t.clone();
            l.touch(page, unique_name);
            tool
        };
        let result = self.services.conversation.send_chat_turn(&tool).await;
        let mut l = self.doc.lock().await;
        ensure_editable(&l.doc)?;
        let t = tool_mut(&mut l.doc, page, unique_name)?;
        let outcome = match result {
            Ok(reply) => {
                t.confirm_turn(reply.messages);
                Ok(())
            }
            Err(e) => {
                t.abandon_turn();
                warn!(target: "chat", %unique_name, error = %e, "Chat turn failed; message withdrawn");
                Err(e)
            }
        };
        l.touch(page, unique_name);
        outcome
    }

    pub async fn can_send_chat(&self, page: usize, unique_name: &str) -> bool {
        let l = self.doc.lock().await;
        !l.doc.is_completed() && l.doc.tool(page, unique_name).is_some_and(ResponseTool::can_send)
    }

    pub async fn progress(&self) -> Vec<PageProgress> {
        let l = self.doc.lock().await;
        l.doc.pages
            .iter()
            .map(|p| {
                let supported = p.tools.iter().filter(|t| t.tool.kind.tool_type().is_some());
                let (answered, total) = supported.fold((0, 0), |(a, n), t| (a + tool::is_answered(t) as usize, n + 1));
                PageProgress { index: p.index, answered, total }
            })
            .collect()
    }

    /// Leave the editing context. In-flight requests may still complete; their results are dropped.
    pub fn close(mut self) {
        self.autosave.stop();
    }
}
