//! Lock/unlock state machine for an exercise.
//!
//! DRAFT --lock--> LOCKED --unlock--> DRAFT. Both transitions need a confirmation token that can
//! only be obtained from the matching prompt, so an unconfirmed call cannot be expressed.
//! Unlocking discards every response tied to the exercise, hence its own, stronger prompt.

use crate::domain::Exercise;
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Draft,
    Locked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockEvent {
    Lock,
    Unlock,
}

impl LockState {
    pub fn of(exercise: &Exercise) -> Self {
        if exercise.is_locked { LockState::Locked } else { LockState::Draft }
    }

    pub fn transition(self, event: LockEvent) -> Result<LockState> {
        match (self, event) {
            (LockState::Draft, LockEvent::Lock) => Ok(LockState::Locked),
            (LockState::Locked, LockEvent::Unlock) => Ok(LockState::Draft),
            (LockState::Locked, LockEvent::Lock) => Err(EngineError::AlreadyLocked),
            (LockState::Draft, LockEvent::Unlock) => Err(EngineError::NotLocked),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Caution,
    /// Loses respondent data; cannot be undone.
    Irreversible,
}

/// What the caller must show before locking.
#[derive(Clone, Debug)]
pub struct LockPrompt {
    pub exercise_id: String,
    pub severity: Severity,
    pub message: String,
}

/// What the caller must show before unlocking.
#[derive(Clone, Debug)]
pub struct UnlockPrompt {
    pub exercise_id: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug)]
pub struct LockConfirmation {
    exercise_id: String,
}

#[derive(Debug)]
pub struct UnlockConfirmation {
    exercise_id: String,
}

impl LockPrompt {
    pub fn confirm(self) -> LockConfirmation {
        LockConfirmation { exercise_id: self.exercise_id }
    }
}

impl UnlockPrompt {
    /// The author's explicit acknowledgement that every participant's progress will be lost.
    pub fn confirm_irreversible(self) -> UnlockConfirmation {
        UnlockConfirmation { exercise_id: self.exercise_id }
    }
}

fn persisted_id(exercise: &Exercise) -> Result<&str> {
    exercise.id.as_deref().ok_or(EngineError::NotPersisted)
}

pub fn request_lock(exercise: &Exercise) -> Result<LockPrompt> {
    LockState::of(exercise).transition(LockEvent::Lock)?;
    let id = persisted_id(exercise)?;
    Ok(LockPrompt {
        exercise_id: id.to_string(),
        severity: Severity::Caution,
        message: "Locking makes this exercise available to participants. Pages and tools can no longer be edited while it is locked.".into(),
    })
}

pub fn request_unlock(exercise: &Exercise) -> Result<UnlockPrompt> {
    LockState::of(exercise).transition(LockEvent::Unlock)?;
    let id = persisted_id(exercise)?;
    Ok(UnlockPrompt {
        exercise_id: id.to_string(),
        severity: Severity::Irreversible,
        message: "Unlocking permanently deletes every participant response to this exercise. All progress will be lost and cannot be recovered.".into(),
    })
}

/// Validate a lock token against the current document without changing it.
pub fn check_lock(exercise: &Exercise, confirmation: &LockConfirmation) -> Result<()> {
    LockState::of(exercise).transition(LockEvent::Lock)?;
    matches_id(exercise, &confirmation.exercise_id)
}

pub fn check_unlock(exercise: &Exercise, confirmation: &UnlockConfirmation) -> Result<()> {
    LockState::of(exercise).transition(LockEvent::Unlock)?;
    matches_id(exercise, &confirmation.exercise_id)
}

fn matches_id(exercise: &Exercise, confirmed: &str) -> Result<()> {
    if persisted_id(exercise)? == confirmed {
        Ok(())
    } else {
        Err(EngineError::ConfirmationMismatch(confirmed.to_string()))
    }
}

/// Flip the flag. Content is untouched in both directions.
pub fn apply(exercise: &mut Exercise, event: LockEvent) -> Result<()> {
    let next = LockState::of(exercise).transition(event)?;
    exercise.is_locked = next == LockState::Locked;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(id: &str) -> Exercise {
        Exercise { id: Some(id.into()), ..Exercise::draft() }
    }

    #[test]
    fn only_two_transitions_exist() {
        assert_eq!(LockState::Draft.transition(LockEvent::Lock).unwrap(), LockState::Locked);
        assert_eq!(LockState::Locked.transition(LockEvent::Unlock).unwrap(), LockState::Draft);
        assert!(matches!(LockState::Locked.transition(LockEvent::Lock), Err(EngineError::AlreadyLocked)));
        assert!(matches!(LockState::Draft.transition(LockEvent::Unlock), Err(EngineError::NotLocked)));
    }

    #[test]
    fn lock_requires_persisted_id() {
        assert!(matches!(request_lock(&Exercise::draft()), Err(EngineError::NotPersisted)));
        let prompt = request_lock(&saved("e1")).unwrap();
        assert_eq!(prompt.severity, Severity::Caution);
    }

    #[test]
    fn unlock_prompt_is_irreversible_and_distinct() {
        let mut ex = saved("e1");
        apply(&mut ex, LockEvent::Lock).unwrap();
        let prompt = request_unlock(&ex).unwrap();
        assert_eq!(prompt.severity, Severity::Irreversible);
        assert!(prompt.message.contains("deletes every participant response"));
        let token = prompt.confirm_irreversible();
        check_unlock(&ex, &token).unwrap();
    }

    #[test]
    fn tokens_are_bound_to_their_exercise() {
        let token = request_lock(&saved("e1")).unwrap().confirm();
        assert!(matches!(check_lock(&saved("e2"), &token), Err(EngineError::ConfirmationMismatch(_))));
    }

    #[test]
    fn lock_then_unlock_leaves_content_identical() {
        let mut ex = saved("e1");
        ex.add_page().unwrap();
        ex.pages[1].display_text = "<p>body</p>".into();
        let before = serde_json::to_string(&ex.pages).unwrap();
        apply(&mut ex, LockEvent::Lock).unwrap();
        assert_eq!(LockState::of(&ex), LockState::Locked);
        apply(&mut ex, LockEvent::Unlock).unwrap();
        assert_eq!(LockState::of(&ex), LockState::Draft);
        assert_eq!(serde_json::to_string(&ex.pages).unwrap(), before);
    }
}
