//! Exercise engine: authored exercises made of pages and typed tools, respondent answers
//! with save/submit and autosave, and a turn-limited conversational tool.
//!
//! `editor::ExerciseEditor` and `session::ResponseSession` are the two editing contexts.
//! Both talk to a backend through the seams in `service`; `state::AppState` is the
//! in-memory backend and `client::RemoteApi` reaches one served by `routes` over HTTP.

pub mod autosave;
pub mod chat;
pub mod client;
pub mod config;
pub mod document;
pub mod domain;
pub mod editor;
pub mod error;
pub mod lock;
pub mod logic;
pub mod openai;
pub mod protocol;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod tool;
pub mod util;

pub use error::{EngineError, ErrorKind, Result};
