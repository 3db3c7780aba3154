//! Application state shared across all route handlers.
//!
//! AppState holds the database, the language-model backends and the
//! Conversation Engine. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use hatch_core::config::HatchConfig;
use hatch_llm::{Relay, TextGenerator, Transcriber};
use hatch_nurture::ConversationEngine;
use hatch_storage::{Database, IdeaRepository, ProfileRepository, SessionRepository};

use crate::conversations::ConversationStore;

/// Shared application state.
///
/// All fields use `Arc` (or are Arc-backed) for cheap cloning across
/// handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup.
    pub config: Arc<HatchConfig>,
    /// SQLite database for ideas, profiles and sessions.
    pub database: Arc<Database>,
    /// Text-generation backend, used directly for tagging.
    pub generator: Arc<dyn TextGenerator>,
    /// Speech-to-text backend.
    pub transcriber: Arc<dyn Transcriber>,
    /// Conversation Engine sharing the generator.
    pub engine: ConversationEngine,
    /// Server-held conversations.
    pub conversations: ConversationStore,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: HatchConfig,
        database: Database,
        generator: Arc<dyn TextGenerator>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let relay = Relay::from_config(Arc::clone(&generator), &config.llm);
        let engine = ConversationEngine::new(relay, config.nurture.clone());
        Self {
            config: Arc::new(config),
            database: Arc::new(database),
            generator,
            transcriber,
            engine,
            conversations: ConversationStore::new(),
            start_time: Instant::now(),
        }
    }

    pub fn ideas(&self) -> IdeaRepository {
        IdeaRepository::new(Arc::clone(&self.database))
    }

    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository::new(Arc::clone(&self.database))
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(Arc::clone(&self.database))
    }
}
