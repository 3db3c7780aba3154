//! Hatch storage crate - SQLite persistence for ideas, profiles and sessions.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! repositories the HTTP layer uses to look up callers, check entitlement
//! and read or write ideas.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{
    idea_limit_reached, IdeaRepository, NewIdea, ProfileRepository, SessionRepository,
};
