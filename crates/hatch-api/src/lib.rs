//! Hatch API crate - axum HTTP server, route handlers, chunked streaming.
//!
//! Provides the REST API for capturing ideas, nurturing them through the
//! Conversation Engine, exporting generated documents, and transcribing
//! voice notes.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
