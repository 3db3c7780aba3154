//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path/body parameters via axum extractors, checks
//! the caller's entitlement and ownership, and returns JSON or a chunked
//! text stream.

use std::io;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use hatch_core::types::{Entitlement, Idea, Rating};
use hatch_llm::enrich::{generate_category, generate_tags};
use hatch_llm::Fragments;
use hatch_nurture::{ConversationSnapshot, ConversationState, OutputFormat, Turn};
use hatch_storage::{idea_limit_reached, NewIdea};

use crate::auth::bearer_token;
use crate::conversations::ConversationKey;
use crate::error::ApiError;
use crate::state::AppState;

const STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";
const DEFAULT_AUDIO_MIME: &str = "audio/webm";

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateIdeaRequest {
    pub text: String,
    pub excitement: u8,
    pub difficulty: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurtureRequest {
    pub idea_id: Option<Uuid>,
    pub idea_text: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutputRequest {
    pub idea_id: Option<Uuid>,
    pub idea_text: String,
    pub format: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdeaListResponse {
    pub ideas: Vec<Idea>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateOutputResponse {
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

// =============================================================================
// Helpers
// =============================================================================

fn require_premium(entitlement: &Entitlement) -> Result<(), ApiError> {
    if entitlement.premium {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Premium subscription required".to_string(),
        ))
    }
}

/// Load an idea and check the caller owns it.
fn owned_idea(state: &AppState, entitlement: &Entitlement, id: Uuid) -> Result<Idea, ApiError> {
    let idea = state
        .ideas()
        .find_by_id(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Idea {} not found", id)))?;
    if !idea.is_owned_by(entitlement.user_id) {
        return Err(ApiError::Forbidden(
            "You do not have permission to access this idea".to_string(),
        ));
    }
    Ok(idea)
}

fn chunked_text(rx: mpsc::Receiver<Result<String, io::Error>>) -> Response {
    let mut resp = Body::from_stream(ReceiverStream::new(rx)).into_response();
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(STREAM_CONTENT_TYPE),
    );
    resp.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    resp
}

fn stream_failure(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(format!("upstream stream failed: {}", e))
}

/// Forward relay fragments into a response body. A client disconnect drops
/// `fragments`, which aborts the upstream request.
async fn pump_fragments(mut fragments: Fragments, tx: mpsc::Sender<Result<String, io::Error>>) {
    loop {
        let item = tokio::select! {
            item = fragments.next_fragment() => item,
            _ = tx.closed() => {
                tracing::debug!("Client disconnected from nurture stream");
                return;
            }
        };
        match item {
            Some(Ok(text)) => {
                if tx.send(Ok(text)).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Nurture stream failed after partial output");
                let _ = tx.send(Err(stream_failure(e))).await;
                return;
            }
            None => return,
        }
    }
}

/// Drive a full engine turn, forwarding fragments and then finishing it.
///
/// If the client goes away mid-stream the turn is dropped, which keeps the
/// partial reply and aborts the upstream request.
async fn pump_turn<S>(mut turn: Turn<S>, tx: mpsc::Sender<Result<String, io::Error>>, idea_id: Uuid)
where
    S: std::ops::DerefMut<Target = ConversationState>,
{
    let mut stream_failed = false;
    loop {
        let item = tokio::select! {
            item = turn.next_fragment() => item,
            _ = tx.closed() => {
                tracing::debug!(idea_id = %idea_id, "Client disconnected; turn cancelled");
                return;
            }
        };
        match item {
            Some(Ok(text)) => {
                if tx.send(Ok(text)).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(stream_failure(&e))).await;
                stream_failed = true;
                break;
            }
            None => break,
        }
    }

    // Document generation runs inside `finish`, so the body stays open
    // until it is done and a failure there still reaches the client.
    match turn.finish().await {
        Ok(outcome) => tracing::info!(
            idea_id = %idea_id,
            format = outcome.format.as_str(),
            document_generated = outcome.document_generated,
            "Nurture turn completed"
        ),
        Err(e) => {
            tracing::warn!(idea_id = %idea_id, error = %e, "Nurture turn failed");
            if !stream_failed {
                let _ = tx
                    .send(Err(io::Error::other(format!("nurture turn failed: {}", e))))
                    .await;
            }
        }
    }
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Session
// =============================================================================

/// POST /api/auth/logout - forget the caller's bearer credential.
pub async fn logout(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    state.sessions().revoke(token)?;
    tracing::info!(user_id = %entitlement.user_id, "Session revoked");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Ideas
// =============================================================================

/// POST /api/ideas - capture an idea, tag and categorize it.
pub async fn create_idea(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Json(body): Json<CreateIdeaRequest>,
) -> Result<(StatusCode, Json<Idea>), ApiError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("'text' must not be empty".to_string()));
    }
    let max_len = state.config.ideas.max_text_length;
    if text.chars().count() > max_len {
        return Err(ApiError::BadRequest(format!(
            "'text' exceeds maximum length of {} characters",
            max_len
        )));
    }
    let excitement = Rating::new(body.excitement)?;
    let difficulty = Rating::new(body.difficulty)?;

    // Early exit before spending model calls; the insert enforces the limit.
    let limit = state.config.ideas.free_plan_limit;
    if !entitlement.premium {
        let profile = state
            .profiles()
            .find_by_id(entitlement.user_id)?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;
        if profile.idea_count >= limit {
            return Err(idea_limit_reached(limit).into());
        }
    }

    let backend = state.generator.as_ref();
    let (tags, category) = tokio::join!(generate_tags(backend, text), generate_category(backend, text));

    let idea = state.ideas().insert(
        NewIdea {
            owner_id: entitlement.user_id,
            text: text.to_string(),
            excitement,
            difficulty,
            tags,
            category: Some(category),
        },
        limit,
    )?;
    tracing::info!(idea_id = %idea.id, user_id = %entitlement.user_id, "Idea captured");

    Ok((StatusCode::CREATED, Json(idea)))
}

/// GET /api/ideas - the caller's ideas, newest first.
pub async fn list_ideas(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
) -> Result<Json<IdeaListResponse>, ApiError> {
    let ideas = state.ideas().list_for_owner(entitlement.user_id)?;
    let total = ideas.len();
    Ok(Json(IdeaListResponse { ideas, total }))
}

/// GET /api/ideas/{id}
pub async fn get_idea(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(id): Path<Uuid>,
) -> Result<Json<Idea>, ApiError> {
    Ok(Json(owned_idea(&state, &entitlement, id)?))
}

/// DELETE /api/ideas/{id} - delete an idea and any conversation about it.
pub async fn delete_idea(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    owned_idea(&state, &entitlement, id)?;
    if !state.ideas().delete(id)? {
        return Err(ApiError::NotFound(format!("Idea {} not found", id)));
    }
    state
        .conversations
        .remove(ConversationKey::new(entitlement.user_id, id))?;
    tracing::info!(idea_id = %id, "Idea deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Nurturing
// =============================================================================

/// POST /api/nurture - relay one message without server-held state.
pub async fn nurture_stream(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Json(body): Json<NurtureRequest>,
) -> Result<Response, ApiError> {
    require_premium(&entitlement)?;
    if let Some(idea_id) = body.idea_id {
        owned_idea(&state, &entitlement, idea_id)?;
    }

    let fragments = state
        .engine
        .relay_message(&body.idea_text, &body.message, &entitlement)?;

    let (tx, rx) = mpsc::channel(state.config.llm.relay_buffer.max(1));
    tokio::spawn(pump_fragments(fragments, tx));
    Ok(chunked_text(rx))
}

/// PUT /api/nurture - one-shot document generation.
pub async fn generate_output(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Json(body): Json<GenerateOutputRequest>,
) -> Result<Json<GenerateOutputResponse>, ApiError> {
    require_premium(&entitlement)?;
    if let Some(idea_id) = body.idea_id {
        owned_idea(&state, &entitlement, idea_id)?;
    }
    let format: OutputFormat = body.format.parse()?;
    let context = body.context.unwrap_or_default();

    let output = state
        .engine
        .generate_document(&body.idea_text, format, &context)
        .await?;
    Ok(Json(GenerateOutputResponse { output }))
}

/// POST /api/nurture/{idea_id}/messages - run one engine turn on the
/// server-held conversation, streaming the reply.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(idea_id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> Result<Response, ApiError> {
    require_premium(&entitlement)?;
    let idea = owned_idea(&state, &entitlement, idea_id)?;

    let guard = state
        .conversations
        .begin_turn(ConversationKey::new(entitlement.user_id, idea_id))?;
    let turn = state
        .engine
        .submit_message(guard, &idea.text, &body.message, &entitlement)?;

    let (tx, rx) = mpsc::channel(state.config.llm.relay_buffer.max(1));
    tokio::spawn(pump_turn(turn, tx, idea_id));
    Ok(chunked_text(rx))
}

/// GET /api/nurture/{idea_id} - conversation snapshot.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(idea_id): Path<Uuid>,
) -> Result<Json<ConversationSnapshot>, ApiError> {
    require_premium(&entitlement)?;
    owned_idea(&state, &entitlement, idea_id)?;

    let key = ConversationKey::new(entitlement.user_id, idea_id);
    let snapshot = match state.conversations.get(key)? {
        Some(conversation) => {
            let guard = conversation
                .try_lock()
                .map_err(|_| ApiError::Conflict("A message is still being processed".to_string()))?;
            guard.snapshot()
        }
        None => ConversationState::new().snapshot(),
    };
    Ok(Json(snapshot))
}

/// DELETE /api/nurture/{idea_id} - discard the server-held conversation.
pub async fn reset_conversation(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(idea_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_premium(&entitlement)?;
    owned_idea(&state, &entitlement, idea_id)?;
    state
        .conversations
        .remove(ConversationKey::new(entitlement.user_id, idea_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/nurture/{idea_id}/export - download the generated document.
pub async fn export_document(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    Path(idea_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_premium(&entitlement)?;
    let idea = owned_idea(&state, &entitlement, idea_id)?;

    let key = ConversationKey::new(entitlement.user_id, idea_id);
    let conversation = state
        .conversations
        .get(key)?
        .ok_or_else(|| ApiError::NotFound("No generated document for this idea".to_string()))?;
    let exported = {
        let guard = conversation
            .try_lock()
            .map_err(|_| ApiError::Conflict("A message is still being processed".to_string()))?;
        state.engine.export(&guard, &idea.text, &entitlement)?
    };

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        exported.file_name
    ))
    .map_err(|e| ApiError::Internal(format!("bad export file name: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(MARKDOWN_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        exported.markdown,
    )
        .into_response())
}

// =============================================================================
// Transcription
// =============================================================================

/// POST /api/transcribe - raw audio body, `Content-Type` names the format.
pub async fn transcribe(
    State(state): State<AppState>,
    Extension(entitlement): Extension<Entitlement>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No audio file provided".to_string()));
    }
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("audio/") || v.starts_with("video/"))
        .unwrap_or(DEFAULT_AUDIO_MIME);

    let text = state.transcriber.transcribe(body.to_vec(), mime).await?;
    tracing::info!(user_id = %entitlement.user_id, bytes = body.len(), "Audio transcribed");
    Ok(Json(TranscriptionResponse { text }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::Request;
    use hatch_core::config::HatchConfig;
    use hatch_llm::{LlmError, MockGenerator, MockTranscriber, StreamScript};
    use hatch_storage::Database;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        mock: Arc<MockGenerator>,
        premium_token: String,
        free_token: String,
        premium_user: Uuid,
    }

    fn harness() -> Harness {
        let mock = Arc::new(MockGenerator::new());
        let state = AppState::new(
            HatchConfig::default(),
            Database::in_memory().unwrap(),
            mock.clone(),
            Arc::new(MockTranscriber::new("a note about gardens")),
        );
        let premium = state.profiles().create("pro@example.com", true).unwrap();
        let free = state.profiles().create("free@example.com", false).unwrap();
        let premium_token = crate::auth::issue_token(&state.sessions(), premium.id).unwrap();
        let free_token = crate::auth::issue_token(&state.sessions(), free.id).unwrap();
        Harness {
            state,
            mock,
            premium_token,
            free_token,
            premium_user: premium.id,
        }
    }

    fn app(h: &Harness) -> axum::Router {
        crate::create_router(h.state.clone())
    }

    fn json_req(method: &str, uri: &str, token: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn seed_idea(h: &Harness, text: &str) -> Idea {
        h.state
            .ideas()
            .insert(
                NewIdea {
                    owner_id: h.premium_user,
                    text: text.to_string(),
                    excitement: Rating::new(4).unwrap(),
                    difficulty: Rating::new(2).unwrap(),
                    tags: vec![],
                    category: None,
                },
                h.state.config.ideas.free_plan_limit,
            )
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // ---- Health & auth ----

    #[tokio::test]
    async fn test_health_endpoint() {
        let h = harness();
        let resp = app(&h)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = harness();
        let resp = app(&h)
            .oneshot(Request::get("/api/ideas").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let h = harness();
        let resp = app(&h).oneshot(get_req("/api/ideas", "nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let h = harness();
        let req = Request::post("/api/auth/logout")
            .header("authorization", format!("Bearer {}", h.free_token))
            .body(Body::empty())
            .unwrap();
        let resp = app(&h).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app(&h).oneshot(get_req("/api/ideas", &h.free_token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = app(&h).oneshot(get_req("/api/ideas", &h.premium_token)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // ---- Ideas ----

    #[tokio::test]
    async fn test_create_idea_tags_and_categorizes() {
        let h = harness();
        h.mock.push_completion(Ok(r#"["garden","community"]"#.to_string()));
        h.mock.push_completion(Ok("Community".to_string()));

        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                "/api/ideas",
                &h.premium_token,
                serde_json::json!({"text": "Shared garden tool library", "excitement": 5, "difficulty": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let idea: Idea = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(idea.text, "Shared garden tool library");
        assert_eq!(h.mock.completion_calls(), 2);
        // Tags and category run concurrently, so either completion may land on either.
        assert!(idea.category.is_some());
    }

    #[tokio::test]
    async fn test_create_idea_rejects_bad_rating() {
        let h = harness();
        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                "/api/ideas",
                &h.premium_token,
                serde_json::json!({"text": "x", "excitement": 6, "difficulty": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.mock.completion_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_idea_rejects_blank_text() {
        let h = harness();
        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                "/api/ideas",
                &h.premium_token,
                serde_json::json!({"text": "   ", "excitement": 3, "difficulty": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_idea_of_other_user_is_forbidden() {
        let h = harness();
        let idea = seed_idea(&h, "premium user's idea");
        let resp = app(&h)
            .oneshot(get_req(&format!("/api/ideas/{}", idea.id), &h.free_token))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_missing_idea_is_not_found() {
        let h = harness();
        let resp = app(&h)
            .oneshot(get_req(&format!("/api/ideas/{}", Uuid::new_v4()), &h.premium_token))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // ---- Nurturing ----

    #[tokio::test]
    async fn test_nurture_stream_relays_fragments() {
        let h = harness();
        h.mock.push_stream(StreamScript::fragments(["Here", " are", " some"]));
        let idea = seed_idea(&h, "Build a budgeting app");

        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                "/api/nurture",
                &h.premium_token,
                serde_json::json!({"ideaId": idea.id, "ideaText": idea.text, "message": "Ideas?"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            STREAM_CONTENT_TYPE
        );
        assert_eq!(body_string(resp).await, "Here are some");
    }

    #[tokio::test]
    async fn test_nurture_requires_premium() {
        let h = harness();
        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                "/api/nurture",
                &h.free_token,
                serde_json::json!({"ideaText": "x", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.mock.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_output_unknown_format() {
        let h = harness();
        let resp = app(&h)
            .oneshot(json_req(
                "PUT",
                "/api/nurture",
                &h.premium_token,
                serde_json::json!({"ideaText": "x", "format": "poem"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.mock.completion_calls(), 0);
    }

    #[tokio::test]
    async fn test_post_message_conflict_while_turn_running() {
        let h = harness();
        let idea = seed_idea(&h, "Build a budgeting app");
        let _held = h
            .state
            .conversations
            .begin_turn(ConversationKey::new(h.premium_user, idea.id))
            .unwrap();

        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                &format!("/api/nurture/{}/messages", idea.id),
                &h.premium_token,
                serde_json::json!({"message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(h.mock.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_post_message_empty_is_bad_request() {
        let h = harness();
        let idea = seed_idea(&h, "Build a budgeting app");
        let resp = app(&h)
            .oneshot(json_req(
                "POST",
                &format!("/api/nurture/{}/messages", idea.id),
                &h.premium_token,
                serde_json::json!({"message": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_without_document_is_not_found() {
        let h = harness();
        let idea = seed_idea(&h, "Build a budgeting app");
        let resp = app(&h)
            .oneshot(get_req(
                &format!("/api/nurture/{}/export", idea.id),
                &h.premium_token,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    // ---- Transcription ----

    #[tokio::test]
    async fn test_transcribe() {
        let h = harness();
        let req = Request::post("/api/transcribe")
            .header("authorization", format!("Bearer {}", h.free_token))
            .header("content-type", "audio/webm")
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        let resp = app(&h).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: TranscriptionResponse = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body.text, "a note about gardens");
    }

    #[tokio::test]
    async fn test_transcribe_backend_failure_is_generic_500() {
        let transcriber = Arc::new(MockTranscriber::failing(LlmError::Status {
            status: 429,
            body: "quota exceeded for org-7f3a".to_string(),
        }));
        let state = AppState::new(
            HatchConfig::default(),
            Database::in_memory().unwrap(),
            Arc::new(MockGenerator::new()),
            transcriber.clone(),
        );
        let user = state.profiles().create("voice@example.com", false).unwrap();
        let token = crate::auth::issue_token(&state.sessions(), user.id).unwrap();

        let req = Request::post("/api/transcribe")
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "audio/mp4")
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        let resp = crate::create_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(resp).await;
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("org-7f3a"));
        assert_eq!(transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_transcribe_empty_body() {
        let h = harness();
        let req = Request::post("/api/transcribe")
            .header("authorization", format!("Bearer {}", h.free_token))
            .header("content-type", "audio/webm")
            .body(Body::empty())
            .unwrap();
        let resp = app(&h).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
