//! Conversation Engine: drives one nurturing turn at a time.
//!
//! A turn is started with [`ConversationEngine::submit_message`], which
//! validates the request, records the user message and opens the relay.
//! The returned [`Turn`] yields fragments as they arrive; [`Turn::finish`]
//! freezes the reply and runs intent inference. Dropping a turn early keeps
//! whatever reply text already arrived and aborts the upstream request.

use std::ops::DerefMut;

use tracing::{debug, info, warn};

use hatch_core::config::NurtureConfig;
use hatch_core::types::Entitlement;
use hatch_llm::{CompletionRequest, Fragments, LlmError, Relay};

use crate::error::NurtureError;
use crate::intent::{infer_intent, IntentDecision};
use crate::prompts::{document_prompt, system_preamble};
use crate::types::{
    AssistantTurnBuilder, ConversationState, FormatState, GeneratedDocument, OutputFormat,
};

const EXPORT_NAME_CHARS: usize = 20;

/// Coordinates the relay, the transcript and document generation.
#[derive(Clone)]
pub struct ConversationEngine {
    relay: Relay,
    config: NurtureConfig,
}

impl ConversationEngine {
    pub fn new(relay: Relay, config: NurtureConfig) -> Self {
        Self { relay, config }
    }

    /// Start a turn.
    ///
    /// Entitlement and input are checked before anything is mutated. On
    /// success the user message is already in the transcript and exactly one
    /// streamed request has been opened.
    pub fn submit_message<S>(
        &self,
        mut state: S,
        idea_text: &str,
        user_text: &str,
        entitlement: &Entitlement,
    ) -> Result<Turn<S>, NurtureError>
    where
        S: DerefMut<Target = ConversationState>,
    {
        if !entitlement.premium {
            return Err(NurtureError::premium_required());
        }
        self.validate_message(user_text)?;

        state.push_user(user_text.to_string());
        let fragments = self.relay.relay(system_preamble(idea_text), user_text);
        debug!(
            user_id = %entitlement.user_id,
            turns = state.turns().len(),
            "Nurture turn started"
        );

        Ok(Turn {
            engine: self.clone(),
            state,
            idea_text: idea_text.to_string(),
            user_text: user_text.to_string(),
            builder: Some(AssistantTurnBuilder::new()),
            fragments,
            failure: None,
        })
    }

    /// Relay a single message without any conversation state.
    ///
    /// Same checks as [`submit_message`](Self::submit_message); nothing is
    /// recorded and no inference runs.
    pub fn relay_message(
        &self,
        idea_text: &str,
        user_text: &str,
        entitlement: &Entitlement,
    ) -> Result<Fragments, NurtureError> {
        if !entitlement.premium {
            return Err(NurtureError::premium_required());
        }
        self.validate_message(user_text)?;
        Ok(self.relay.relay(system_preamble(idea_text), user_text))
    }

    /// Run a turn to completion without observing the fragments.
    pub async fn run_turn<S>(
        &self,
        state: S,
        idea_text: &str,
        user_text: &str,
        entitlement: &Entitlement,
    ) -> Result<TurnOutcome, NurtureError>
    where
        S: DerefMut<Target = ConversationState>,
    {
        self.submit_message(state, idea_text, user_text, entitlement)?
            .finish()
            .await
    }

    /// One-shot document generation. No retry.
    pub async fn generate_document(
        &self,
        idea_text: &str,
        format: OutputFormat,
        context: &str,
    ) -> Result<String, NurtureError> {
        if idea_text.trim().is_empty() {
            return Err(NurtureError::InvalidInput(
                "idea text cannot be empty".to_string(),
            ));
        }

        let request = CompletionRequest::new(
            document_prompt(idea_text, format, context),
            self.config.document_temperature,
            self.config.document_max_tokens,
        );
        let markdown = self.relay.backend().complete(request).await.map_err(|e| {
            warn!(format = %format, error = %e, "Document generation failed");
            NurtureError::from(e)
        })?;

        info!(format = %format, chars = markdown.len(), "Document generated");
        Ok(markdown)
    }

    /// Package the generated document for download.
    pub fn export(
        &self,
        state: &ConversationState,
        idea_text: &str,
        entitlement: &Entitlement,
    ) -> Result<ExportedDocument, NurtureError> {
        if !entitlement.premium {
            return Err(NurtureError::Forbidden(
                "Upgrade to premium to export your nurtured ideas".to_string(),
            ));
        }
        let document = state
            .generated()
            .ok_or_else(|| NurtureError::NotFound("no generated document".to_string()))?;

        Ok(ExportedDocument {
            file_name: export_file_name(idea_text, document.format),
            markdown: document.markdown.clone(),
        })
    }

    fn validate_message(&self, user_text: &str) -> Result<(), NurtureError> {
        if user_text.trim().is_empty() {
            return Err(NurtureError::InvalidInput(
                "message cannot be empty".to_string(),
            ));
        }
        let len = user_text.chars().count();
        if len > self.config.max_message_length {
            return Err(NurtureError::InvalidInput(format!(
                "message exceeds maximum length of {} characters",
                self.config.max_message_length
            )));
        }
        Ok(())
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub assistant_text: String,
    pub format: FormatState,
    pub document_generated: bool,
}

/// A generated document ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub markdown: String,
}

/// `{first 20 chars of the idea}-{format}.md`, with characters that are
/// unsafe in a file name replaced.
pub fn export_file_name(idea_text: &str, format: OutputFormat) -> String {
    let stem: String = idea_text
        .trim()
        .chars()
        .take(EXPORT_NAME_CHARS)
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim();
    let stem = if stem.is_empty() { "idea" } else { stem };
    format!("{}-{}.md", stem, format)
}

/// An in-flight nurturing turn.
///
/// Holds exclusive access to the conversation for its whole lifetime, so a
/// second turn on the same conversation cannot start until this one ends.
pub struct Turn<S>
where
    S: DerefMut<Target = ConversationState>,
{
    engine: ConversationEngine,
    state: S,
    idea_text: String,
    user_text: String,
    builder: Option<AssistantTurnBuilder>,
    fragments: Fragments,
    failure: Option<LlmError>,
}

impl<S> Turn<S>
where
    S: DerefMut<Target = ConversationState>,
{
    /// Next reply fragment. `None` once the relay has ended.
    ///
    /// An upstream failure is yielded once, after any fragments that
    /// preceded it.
    pub async fn next_fragment(&mut self) -> Option<Result<String, NurtureError>> {
        let builder = self.builder.as_mut()?;
        if self.failure.is_some() {
            return None;
        }
        match self.fragments.next_fragment().await? {
            Ok(text) => {
                builder.push(&text);
                Some(Ok(text))
            }
            Err(e) => {
                warn!(error = %e, partial_chars = builder.text().len(), "Nurture stream failed");
                self.failure = Some(e.clone());
                Some(Err(NurtureError::Upstream(e)))
            }
        }
    }

    /// Reply text received so far.
    pub fn partial_text(&self) -> &str {
        self.builder.as_ref().map(|b| b.text()).unwrap_or("")
    }

    /// Drain the remaining fragments, freeze the reply and run inference.
    ///
    /// A failed stream keeps the partial reply (if any) and skips inference.
    pub async fn finish(mut self) -> Result<TurnOutcome, NurtureError> {
        while let Some(item) = self.next_fragment().await {
            if item.is_err() {
                break;
            }
        }

        let Some(builder) = self.builder.take() else {
            return Err(NurtureError::InvalidInput("turn already finished".to_string()));
        };

        if let Some(err) = self.failure.take() {
            if !builder.is_empty() {
                self.state.push_assistant(builder.freeze());
            }
            return Err(NurtureError::Upstream(err));
        }

        let reply = builder.freeze();
        let assistant_text = reply.content.clone();
        self.state.push_assistant(reply);
        self.state.record_exchange();

        let exchanges = self.state.completed_exchanges();
        let decision = infer_intent(&self.state, &self.user_text, exchanges);
        debug!(?decision, exchanges, "Intent inferred");

        let mut document_generated = false;
        match decision {
            IntentDecision::None => {}
            IntentDecision::MarkPending => {
                self.state.advance_format(FormatState::Pending);
            }
            IntentDecision::ChooseFormat(format) => {
                self.state.advance_format(FormatState::Chosen(format));
                info!(format = %format, "Output format chosen");
            }
            IntentDecision::Generate(format) => {
                let context = self.state.prior_user_context();
                let markdown = self
                    .engine
                    .generate_document(&self.idea_text, format, &context)
                    .await?;
                document_generated = self.state.store_document(GeneratedDocument {
                    format,
                    markdown,
                });
                if !document_generated {
                    warn!(format = %format, "Generated document was empty; not stored");
                }
            }
        }

        Ok(TurnOutcome {
            assistant_text,
            format: self.state.format(),
            document_generated,
        })
    }
}

impl<S> Drop for Turn<S>
where
    S: DerefMut<Target = ConversationState>,
{
    fn drop(&mut self) {
        let Some(builder) = self.builder.take() else {
            return;
        };
        self.fragments.cancel();
        if !builder.is_empty() {
            debug!(partial_chars = builder.text().len(), "Nurture turn cancelled");
            self.state.push_assistant(builder.freeze());
        }
    }
}
