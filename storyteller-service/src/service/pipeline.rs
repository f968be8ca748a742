//! The staged generation pipeline.
//!
//! guardrail → story → image prompt → image, strictly in sequence. The
//! attempt's cancellation token is polled right before and right after every
//! gateway call; calls already in flight are never aborted.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{GeminiError, format_error_chain};

use super::gateway::ModelGateway;
use super::prompts::build_user_prompt;
use super::sanitize::sanitize;
use super::session::{Illustration, Interrupted, Notice, PersonalizationInput, Session};
use super::story::StoryResult;

/// Ways an attempt can end early
#[derive(Error, Debug)]
enum PipelineError {
    #[error("generation interrupted")]
    Interrupted,

    #[error("story model returned no text")]
    StoryEmpty,

    #[error("story generation failed")]
    Story(#[source] GeminiError),
}

impl From<Interrupted> for PipelineError {
    fn from(_: Interrupted) -> Self {
        PipelineError::Interrupted
    }
}

impl Session {
    /// Run one attempt to completion. Never fails: every outcome lands in the session state.
    pub async fn run_generation(&self, gateway: &ModelGateway, token: CancellationToken) {
        let input = self.personalization();

        match self.generate(gateway, &token, &input).await {
            Ok(()) => self.complete(),
            Err(PipelineError::Interrupted) => {
                info!(session_id = %self.id, "Pipeline abandoned at checkpoint");
            }
            Err(e) => {
                let detail = format_error_chain(&e);
                warn!(session_id = %self.id, error = %detail, "Story generation failed");
                self.fail(detail);
            }
        }
    }

    async fn generate(
        &self,
        gateway: &ModelGateway,
        token: &CancellationToken,
        input: &PersonalizationInput,
    ) -> Result<(), PipelineError> {
        self.checkpoint(token)?;
        let verdict = gateway.check_idea(&input.idea).await;
        self.checkpoint(token)?;

        let effective_idea = if verdict.allows_idea() {
            input.idea.as_str()
        } else {
            if !input.idea.trim().is_empty() {
                self.push_notice(Notice::PersonalizationDiscarded);
            }
            ""
        };

        let prompt = build_user_prompt(effective_idea, input.tone, input.duration);
        let story = gateway.generate_story(&prompt).await;
        self.checkpoint(token)?;

        let raw = story
            .map_err(PipelineError::Story)?
            .ok_or(PipelineError::StoryEmpty)?;
        let text = sanitize(&raw);
        let story = StoryResult::parse(&text);
        info!(session_id = %self.id, title = %story.title, "Story committed");
        self.commit_story(story);

        if input.illustrate {
            self.illustrate(gateway, token, &text).await?;
        }

        Ok(())
    }

    /// Image prompt and image. Failures become a warning in the illustration slot.
    async fn illustrate(
        &self,
        gateway: &ModelGateway,
        token: &CancellationToken,
        story_text: &str,
    ) -> Result<(), Interrupted> {
        self.checkpoint(token)?;
        let summary = gateway.summarize_for_image(story_text).await;
        self.checkpoint(token)?;

        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                self.illustration_unavailable(&e);
                return Ok(());
            }
        };

        let image = gateway.generate_image(&summary).await;
        self.checkpoint(token)?;

        match image {
            Ok(png) => {
                info!(session_id = %self.id, size = png.len(), "Illustration ready");
                self.set_illustration(Illustration::Ready(png));
            }
            Err(e) => self.illustration_unavailable(&e),
        }
        Ok(())
    }

    fn illustration_unavailable(&self, error: &GeminiError) {
        let detail = format_error_chain(error);
        warn!(session_id = %self.id, error = %detail, "Illustration unavailable");
        self.set_illustration(Illustration::Unavailable(detail));
    }
}
