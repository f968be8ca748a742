pub mod gateway;
mod pipeline;
pub mod prompts;
pub mod sanitize;
pub mod session;
pub mod story;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::gemini::GeminiClient;
use crate::i18n::I18n;

use gateway::{LanguageModel, ModelGateway};
use prompts::PromptSet;
use session::{PersonalizationInput, Session, StartOutcome};

/// Longest idea accepted from a user, in characters
pub const MAX_IDEA_CHARS: usize = 500;

/// Main service coordinator
pub struct StorytellerService {
    pub gateway: Arc<ModelGateway>,
    pub i18n: Arc<I18n>,
    pub locale: String,
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl StorytellerService {
    /// Build the service from configuration: Gemini client plus prompt templates.
    pub fn from_config(config: &AppConfig) -> ServiceResult<Self> {
        info!("Initializing Storyteller service");

        let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&config.gemini)?);
        info!(
            url = %config.gemini.base_url,
            text_model = %config.gemini.text_model,
            image_model = %config.gemini.image_model,
            "Gemini client initialized"
        );

        let prompts = Arc::new(PromptSet::load(&config.prompts.dir)?);

        Ok(Self::new(model, prompts, config.ui.locale.clone()))
    }

    pub fn new(model: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>, locale: String) -> Self {
        let i18n = Arc::new(I18n::new());
        let locale = if i18n.has_locale(&locale) {
            locale
        } else {
            tracing::warn!(locale = %locale, "Unknown UI locale, using fallback");
            crate::i18n::FALLBACK_LOCALE.to_string()
        };

        Self {
            gateway: Arc::new(ModelGateway::new(model, prompts)),
            i18n,
            locale,
            sessions: DashMap::new(),
        }
    }

    /// Start a new session
    pub fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        self.sessions.insert(session.id, session.clone());
        info!(session_id = %session.id, "Session created");
        session
    }

    /// Look up a live session and mark it as seen
    pub fn session(&self, session_id: Uuid) -> ServiceResult<Arc<Session>> {
        let session = self
            .sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        session.touch();
        Ok(session)
    }

    /// Drop a session, cancelling any generation it has in flight
    pub fn end_session(&self, session_id: Uuid) -> ServiceResult<()> {
        let (_, session) =
            self.sessions
                .remove(&session_id)
                .ok_or_else(|| ServiceError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        session.cancel();
        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Trigger a generation. Returns `false` when the session was already busy.
    pub fn start_generation(
        &self,
        session_id: Uuid,
        input: PersonalizationInput,
    ) -> ServiceResult<bool> {
        let session = self.session(session_id)?;

        if input.idea.chars().count() > MAX_IDEA_CHARS {
            return Err(ServiceError::IdeaTooLong {
                max: MAX_IDEA_CHARS,
            });
        }

        let token = match session.start_generation(input) {
            StartOutcome::Started(token) => token,
            StartOutcome::Busy => return Ok(false),
        };

        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            session.run_generation(&gateway, token).await;
        });
        Ok(true)
    }

    /// Remove sessions idle for longer than `ttl`
    pub fn cleanup_sessions(&self, ttl: Duration) -> usize {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > ttl)
            .map(|entry| *entry.key())
            .collect();

        for session_id in &expired {
            if let Some((_, session)) = self.sessions.remove(session_id) {
                session.cancel();
                debug!(session_id = %session_id, "Expired idle session");
            }
        }

        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::gateway::testing::*;
    use super::session::Outcome;
    use super::*;

    fn service(model: FakeModel) -> StorytellerService {
        StorytellerService::new(Arc::new(model), test_prompts(), "pt-BR".to_string())
    }

    #[tokio::test]
    async fn test_generation_runs_in_background() {
        let service = service(
            FakeModel::new()
                .with_story(TextReply::Text("Título\ncorpo".to_string()))
                .with_summary(TextReply::Text("prompt".to_string()))
                .with_image(Ok(png_payload())),
        );
        let session = service.create_session();

        assert!(service
            .start_generation(session.id, PersonalizationInput::default())
            .unwrap());

        for _ in 0..100 {
            if !session.snapshot().busy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let state = session.snapshot();
        assert_eq!(state.outcome, Some(Outcome::Completed));
        assert!(session.illustration_png().is_some());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let service = service(FakeModel::new());
        let err = service
            .start_generation(Uuid::new_v4(), PersonalizationInput::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_overlong_idea_is_rejected() {
        let service = service(FakeModel::new());
        let session = service.create_session();

        let input = PersonalizationInput {
            idea: "a".repeat(MAX_IDEA_CHARS + 1),
            ..PersonalizationInput::default()
        };
        let err = service.start_generation(session.id, input).unwrap_err();
        assert!(matches!(err, ServiceError::IdeaTooLong { .. }));
        assert!(!session.snapshot().busy);
    }

    #[tokio::test]
    async fn test_end_session_cancels() {
        let service = service(FakeModel::new());
        let session = service.create_session();
        assert_eq!(service.session_count(), 1);

        service.end_session(session.id).unwrap();
        assert_eq!(service.session_count(), 0);
        assert!(service.session(session.id).is_err());
    }

    #[tokio::test]
    async fn test_cleanup_expires_idle_sessions() {
        let service = service(FakeModel::new());
        let _session = service.create_session();

        assert_eq!(service.cleanup_sessions(Duration::from_secs(3600)), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(service.cleanup_sessions(Duration::ZERO), 1);
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        let service =
            StorytellerService::new(Arc::new(FakeModel::new()), test_prompts(), "xx".to_string());
        assert_eq!(service.locale, "pt-BR");
    }
}
