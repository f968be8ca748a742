//! Model gateway: the guardrail, story and illustration calls.
//!
//! The gateway owns the system instructions for each call and turns raw model
//! replies into the shapes the session controller works with. Transport is
//! behind [`LanguageModel`] so the controller can be driven by a fake.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::GeminiError;

use super::prompts::PromptSet;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Remote text and image generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text for `input` under `system_instruction`. `Ok(None)` means the model replied with no text.
    async fn generate_text(
        &self,
        system_instruction: &str,
        input: &str,
    ) -> Result<Option<String>, GeminiError>;

    /// Request an image. The reply is returned unprobed.
    async fn generate_image(&self, prompt: &str) -> Result<ImagePayload, GeminiError>;
}

/// Raw reply of an image request, in whichever encoding the model chose.
#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    /// Body of a reply that was itself an image
    pub binary: Option<Bytes>,
    pub parts: Vec<PayloadPart>,
}

/// One part of a multipart reply
#[derive(Debug, Clone, Default)]
pub struct PayloadPart {
    pub mime_type: Option<String>,
    pub data: Option<Bytes>,
    pub text: Option<String>,
}

/// Guardrail classification of a user idea
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailDecision {
    UseAsIs,
    Sanitize,
    Ignore,
}

impl GuardrailDecision {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USE_AS_IS" => Some(Self::UseAsIs),
            "SANITIZE" => Some(Self::Sanitize),
            "IGNORE" => Some(Self::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailVerdict {
    pub decision: GuardrailDecision,
    pub notes: String,
}

impl GuardrailVerdict {
    fn use_as_is(notes: impl Into<String>) -> Self {
        Self {
            decision: GuardrailDecision::UseAsIs,
            notes: notes.into(),
        }
    }

    fn ignore(notes: impl Into<String>) -> Self {
        Self {
            decision: GuardrailDecision::Ignore,
            notes: notes.into(),
        }
    }

    /// Only `UseAsIs` lets the idea through. `Sanitize` counts as a rejection.
    pub fn allows_idea(&self) -> bool {
        self.decision == GuardrailDecision::UseAsIs
    }
}

/// Parse the guardrail model's reply, failing closed to `Ignore`.
pub fn parse_verdict(reply: &str) -> GuardrailVerdict {
    #[derive(Deserialize)]
    struct RawVerdict {
        decision: Option<serde_json::Value>,
        #[serde(default)]
        notes: Option<serde_json::Value>,
    }

    let Ok(raw) = serde_json::from_str::<RawVerdict>(strip_code_fence(reply)) else {
        return GuardrailVerdict::ignore("unparseable response");
    };

    let Some(decision) = raw
        .decision
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(GuardrailDecision::parse)
    else {
        return GuardrailVerdict::ignore("unparseable response");
    };

    let notes = match raw.notes {
        Some(serde_json::Value::String(notes)) => notes,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    GuardrailVerdict { decision, notes }
}

/// Models like to wrap JSON in a Markdown fence even when told not to.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

type ImageExtractor = fn(&ImagePayload) -> Option<Bytes>;

/// Tried in order; the first match wins.
const IMAGE_EXTRACTORS: &[(&str, ImageExtractor)] = &[
    ("binary", extract_binary),
    ("inline_part", extract_inline_part),
    ("data_uri", extract_data_uri),
];

fn extract_binary(payload: &ImagePayload) -> Option<Bytes> {
    payload.binary.clone().filter(|bytes| !bytes.is_empty())
}

fn extract_inline_part(payload: &ImagePayload) -> Option<Bytes> {
    payload.parts.iter().find_map(|part| {
        let is_png = part
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.eq_ignore_ascii_case(mime::IMAGE_PNG.essence_str()));
        if is_png {
            part.data.clone().filter(|bytes| !bytes.is_empty())
        } else {
            None
        }
    })
}

fn extract_data_uri(payload: &ImagePayload) -> Option<Bytes> {
    payload.parts.iter().find_map(|part| {
        let encoded = part.text.as_deref()?.trim().strip_prefix(PNG_DATA_URI_PREFIX)?;
        match BASE64_STANDARD.decode(encoded.as_bytes()) {
            Ok(decoded) if !decoded.is_empty() => Some(Bytes::from(decoded)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed data URI in image reply");
                None
            }
        }
    })
}

/// Pull PNG bytes out of an image reply.
pub fn extract_png(payload: &ImagePayload) -> Result<Bytes, GeminiError> {
    for (name, extractor) in IMAGE_EXTRACTORS {
        if let Some(bytes) = extractor(payload) {
            debug!(strategy = %name, size = bytes.len(), "Image extracted from reply");
            return Ok(bytes);
        }
    }
    Err(GeminiError::ImageNotReturned)
}

/// Wraps the remote calls the generation pipeline makes
pub struct ModelGateway {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<PromptSet>,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: Arc<PromptSet>) -> Self {
        Self { model, prompts }
    }

    /// Classify a user idea. Never fails: errors resolve to `Ignore`.
    pub async fn check_idea(&self, idea: &str) -> GuardrailVerdict {
        if idea.trim().is_empty() {
            return GuardrailVerdict::use_as_is("no personalization supplied");
        }

        let verdict = match self.model.generate_text(&self.prompts.guardrails, idea).await {
            Ok(Some(reply)) => parse_verdict(&reply),
            Ok(None) => GuardrailVerdict::ignore("unparseable response"),
            Err(e) => {
                warn!(error = %e, "Guardrail call failed, ignoring idea");
                GuardrailVerdict::ignore(format!("guardrail unavailable: {e}"))
            }
        };

        info!(decision = ?verdict.decision, notes = %verdict.notes, "Guardrail verdict");
        verdict
    }

    /// Generate the story text. `Ok(None)` when the model returned nothing usable.
    pub async fn generate_story(&self, prompt: &str) -> Result<Option<String>, GeminiError> {
        let story = self
            .model
            .generate_text(&self.prompts.storyteller, prompt)
            .await?;
        Ok(story.filter(|text| !text.trim().is_empty()))
    }

    /// Condense a story into a short image-generation prompt.
    pub async fn summarize_for_image(&self, story: &str) -> Result<String, GeminiError> {
        self.model
            .generate_text(&self.prompts.image_summarizer, story)
            .await?
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GeminiError::EmptyResponse)
    }

    /// Generate the illustration and return its PNG bytes.
    pub async fn generate_image(&self, prompt: &str) -> Result<Bytes, GeminiError> {
        let payload = self.model.generate_image(prompt).await?;
        extract_png(&payload)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`LanguageModel`] for controller and API tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// One scripted reply for a text call
    pub enum TextReply {
        Text(String),
        Empty,
        Fail,
    }

    /// Which system instruction a text call was made with
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CallKind {
        Guardrail,
        Story,
        Summary,
        Image,
    }

    #[derive(Default)]
    pub struct FakeModel {
        pub guardrail: Mutex<VecDeque<TextReply>>,
        pub story: Mutex<VecDeque<TextReply>>,
        pub summary: Mutex<VecDeque<TextReply>>,
        pub image: Mutex<VecDeque<Result<ImagePayload, ()>>>,
        pub calls: Mutex<Vec<CallKind>>,
        pub inputs: Mutex<Vec<String>>,
        /// When set, every call waits for a notification before replying.
        pub gate: Option<Arc<Notify>>,
        /// Notified as each call starts
        pub entered: Arc<Notify>,
    }

    pub fn test_prompts() -> Arc<PromptSet> {
        Arc::new(PromptSet {
            guardrails: "GUARDRAILS".to_string(),
            storyteller: "STORYTELLER".to_string(),
            image_summarizer: "IMGSUM".to_string(),
        })
    }

    pub fn png_payload() -> ImagePayload {
        ImagePayload {
            binary: Some(Bytes::from_static(b"\x89PNG\r\n")),
            parts: Vec::new(),
        }
    }

    impl FakeModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        pub fn with_guardrail(self, reply: TextReply) -> Self {
            self.guardrail.lock().unwrap().push_back(reply);
            self
        }

        pub fn with_story(self, reply: TextReply) -> Self {
            self.story.lock().unwrap().push_back(reply);
            self
        }

        pub fn with_summary(self, reply: TextReply) -> Self {
            self.summary.lock().unwrap().push_back(reply);
            self
        }

        pub fn with_image(self, reply: Result<ImagePayload, ()>) -> Self {
            self.image.lock().unwrap().push_back(reply);
            self
        }

        pub fn calls(&self) -> Vec<CallKind> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, kind: CallKind, input: &str) {
            self.calls.lock().unwrap().push(kind);
            self.inputs.lock().unwrap().push(input.to_string());
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
    }

    fn fail() -> GeminiError {
        GeminiError::Api {
            status: 500,
            message: "scripted failure".to_string(),
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate_text(
            &self,
            system_instruction: &str,
            input: &str,
        ) -> Result<Option<String>, GeminiError> {
            let (kind, queue) = match system_instruction {
                "GUARDRAILS" => (CallKind::Guardrail, &self.guardrail),
                "STORYTELLER" => (CallKind::Story, &self.story),
                _ => (CallKind::Summary, &self.summary),
            };
            self.enter(kind, input).await;

            let reply = queue.lock().unwrap().pop_front();
            match reply {
                Some(TextReply::Text(text)) => Ok(Some(text)),
                Some(TextReply::Empty) | None => Ok(None),
                Some(TextReply::Fail) => Err(fail()),
            }
        }

        async fn generate_image(&self, prompt: &str) -> Result<ImagePayload, GeminiError> {
            self.enter(CallKind::Image, prompt).await;
            let reply = self.image.lock().unwrap().pop_front();
            match reply {
                Some(Ok(payload)) => Ok(payload),
                Some(Err(())) | None => Err(fail()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_parse_verdict_valid() {
        let verdict = parse_verdict(r#"{"decision": "use_as_is", "notes": "ok"}"#);
        assert_eq!(verdict.decision, GuardrailDecision::UseAsIs);
        assert_eq!(verdict.notes, "ok");

        let verdict = parse_verdict(r#"{"decision": " SANITIZE ", "notes": "names removed"}"#);
        assert_eq!(verdict.decision, GuardrailDecision::Sanitize);
        assert!(!verdict.allows_idea());
    }

    #[test]
    fn test_parse_verdict_fails_closed() {
        for reply in [
            "",
            "not json",
            "{",
            "[]",
            r#"{"notes": "missing decision"}"#,
            r#"{"decision": "MAYBE"}"#,
            r#"{"decision": 3}"#,
            r#"{"decision": null}"#,
            r#""USE_AS_IS""#,
        ] {
            let verdict = parse_verdict(reply);
            assert_eq!(verdict.decision, GuardrailDecision::Ignore, "reply: {reply:?}");
            assert_eq!(verdict.notes, "unparseable response");
        }
    }

    #[test]
    fn test_parse_verdict_strips_code_fence() {
        let verdict = parse_verdict("```json\n{\"decision\":\"USE_AS_IS\",\"notes\":\"\"}\n```");
        assert_eq!(verdict.decision, GuardrailDecision::UseAsIs);
    }

    #[test]
    fn test_extractors_run_in_order() {
        let payload = ImagePayload {
            binary: Some(Bytes::from_static(b"binary")),
            parts: vec![PayloadPart {
                mime_type: Some("image/png".to_string()),
                data: Some(Bytes::from_static(b"inline")),
                text: None,
            }],
        };
        assert_eq!(extract_png(&payload).unwrap(), Bytes::from_static(b"binary"));

        let payload = ImagePayload {
            binary: None,
            parts: vec![
                PayloadPart {
                    text: Some(format!("{PNG_DATA_URI_PREFIX}dXJp")),
                    ..PayloadPart::default()
                },
                PayloadPart {
                    mime_type: Some("image/png".to_string()),
                    data: Some(Bytes::from_static(b"inline")),
                    text: None,
                },
            ],
        };
        assert_eq!(extract_png(&payload).unwrap(), Bytes::from_static(b"inline"));
    }

    #[test]
    fn test_extract_data_uri() {
        let payload = ImagePayload {
            binary: None,
            parts: vec![PayloadPart {
                text: Some(format!("{PNG_DATA_URI_PREFIX}dXJp")),
                ..PayloadPart::default()
            }],
        };
        assert_eq!(extract_png(&payload).unwrap(), Bytes::from_static(b"uri"));
    }

    #[test]
    fn test_extract_png_none_match() {
        let payload = ImagePayload {
            binary: None,
            parts: vec![
                PayloadPart {
                    mime_type: Some("image/jpeg".to_string()),
                    data: Some(Bytes::from_static(b"jpeg")),
                    text: None,
                },
                PayloadPart {
                    text: Some("sorry, no picture".to_string()),
                    ..PayloadPart::default()
                },
            ],
        };
        assert!(matches!(
            extract_png(&payload),
            Err(GeminiError::ImageNotReturned)
        ));
        assert!(matches!(
            extract_png(&ImagePayload::default()),
            Err(GeminiError::ImageNotReturned)
        ));
    }

    #[tokio::test]
    async fn test_empty_idea_skips_remote_call() {
        let model = Arc::new(FakeModel::new());
        let gateway = ModelGateway::new(model.clone(), test_prompts());

        for idea in ["", "   ", "\n\t"] {
            let verdict = gateway.check_idea(idea).await;
            assert_eq!(verdict.decision, GuardrailDecision::UseAsIs);
        }
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_guardrail_transport_failure_ignores_idea() {
        let model = Arc::new(FakeModel::new().with_guardrail(TextReply::Fail));
        let gateway = ModelGateway::new(model.clone(), test_prompts());

        let verdict = gateway.check_idea("um dragão").await;
        assert_eq!(verdict.decision, GuardrailDecision::Ignore);
        assert_eq!(model.calls(), vec![CallKind::Guardrail]);
    }

    #[tokio::test]
    async fn test_summarize_rejects_empty_reply() {
        let model = Arc::new(FakeModel::new().with_summary(TextReply::Text("  ".to_string())));
        let gateway = ModelGateway::new(model, test_prompts());

        assert!(matches!(
            gateway.summarize_for_image("story").await,
            Err(GeminiError::EmptyResponse)
        ));
    }
}
