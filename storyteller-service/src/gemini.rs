use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::{GeminiError, ServiceError, ServiceResult};
use crate::service::gateway::{ImagePayload, LanguageModel, PayloadPart};

/// Gemini `generateContent` REST client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Create a new Gemini client. The config must carry a resolved API key.
    pub fn new(config: &GeminiConfig) -> ServiceResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ServiceError::Config {
                message: "Gemini API key is missing".to_string(),
            })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Gemini(GeminiError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url, model)
    }

    async fn send_request(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<reqwest::Response, GeminiError> {
        let url = self.endpoint(model);
        debug!(model = %model, "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        Ok(response)
    }

    async fn read_json(
        &self,
        model: &str,
        response: reqwest::Response,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let body = response
            .bytes()
            .await
            .map_err(|e| GeminiError::Connection {
                url: self.endpoint(model),
                source: e,
            })?;

        serde_json::from_slice(&body).map_err(|source| GeminiError::InvalidResponse { source })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate_text(
        &self,
        system_instruction: &str,
        input: &str,
    ) -> Result<Option<String>, GeminiError> {
        let request = GenerateContentRequest::new(input, Some(system_instruction), None);
        let response = self.send_request(&self.text_model, &request).await?;
        let parsed = self.read_json(&self.text_model, response).await?;

        Ok(extract_text(parsed))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImagePayload, GeminiError> {
        let request = GenerateContentRequest::new(
            prompt,
            None,
            Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        );
        let response = self.send_request(&self.image_model, &request).await?;

        let is_binary = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|content_type| content_type.type_() == mime::IMAGE);

        if is_binary {
            let body = response
                .bytes()
                .await
                .map_err(|e| GeminiError::Connection {
                    url: self.endpoint(&self.image_model),
                    source: e,
                })?;
            return Ok(ImagePayload {
                binary: Some(body),
                parts: Vec::new(),
            });
        }

        let parsed = self.read_json(&self.image_model, response).await?;
        Ok(ImagePayload {
            binary: None,
            parts: payload_parts(parsed),
        })
    }
}

// Internal Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    fn new(
        input: &str,
        system_instruction: Option<&str>,
        generation_config: Option<GenerationConfig>,
    ) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: input.to_string(),
                }],
            }],
            system_instruction: system_instruction.map(|text| Content {
                role: None,
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            }),
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn first_candidate_parts(response: GenerateContentResponse) -> Vec<PartResponse> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default()
}

/// Concatenate the text parts of the first candidate; `None` when there is no text at all.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let text: String = first_candidate_parts(response)
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() { None } else { Some(text) }
}

fn payload_parts(response: GenerateContentResponse) -> Vec<PayloadPart> {
    first_candidate_parts(response)
        .into_iter()
        .map(|part| {
            let (mime_type, data) = match part.inline_data {
                Some(inline) => {
                    let data = inline.data.and_then(|encoded| {
                        match BASE64_STANDARD.decode(encoded.as_bytes()) {
                            Ok(decoded) => Some(Bytes::from(decoded)),
                            Err(e) => {
                                warn!(error = %e, "Discarding undecodable inline image data");
                                None
                            }
                        }
                    });
                    (inline.mime_type, data)
                }
                None => (None, None),
            };

            PayloadPart {
                mime_type,
                data,
                text: part.text,
            }
        })
        .collect()
}

fn map_http_error(status: StatusCode, body: String) -> GeminiError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.clone());

    GeminiError::Api {
        status: status.as_u16(),
        message,
    }
}
