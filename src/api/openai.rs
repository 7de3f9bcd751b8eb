use super::{GenerationRequest, ImageGenerator};
use crate::config::ClientConfig;
use crate::error::GenerationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const IMAGES_PATH: &str = "/images/generations";
const VIDEOS_PATH: &str = "/videos/generations";
const DEFAULT_STATUS_MESSAGE: &str = "generation request failed";

/// Client for an OpenAI-compatible image and video generation API.
#[derive(Clone)]
pub struct OpenAiClient {
    config: ClientConfig,
    client: Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ImageRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u32,
}

#[derive(Debug, Serialize)]
struct VideoRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<EncodedPayload>,
}

#[derive(Debug, Deserialize)]
struct EncodedPayload {
    b64_json: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GenerationError::TransportFailure(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Generates one image and returns its decoded bytes.
    pub async fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<u8>, GenerationError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        info!(
            "Generating {} image ({} quality) for prompt: {}",
            request.size.as_str(),
            request.quality.as_str(),
            prompt
        );

        let body = ImageRequestBody {
            model: &self.config.image_model,
            prompt,
            size: request.size.as_str(),
            quality: request.quality.as_str(),
            n: 1,
        };
        let bytes = self.post_for_payload(IMAGES_PATH, &body).await?;

        info!("Received image ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Generates a video directly from a prompt, bypassing local assembly.
    pub async fn generate_video(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        info!("Requesting remote video with model {}", self.config.video_model);

        let body = VideoRequestBody {
            model: &self.config.video_model,
            prompt,
        };
        let bytes = self.post_for_payload(VIDEOS_PATH, &body).await?;

        info!("Received video ({} bytes)", bytes.len());
        Ok(bytes)
    }

    async fn post_for_payload<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, GenerationError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body_text = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            let err = status_failure(status, &body_text);
            warn!("Generation API returned HTTP {}: {}", status.as_u16(), err);
            return Err(err);
        }

        let parsed: GenerationResponse = serde_json::from_str(&body_text).map_err(|e| {
            GenerationError::TransportFailure(format!("failed to parse response: {}", e))
        })?;

        let encoded = parsed
            .data
            .into_iter()
            .next()
            .and_then(|payload| payload.b64_json)
            .ok_or_else(|| {
                GenerationError::TransportFailure("no payload in response".to_string())
            })?;

        STANDARD.decode(encoded.trim()).map_err(|e| {
            GenerationError::TransportFailure(format!("failed to decode payload: {}", e))
        })
    }
}

impl ImageGenerator for OpenAiClient {
    async fn generate_image(&self, request: &GenerationRequest) -> Result<Vec<u8>, GenerationError> {
        OpenAiClient::generate_image(self, request).await
    }
}

fn transport_failure(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::TransportFailure(format!("request timed out: {}", e))
    } else {
        GenerationError::TransportFailure(format!("HTTP request failed: {}", e))
    }
}

fn status_failure(status: StatusCode, body: &str) -> GenerationError {
    let message = extract_error_message(body).unwrap_or_else(|| {
        if !body.trim().is_empty() {
            body.trim().to_string()
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            "Rate limited".to_string()
        } else if status.is_server_error() {
            "Server error".to_string()
        } else {
            DEFAULT_STATUS_MESSAGE.to_string()
        }
    });

    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited(message)
    } else if status.is_client_error() {
        GenerationError::RequestRejected(message)
    } else {
        GenerationError::TransportFailure(format!("HTTP {}: {}", status.as_u16(), message))
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;

    if let Some(msg) = parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
    {
        return Some(msg.to_string());
    }

    parsed
        .get("message")
        .and_then(|message| message.as_str())
        .map(ToOwned::to_owned)
}
