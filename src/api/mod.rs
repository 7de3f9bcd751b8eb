mod openai;

pub use openai::OpenAiClient;

use crate::error::GenerationError;
use clap::ValueEnum;
use std::future::Future;
use tracing::warn;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ImageSize {
    #[default]
    Square,
    Landscape,
    Portrait,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Landscape => "1536x1024",
            ImageSize::Portrait => "1024x1536",
        }
    }

    /// Accepts names or pixel strings; anything else falls back to square.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "square" | "1024x1024" => ImageSize::Square,
            "landscape" | "1536x1024" => ImageSize::Landscape,
            "portrait" | "1024x1536" => ImageSize::Portrait,
            other => {
                warn!("Unknown image size '{}', using {}", other, ImageSize::Square.as_str());
                ImageSize::Square
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageQuality {
    #[default]
    Low,
    High,
}

impl ImageQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageQuality::Low => "low",
            ImageQuality::High => "high",
        }
    }
}

/// One image request, built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub quality: ImageQuality,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, size: ImageSize, quality: ImageQuality) -> Self {
        Self {
            prompt: prompt.into(),
            size,
            quality,
        }
    }
}

/// A remote text-to-image service.
///
/// One call per invocation, no retries. Every failure comes back as a
/// [`GenerationError`]; image bytes are already decoded from the wire format.
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<Vec<u8>, GenerationError>> + Send;
}
