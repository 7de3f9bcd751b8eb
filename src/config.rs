use crate::api::{ImageQuality, ImageSize};
use crate::prompt::StylePreset;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
pub const DEFAULT_VIDEO_MODEL: &str = "gpt-video-1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_SECONDS_PER_SCENE: f64 = 3.0;

/// Connection settings for the remote generation service.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub video_model: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_models(mut self, image_model: impl Into<String>, video_model: impl Into<String>) -> Self {
        self.image_model = image_model.into();
        self.video_model = video_model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("image_model", &self.image_model)
            .field("video_model", &self.video_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Image parameters shared by every scene of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSettings {
    pub size: ImageSize,
    pub quality: ImageQuality,
    pub style: Option<StylePreset>,
    pub lock_character: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_api_key() {
        let config = ClientConfig::new("sk-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn defaults_target_square_low_quality() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.size, ImageSize::Square);
        assert_eq!(settings.quality, ImageQuality::Low);
        assert!(settings.style.is_none());
        assert!(!settings.lock_character);
    }
}
