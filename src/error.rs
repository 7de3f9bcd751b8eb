use thiserror::Error;

/// Script loading failures. Both are user-correctable input errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script is empty")]
    EmptyScript,

    #[error("no numbered scenes found in script")]
    NoScenesParsed,
}

/// Outcome of a single remote generation call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("request rejected: {0}")]
    RequestRejected(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("generation task failed: {0}")]
    TaskFailed(String),
}

impl GenerationError {
    /// Whether a caller may reasonably retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TransportFailure(_))
    }
}

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("no scene has a generated image")]
    NoImages,

    #[error("video encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("failed to write frame: {0}")]
    WriteFrameError(String),

    #[error("image for scene {scene_id} is {got_width}x{got_height}, expected {width}x{height}")]
    FrameSizeMismatch {
        scene_id: u32,
        got_width: u32,
        got_height: u32,
        width: u32,
        height: u32,
    },

    #[error("failed to decode image for scene {scene_id}: {detail}")]
    ImageDecode { scene_id: u32, detail: String },

    #[error("invalid video settings: {0}")]
    InvalidSettings(String),

    #[error("encoder failed: {0}")]
    EncodeFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("no scene with id {0}")]
    UnknownScene(u32),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Video(#[from] VideoError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(GenerationError::RateLimited("slow down".into()).is_retryable());
        assert!(GenerationError::TransportFailure("reset".into()).is_retryable());
        assert!(!GenerationError::RequestRejected("bad size".into()).is_retryable());
        assert!(!GenerationError::EmptyPrompt.is_retryable());
    }

    #[test]
    fn session_error_keeps_inner_message() {
        let err: SessionError = GenerationError::RateLimited("quota".into()).into();
        assert_eq!(err.to_string(), "rate limited: quota");
    }
}
