mod parser;
mod session;

pub use parser::parse_script;
pub use session::Session;

use crate::error::GenerationError;

/// Generation state of one scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SceneStatus {
    #[default]
    Pending,
    Generated(Vec<u8>),
    Failed(GenerationError),
}

/// One numbered block of the script
#[derive(Debug, Clone)]
pub struct Scene {
    /// Scene number as written in the script
    pub id: u32,
    /// Narrative text before the directive marker
    pub source_text: String,
    /// Generation prompt, empty when the block has no directive
    pub prompt: String,
    pub status: SceneStatus,
}

impl Scene {
    pub fn new(id: u32, source_text: String, prompt: String) -> Self {
        Self {
            id,
            source_text,
            prompt,
            status: SceneStatus::Pending,
        }
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    pub fn image_payload(&self) -> Option<&[u8]> {
        match &self.status {
            SceneStatus::Generated(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn generation_error(&self) -> Option<&GenerationError> {
        match &self.status {
            SceneStatus::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Records the outcome of one generation attempt, replacing any earlier one.
    pub fn record(&mut self, outcome: std::result::Result<Vec<u8>, GenerationError>) {
        self.status = match outcome {
            Ok(bytes) => SceneStatus::Generated(bytes),
            Err(err) => SceneStatus::Failed(err),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_switches_between_image_and_error() {
        let mut scene = Scene::new(3, "A cat.".into(), "Shot on film.".into());
        assert!(scene.image_payload().is_none());
        assert!(scene.generation_error().is_none());

        scene.record(Err(GenerationError::RateLimited("later".into())));
        assert!(scene.image_payload().is_none());
        assert!(scene.generation_error().is_some());

        scene.record(Ok(vec![1, 2, 3]));
        assert_eq!(scene.image_payload(), Some(&[1u8, 2, 3][..]));
        assert!(scene.generation_error().is_none());
    }

    #[test]
    fn whitespace_prompt_counts_as_empty() {
        let scene = Scene::new(1, "text".into(), "  \n ".into());
        assert!(!scene.has_prompt());
    }
}
