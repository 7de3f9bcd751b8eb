use super::{parse_script, Scene};
use crate::api::{GenerationRequest, ImageGenerator};
use crate::config::GenerationSettings;
use crate::dispatch::{BulkDispatcher, DispatchSummary};
use crate::error::{GenerationError, Result, ScriptError, SessionError};
use crate::prompt;
use crate::video::VideoAssembler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Scene batch plus the settings it is generated with.
#[derive(Debug, Clone, Default)]
pub struct Session {
    scenes: Vec<Scene>,
    settings: GenerationSettings,
}

impl Session {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            scenes: Vec::new(),
            settings,
        }
    }

    /// Scenes in ascending id order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, id: u32) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id == id)
    }

    /// Parses a script and replaces the current batch with it.
    ///
    /// A repeated scene number keeps the block that appears last.
    pub fn load_script(&mut self, raw_text: &str) -> std::result::Result<usize, ScriptError> {
        if raw_text.trim().is_empty() {
            return Err(ScriptError::EmptyScript);
        }

        let parsed = parse_script(raw_text);
        if parsed.is_empty() {
            return Err(ScriptError::NoScenesParsed);
        }

        let mut by_id: BTreeMap<u32, Scene> = BTreeMap::new();
        for scene in parsed {
            let id = scene.id;
            if by_id.insert(id, scene).is_some() {
                warn!("Scene {} appears more than once, keeping the last block", id);
            }
        }

        self.scenes = by_id.into_values().collect();
        info!("Loaded {} scenes", self.scenes.len());
        Ok(self.scenes.len())
    }

    pub fn set_prompt(&mut self, id: u32, prompt: impl Into<String>) -> Result<()> {
        let scene = self.scene_mut(id)?;
        scene.prompt = prompt.into();
        Ok(())
    }

    /// Generates every prompt-bearing scene with this session's settings.
    pub async fn generate_all<G: ImageGenerator>(
        &mut self,
        generator: Arc<G>,
        concurrency_limit: usize,
    ) -> DispatchSummary {
        let dispatcher =
            BulkDispatcher::new(generator, self.settings).with_concurrency_limit(concurrency_limit);
        dispatcher.dispatch(&mut self.scenes).await
    }

    /// Regenerates one scene, leaving every other scene as it was.
    pub async fn regenerate<G: ImageGenerator>(&mut self, id: u32, generator: &G) -> Result<&Scene> {
        let settings = self.settings;
        let scene = self.scene_mut(id)?;
        if !scene.has_prompt() {
            return Err(SessionError::Generation(GenerationError::EmptyPrompt));
        }

        let request = GenerationRequest::new(
            prompt::compose(&scene.prompt, settings.style, settings.lock_character),
            settings.size,
            settings.quality,
        );

        info!("Regenerating scene {}", id);
        let outcome = generator.generate_image(&request).await;
        if let Err(err) = &outcome {
            warn!("Scene {}: regeneration failed: {}", id, err);
        }
        scene.record(outcome);
        Ok(&*scene)
    }

    /// Ids of scenes whose last attempt failed.
    pub fn failed_ids(&self) -> Vec<u32> {
        self.scenes
            .iter()
            .filter(|scene| scene.generation_error().is_some())
            .map(|scene| scene.id)
            .collect()
    }

    /// Ids of failed scenes whose error is worth another attempt.
    pub fn retryable_failed_ids(&self) -> Vec<u32> {
        self.scenes
            .iter()
            .filter(|scene| scene.generation_error().is_some_and(GenerationError::is_retryable))
            .map(|scene| scene.id)
            .collect()
    }

    pub fn assemble_video(
        &self,
        assembler: &VideoAssembler,
        seconds_per_scene: f64,
    ) -> Result<Vec<u8>> {
        Ok(assembler.assemble(&self.scenes, seconds_per_scene)?)
    }

    /// Composed prompts of every prompt-bearing scene, for one-shot remote video.
    pub fn combined_prompt(&self) -> String {
        self.scenes
            .iter()
            .filter(|scene| scene.has_prompt())
            .map(|scene| {
                format!(
                    "Scene {}: {}",
                    scene.id,
                    prompt::compose(&scene.prompt, self.settings.style, self.settings.lock_character)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn scene_mut(&mut self, id: u32) -> Result<&mut Scene> {
        self.scenes
            .iter_mut()
            .find(|scene| scene.id == id)
            .ok_or(SessionError::UnknownScene(id))
    }
}
