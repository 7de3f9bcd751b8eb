use crate::api::{GenerationRequest, ImageGenerator};
use crate::config::{GenerationSettings, DEFAULT_CONCURRENCY};
use crate::error::GenerationError;
use crate::prompt;
use crate::scene::Scene;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Per-batch counts returned by [`BulkDispatcher::dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Runs one generation task per prompt-bearing scene under a concurrency cap.
pub struct BulkDispatcher<G> {
    generator: Arc<G>,
    settings: GenerationSettings,
    concurrency_limit: usize,
}

impl<G: ImageGenerator> BulkDispatcher<G> {
    pub fn new(generator: Arc<G>, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
            concurrency_limit: DEFAULT_CONCURRENCY,
        }
    }

    /// A limit of zero is treated as one.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Builds the request for one scene from the batch settings.
    pub fn request_for(&self, scene: &Scene) -> GenerationRequest {
        let final_prompt = prompt::compose(
            &scene.prompt,
            self.settings.style,
            self.settings.lock_character,
        );
        GenerationRequest::new(final_prompt, self.settings.size, self.settings.quality)
    }

    /// Generates images for every scene with a non-empty prompt.
    ///
    /// Each outcome is written back to the slot of the scene that produced it,
    /// so the result mapping never depends on completion order. A failing or
    /// panicking task only marks its own scene as failed.
    pub async fn dispatch(&self, scenes: &mut [Scene]) -> DispatchSummary {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut summary = DispatchSummary::default();
        let mut tasks: Vec<(usize, JoinHandle<Result<Vec<u8>, GenerationError>>)> = Vec::new();

        for (slot, scene) in scenes.iter().enumerate() {
            if !scene.has_prompt() {
                info!("Scene {} has no prompt, skipping", scene.id);
                summary.skipped += 1;
                continue;
            }

            let request = self.request_for(scene);
            let generator = Arc::clone(&self.generator);
            let semaphore = Arc::clone(&semaphore);
            let scene_id = scene.id;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    GenerationError::TaskFailed(format!("worker pool closed: {}", e))
                })?;
                info!("Scene {}: generation started", scene_id);
                generator.generate_image(&request).await
            });
            tasks.push((slot, handle));
        }

        summary.submitted = tasks.len();
        info!(
            "Dispatched {} generation tasks (concurrency {})",
            summary.submitted, self.concurrency_limit
        );

        for (slot, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(GenerationError::TaskFailed(join_err.to_string())),
            };

            let scene = &mut scenes[slot];
            match &outcome {
                Ok(bytes) => {
                    info!("Scene {}: image ready ({} bytes)", scene.id, bytes.len());
                    summary.succeeded += 1;
                }
                Err(err) => {
                    warn!("Scene {}: generation failed: {}", scene.id, err);
                    summary.failed += 1;
                }
            }
            scene.record(outcome);
        }

        info!(
            "Generation finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{ImageQuality, ImageSize};
    use crate::prompt::{StylePreset, SCENE_LABEL};
    use crate::scene::{parse_script, SceneStatus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers with the prompt's own bytes after a per-prompt delay.
    #[derive(Default)]
    pub(crate) struct FakeGenerator {
        pub delays_ms: HashMap<String, u64>,
        pub fail_on: Option<String>,
        pub panic_on: Option<String>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub calls: Mutex<Vec<GenerationRequest>>,
    }

    impl ImageGenerator for FakeGenerator {
        async fn generate_image(
            &self,
            request: &GenerationRequest,
        ) -> Result<Vec<u8>, GenerationError> {
            self.calls.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .delays_ms
                .iter()
                .find(|(key, _)| request.prompt.contains(key.as_str()))
                .map(|(_, ms)| *ms)
                .unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = &self.panic_on {
                if request.prompt.contains(marker.as_str()) {
                    panic!("fake generator blew up");
                }
            }
            if let Some(marker) = &self.fail_on {
                if request.prompt.contains(marker.as_str()) {
                    return Err(GenerationError::RequestRejected("unsafe prompt".into()));
                }
            }
            Ok(request.prompt.as_bytes().to_vec())
        }
    }

    fn numbered_script(count: u32) -> String {
        (1..=count)
            .map(|i| format!("{}\nScene {} text.\nShot on take-{}.", i, i, i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn results_follow_scenes_not_completion_order() {
        let mut delays = HashMap::new();
        delays.insert("take-1.".to_string(), 80);
        delays.insert("take-2.".to_string(), 40);
        delays.insert("take-3.".to_string(), 1);
        let generator = Arc::new(FakeGenerator {
            delays_ms: delays,
            ..Default::default()
        });

        let mut scenes = parse_script(&numbered_script(3));
        let dispatcher = BulkDispatcher::new(generator, GenerationSettings::default());
        let summary = dispatcher.dispatch(&mut scenes).await;

        assert_eq!(summary.succeeded, 3);
        for scene in &scenes {
            let payload = scene.image_payload().expect("image present");
            assert_eq!(payload, scene.prompt.as_bytes());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let generator = Arc::new(FakeGenerator {
            fail_on: Some("take-2.".to_string()),
            ..Default::default()
        });

        let mut scenes = parse_script(&numbered_script(4));
        let summary = BulkDispatcher::new(generator, GenerationSettings::default())
            .dispatch(&mut scenes)
            .await;

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            scenes[1].generation_error(),
            Some(GenerationError::RequestRejected(_))
        ));
        for idx in [0, 2, 3] {
            assert!(scenes[idx].image_payload().is_some());
        }
    }

    #[tokio::test]
    async fn panicking_task_is_recorded_as_failure() {
        let generator = Arc::new(FakeGenerator {
            panic_on: Some("take-1.".to_string()),
            ..Default::default()
        });

        let mut scenes = parse_script(&numbered_script(3));
        let summary = BulkDispatcher::new(generator, GenerationSettings::default())
            .dispatch(&mut scenes)
            .await;

        assert_eq!(summary.failed, 1);
        assert!(matches!(
            scenes[0].generation_error(),
            Some(GenerationError::TaskFailed(_))
        ));
        assert!(scenes[1].image_payload().is_some());
        assert!(scenes[2].image_payload().is_some());
    }

    #[tokio::test]
    async fn empty_prompts_are_skipped() {
        let generator = Arc::new(FakeGenerator::default());
        let mut scenes = parse_script("1\nA cat.\nShot on 35mm.\n\n2\nA dog.");

        let summary = BulkDispatcher::new(Arc::clone(&generator), GenerationSettings::default())
            .dispatch(&mut scenes)
            .await;

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(generator.calls.lock().unwrap().len(), 1);
        assert!(scenes[0].image_payload().is_some());
        assert_eq!(scenes[1].status, SceneStatus::Pending);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let generator = Arc::new(FakeGenerator::default());
        let mut scenes = parse_script(&numbered_script(10));

        let summary = BulkDispatcher::new(Arc::clone(&generator), GenerationSettings::default())
            .with_concurrency_limit(2)
            .dispatch(&mut scenes)
            .await;

        assert_eq!(summary.succeeded, 10);
        assert!(generator.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert!(generator.max_in_flight.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn requests_carry_batch_settings() {
        let generator = Arc::new(FakeGenerator::default());
        let settings = GenerationSettings {
            size: ImageSize::Portrait,
            quality: ImageQuality::High,
            style: Some(StylePreset::Cinematic),
            lock_character: false,
        };
        let mut scenes = parse_script("1\nA cat.\nShot on 35mm.");

        BulkDispatcher::new(Arc::clone(&generator), settings)
            .dispatch(&mut scenes)
            .await;

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].size, ImageSize::Portrait);
        assert_eq!(calls[0].quality, ImageQuality::High);
        assert!(calls[0].prompt.starts_with(StylePreset::Cinematic.template()));
        assert!(calls[0].prompt.ends_with(&format!("{}\nShot on 35mm.", SCENE_LABEL)));
    }

    #[test]
    fn zero_limit_is_clamped() {
        let dispatcher = BulkDispatcher::new(
            Arc::new(FakeGenerator::default()),
            GenerationSettings::default(),
        )
        .with_concurrency_limit(0);
        assert_eq!(dispatcher.concurrency_limit, 1);
    }
}
