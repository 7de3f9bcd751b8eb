mod ffmpeg;

pub use ffmpeg::{EncodeConfig, FfmpegSink};

use crate::config::DEFAULT_FRAME_RATE;
use crate::error::VideoError;
use crate::scene::Scene;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::info;

/// Download name for the assembled video.
pub const OUTPUT_FILE_NAME: &str = "imageking_output.mp4";
pub const OUTPUT_MIME: &str = "video/mp4";

/// Longest hold accepted for a single scene image.
pub const MAX_SECONDS_PER_SCENE: f64 = 600.0;

/// Receives raw RGBA frames in presentation order.
pub trait FrameSink {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), VideoError>;

    /// Finalizes the stream and returns the complete container bytes.
    fn finish(self) -> Result<Vec<u8>, VideoError>;
}

/// How many frames one scene image is held for, never fewer than one.
pub fn frames_per_scene(seconds_per_scene: f64, frame_rate: u32) -> u64 {
    let frames = (seconds_per_scene * f64::from(frame_rate)).round();
    if frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

fn validate_hold(seconds_per_scene: f64) -> Result<(), VideoError> {
    if !seconds_per_scene.is_finite() || seconds_per_scene > MAX_SECONDS_PER_SCENE {
        return Err(VideoError::InvalidSettings(format!(
            "seconds per scene must be finite and at most {}, got {}",
            MAX_SECONDS_PER_SCENE, seconds_per_scene
        )));
    }
    Ok(())
}

/// Turns generated scene images into a single MP4, one held image per scene.
#[derive(Debug, Clone)]
pub struct VideoAssembler {
    ffmpeg_bin: PathBuf,
    frame_rate: u32,
}

impl Default for VideoAssembler {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoAssembler {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn assemble(&self, scenes: &[Scene], seconds_per_scene: f64) -> Result<Vec<u8>, VideoError> {
        self.assemble_with(scenes, seconds_per_scene, |cfg| {
            FfmpegSink::spawn(&self.ffmpeg_bin, cfg)
        })
    }

    /// Same as [`assemble`](Self::assemble) with a caller-provided encoder.
    ///
    /// Scenes without an image are skipped; the rest are written in ascending
    /// id order. All images must share one size.
    pub fn assemble_with<S, F>(
        &self,
        scenes: &[Scene],
        seconds_per_scene: f64,
        open_sink: F,
    ) -> Result<Vec<u8>, VideoError>
    where
        S: FrameSink,
        F: FnOnce(EncodeConfig) -> Result<S, VideoError>,
    {
        let mut qualifying: Vec<&Scene> = scenes
            .iter()
            .filter(|scene| scene.image_payload().is_some())
            .collect();
        if qualifying.is_empty() {
            return Err(VideoError::NoImages);
        }
        qualifying.sort_by_key(|scene| scene.id);
        validate_hold(seconds_per_scene)?;

        let (width, height) = check_dimensions(&qualifying)?;
        let repeat = frames_per_scene(seconds_per_scene, self.frame_rate);

        info!(
            "Assembling video from {} images ({}x{}, {} frames each at {} fps)",
            qualifying.len(),
            width,
            height,
            repeat,
            self.frame_rate
        );

        let mut sink = open_sink(EncodeConfig {
            width,
            height,
            fps: self.frame_rate,
        })?;

        for scene in &qualifying {
            let rgba = decode_rgba(scene)?;
            for _ in 0..repeat {
                sink.write_frame(&rgba)?;
            }
            info!("Scene {}: wrote {} frames", scene.id, repeat);
        }

        sink.finish()
    }
}

fn payload(scene: &Scene) -> Result<&[u8], VideoError> {
    scene.image_payload().ok_or(VideoError::NoImages)
}

fn decode_error(scene: &Scene, detail: impl ToString) -> VideoError {
    VideoError::ImageDecode {
        scene_id: scene.id,
        detail: detail.to_string(),
    }
}

/// Reads only the image headers; every image must match the first one's size.
fn check_dimensions(scenes: &[&Scene]) -> Result<(u32, u32), VideoError> {
    let mut expected: Option<(u32, u32)> = None;

    for scene in scenes {
        let (got_width, got_height) = image::ImageReader::new(Cursor::new(payload(scene)?))
            .with_guessed_format()
            .map_err(|e| decode_error(scene, e))?
            .into_dimensions()
            .map_err(|e| decode_error(scene, e))?;

        match expected {
            None => expected = Some((got_width, got_height)),
            Some((width, height)) if (got_width, got_height) != (width, height) => {
                return Err(VideoError::FrameSizeMismatch {
                    scene_id: scene.id,
                    got_width,
                    got_height,
                    width,
                    height,
                });
            }
            Some(_) => {}
        }
    }

    expected.ok_or(VideoError::NoImages)
}

fn decode_rgba(scene: &Scene) -> Result<Vec<u8>, VideoError> {
    let rgba = image::load_from_memory(payload(scene)?)
        .map_err(|e| decode_error(scene, e))?
        .to_rgba8();
    Ok(rgba.into_raw())
}
