mod api;
mod config;
mod dispatch;
mod error;
mod prompt;
mod scene;
mod video;

use anyhow::Context;
use api::{ImageQuality, ImageSize, OpenAiClient};
use clap::Parser;
use config::{ClientConfig, GenerationSettings};
use prompt::StylePreset;
use scene::Session;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use video::VideoAssembler;

#[derive(Parser, Debug)]
#[command(name = "imageking")]
#[command(about = "Generate one image per numbered scene and hold them into an MP4", long_about = None)]
struct Args {
    /// Script text
    #[arg(short, long)]
    text: Option<String>,

    /// Script file path
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Output video file path
    #[arg(short, long, default_value = video::OUTPUT_FILE_NAME)]
    output: PathBuf,

    /// Also write each generated image as scene_<id>.png into this directory
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Image size: square, landscape, portrait (or WxH)
    #[arg(long, default_value = "square")]
    size: String,

    #[arg(long, value_enum, default_value_t = ImageQuality::Low)]
    quality: ImageQuality,

    /// Style preset applied to every scene
    #[arg(long, value_enum)]
    style: Option<StylePreset>,

    /// Keep the same main character across scenes
    #[arg(long)]
    lock_character: bool,

    /// Maximum concurrent generation requests
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    #[arg(long, default_value_t = config::DEFAULT_SECONDS_PER_SCENE)]
    seconds_per_scene: f64,

    #[arg(long, default_value_t = config::DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Only generate images
    #[arg(long)]
    no_video: bool,

    /// Print the per-scene summary as JSON
    #[arg(long)]
    json: bool,

    /// Ask the service for a video instead of assembling one locally
    #[arg(long, conflicts_with = "no_video")]
    remote_video: bool,

    /// Override a scene prompt, as ID=PROMPT (repeatable)
    #[arg(long = "set-prompt", value_parser = parse_prompt_override)]
    prompt_overrides: Vec<(u32, String)>,

    /// Regenerate rate-limited or dropped scenes once, one at a time
    #[arg(long)]
    retry_failed: bool,

    /// Seconds to wait before the retry pass
    #[arg(long, default_value_t = 5)]
    retry_backoff_secs: u64,

    /// API key for the generation service
    #[arg(long, env = "GPT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "GPT_API_BASE", default_value = config::DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, default_value = config::DEFAULT_IMAGE_MODEL)]
    image_model: String,

    #[arg(long, default_value = config::DEFAULT_VIDEO_MODEL)]
    video_model: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// ffmpeg binary used for local assembly
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let Some(api_key) = args.api_key.clone().filter(|key| !key.trim().is_empty()) else {
        error!("GPT_API_KEY not found. Set it via --api-key, the environment or a .env file");
        std::process::exit(1);
    };

    let script = if let Some(text) = &args.text {
        text.clone()
    } else if let Some(path) = &args.file {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script file: {}", path.display()))?
    } else {
        error!("Either --text or --file must be provided");
        std::process::exit(1);
    };

    let client_config = ClientConfig::new(api_key)
        .with_api_base(args.api_base.clone())
        .with_models(args.image_model.clone(), args.video_model.clone())
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let settings = GenerationSettings {
        size: ImageSize::normalize(&args.size),
        quality: args.quality,
        style: args.style,
        lock_character: args.lock_character,
    };

    info!("Starting imageking...");
    info!("Script length: {} characters", script.len());

    if let Err(e) = run_generation(&args, &script, client_config, settings).await {
        error!("Generation failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_generation(
    args: &Args,
    script: &str,
    client_config: ClientConfig,
    settings: GenerationSettings,
) -> anyhow::Result<()> {
    let client = Arc::new(OpenAiClient::new(client_config)?);
    let mut session = Session::new(settings);

    info!("Step 1/3: Parsing script...");
    let count = session.load_script(script)?;
    info!("Found {} scenes", count);

    for (id, prompt) in &args.prompt_overrides {
        session.set_prompt(*id, prompt.clone())?;
        info!("Scene {}: prompt overridden", id);
    }

    if args.remote_video {
        info!("Step 2/3: Requesting remote video...");
        let bytes = client.generate_video(&session.combined_prompt()).await?;
        write_output(&args.output, &bytes).await?;
        info!("Step 3/3: Video saved to {}", args.output.display());
        return Ok(());
    }

    info!("Step 2/3: Generating images...");
    session
        .generate_all(Arc::clone(&client), args.concurrency)
        .await;

    if args.retry_failed {
        let retryable = session.retryable_failed_ids();

        if !retryable.is_empty() {
            info!(
                "Retrying {} scenes in {}s...",
                retryable.len(),
                args.retry_backoff_secs
            );
            tokio::time::sleep(Duration::from_secs(args.retry_backoff_secs)).await;
        }
        for id in retryable {
            if let Err(e) = session.regenerate(id, client.as_ref()).await {
                warn!("Scene {}: retry skipped: {}", id, e);
            }
        }
    }

    print_summary(&session, args.json)?;

    if let Some(dir) = &args.images_dir {
        save_images(&session, dir).await?;
    }

    if args.no_video {
        info!("Step 3/3: Skipped video assembly");
        return Ok(());
    }

    info!("Step 3/3: Assembling video...");
    let assembler = VideoAssembler::new(args.ffmpeg.clone()).with_frame_rate(args.fps);
    let seconds_per_scene = args.seconds_per_scene;
    let bytes = tokio::task::spawn_blocking(move || {
        session.assemble_video(&assembler, seconds_per_scene)
    })
    .await
    .context("Video assembly task failed")??;

    write_output(&args.output, &bytes).await?;
    info!(
        "Video saved to {} ({} bytes, {})",
        args.output.display(),
        bytes.len(),
        video::OUTPUT_MIME
    );
    Ok(())
}

fn parse_prompt_override(value: &str) -> Result<(u32, String), String> {
    let (id, prompt) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PROMPT, got '{}'", value))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid scene id '{}': {}", id.trim(), e))?;
    Ok((id, prompt.trim().to_string()))
}

#[derive(Serialize)]
struct SceneReport<'a> {
    id: u32,
    source_text: &'a str,
    prompt: &'a str,
    image_bytes: Option<usize>,
    error: Option<String>,
}

fn print_summary(session: &Session, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let reports: Vec<SceneReport<'_>> = session
            .scenes()
            .iter()
            .map(|scene| SceneReport {
                id: scene.id,
                source_text: &scene.source_text,
                prompt: &scene.prompt,
                image_bytes: scene.image_payload().map(<[u8]>::len),
                error: scene.generation_error().map(ToString::to_string),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for scene in session.scenes() {
        match (scene.image_payload(), scene.generation_error()) {
            (Some(bytes), _) => println!("[{}] ok    image ({} bytes)", scene.id, bytes.len()),
            (None, Some(err)) => println!("[{}] error {}", scene.id, err),
            (None, None) => println!("[{}] skip  no prompt", scene.id),
        }
    }
    Ok(())
}

async fn save_images(session: &Session, dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create images directory: {}", dir.display()))?;

    for scene in session.scenes() {
        if let Some(bytes) = scene.image_payload() {
            let path = dir.join(format!("scene_{}.png", scene.id));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Image saved to: {}", path.display());
        }
    }
    Ok(())
}

async fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write output: {}", path.display()))
}
