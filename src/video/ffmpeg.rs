use super::FrameSink;
use crate::error::VideoError;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tempfile::NamedTempFile;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl EncodeConfig {
    pub fn validate(&self) -> Result<(), VideoError> {
        if self.width == 0 || self.height == 0 {
            return Err(VideoError::InvalidSettings(
                "frame width/height must be non-zero".to_string(),
            ));
        }
        if self.fps == 0 {
            return Err(VideoError::InvalidSettings("fps must be non-zero".to_string()));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(VideoError::InvalidSettings(format!(
                "frame size {}x{} must be even for yuv420p output",
                self.width, self.height
            )));
        }
        Ok(())
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

pub fn is_ffmpeg_available(ffmpeg_bin: &Path) -> bool {
    Command::new(ffmpeg_bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Pipes raw RGBA frames into an `ffmpeg` child writing an MP4 to a temp file.
pub struct FfmpegSink {
    cfg: EncodeConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: NamedTempFile,
}

impl FfmpegSink {
    pub fn spawn(ffmpeg_bin: &Path, cfg: EncodeConfig) -> Result<Self, VideoError> {
        cfg.validate()?;

        if !is_ffmpeg_available(ffmpeg_bin) {
            return Err(VideoError::EncoderUnavailable(format!(
                "'{}' was not found or did not run",
                ffmpeg_bin.display()
            )));
        }

        let output = tempfile::Builder::new()
            .prefix("imageking-")
            .suffix(".mp4")
            .tempfile()?;
        let out_path: PathBuf = output.path().to_path_buf();

        let mut cmd = Command::new(ffmpeg_bin);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ])
        .arg(&out_path);

        let mut child = cmd
            .spawn()
            .map_err(|e| VideoError::EncoderUnavailable(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VideoError::EncodeFailed("failed to open ffmpeg stdin".to_string()))?;

        info!(
            "Started ffmpeg encoder: {}x{} @ {} fps -> {}",
            cfg.width,
            cfg.height,
            cfg.fps,
            out_path.display()
        );

        Ok(Self {
            cfg,
            child: Some(child),
            stdin: Some(stdin),
            output,
        })
    }
}

impl FfmpegSink {
    /// Reaps a child that stopped reading frames and reports why it stopped.
    fn collect_exit_reason(&mut self) -> String {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return "encoder is already finalized".to_string();
        };
        match child.wait_with_output() {
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                format!("ffmpeg exited with {}: {}", output.status, stderr.trim())
            }
            Err(e) => format!("failed to wait for ffmpeg: {}", e),
        }
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), VideoError> {
        if rgba.len() != self.cfg.frame_len() {
            return Err(VideoError::WriteFrameError(format!(
                "frame has {} bytes, expected {}",
                rgba.len(),
                self.cfg.frame_len()
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VideoError::WriteFrameError(
                "encoder is already finalized".to_string(),
            ));
        };

        if let Err(e) = stdin.write_all(rgba) {
            let reason = self.collect_exit_reason();
            return Err(VideoError::WriteFrameError(format!(
                "ffmpeg stdin: {}; {}",
                e, reason
            )));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, VideoError> {
        drop(self.stdin.take());

        let child = self
            .child
            .take()
            .ok_or_else(|| VideoError::EncodeFailed("encoder is already finalized".to_string()))?;
        let output = child
            .wait_with_output()
            .map_err(|e| VideoError::EncodeFailed(format!("failed to wait for ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::EncodeFailed(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = std::fs::read(self.output.path())?;
        info!("Encoded video: {} bytes", bytes.len());
        Ok(bytes)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(width: u32, height: u32, fps: u32) -> EncodeConfig {
        EncodeConfig { width, height, fps }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(cfg(0, 10, 30).validate().is_err());
        assert!(cfg(11, 10, 30).validate().is_err());
        assert!(cfg(10, 10, 0).validate().is_err());
        assert!(cfg(1024, 1536, 30).validate().is_ok());
    }

    #[test]
    fn missing_binary_is_encoder_unavailable() {
        let bin = Path::new("/nonexistent/ffmpeg-for-imageking-tests");
        assert!(!is_ffmpeg_available(bin));

        let result = FfmpegSink::spawn(bin, cfg(4, 4, 30));
        assert!(matches!(result, Err(VideoError::EncoderUnavailable(_))));
    }

    #[cfg(unix)]
    fn failing_encoder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join("ffmpeg");
        std::fs::write(
            &bin,
            "#!/bin/sh\n\
             [ \"$1\" = \"-version\" ] && exit 0\n\
             echo \"Unknown encoder 'libx264'\" >&2\n\
             exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    #[cfg(unix)]
    #[test]
    fn write_failure_carries_encoder_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bin = failing_encoder(dir.path());

        // A freshly written script can briefly fail to exec with ETXTBSY.
        let mut sink = None;
        for _ in 0..20 {
            match FfmpegSink::spawn(&bin, cfg(256, 256, 10)) {
                Ok(s) => {
                    sink = Some(s);
                    break;
                }
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(50)),
            }
        }
        let mut sink = sink.expect("fake encoder should start");

        let frame = vec![0u8; 256 * 256 * 4];
        let err = (0..50)
            .find_map(|_| sink.write_frame(&frame).err())
            .expect("writes to an exited encoder should fail");

        match err {
            VideoError::WriteFrameError(message) => {
                assert!(message.contains("ffmpeg stdin"), "{}", message);
                assert!(message.contains("libx264"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn encodes_when_ffmpeg_is_present() {
        let bin = Path::new("ffmpeg");
        if !is_ffmpeg_available(bin) {
            eprintln!("ffmpeg not on PATH, skipping");
            return;
        }

        let mut sink = FfmpegSink::spawn(bin, cfg(16, 16, 10)).unwrap();
        let frame = vec![200u8; 16 * 16 * 4];
        for _ in 0..5 {
            sink.write_frame(&frame).unwrap();
        }
        let bytes = sink.finish().unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[4..8], b"ftyp");
    }
}
