// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! External video encoder abstraction and the ffmpeg backend.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::VideoConfig;
use crate::error::VideoError;

/// One encode invocation over an ordered frame set.
#[derive(Debug, Clone)]
pub struct VideoJob {
    /// Input frames per second.
    pub framerate: u32,
    /// Input file pattern with a 4-digit numeric placeholder.
    pub input_pattern: PathBuf,
    /// Index of the first frame the pattern should start from.
    pub start_number: u32,
    /// Frames in playback order.
    pub frames: Vec<PathBuf>,
    pub output_path: PathBuf,
}

/// Trait for video encoding backends.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Get the backend name (e.g., "ffmpeg").
    fn backend_name(&self) -> &'static str;

    /// Encode the job's frames into `job.output_path`.
    async fn encode(&self, job: &VideoJob) -> Result<(), VideoError>;
}

/// Encoder that shells out to the ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    codec: String,
    preset: String,
    output_width: u32,
}

impl FfmpegEncoder {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            program: config.encoder_path.clone(),
            codec: config.codec.clone(),
            preset: config.preset.clone(),
            output_width: config.output_width,
        }
    }

    /// Command-line arguments for a job.
    pub fn args(&self, job: &VideoJob) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-framerate".to_string(),
            job.framerate.to_string(),
            "-start_number".to_string(),
            job.start_number.to_string(),
            "-i".to_string(),
            job.input_pattern.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2,format=yuv420p", self.output_width),
            "-movflags".to_string(),
            "+faststart".to_string(),
            job.output_path.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn backend_name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn encode(&self, job: &VideoJob) -> Result<(), VideoError> {
        let args = self.args(job);
        info!("Started {} with: {} {}", self.backend_name(), self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VideoError::EncodeSetup(format!("failed to run {}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!("{} stderr: {}", self.backend_name(), line);
        }

        if output.status.success() {
            return Ok(());
        }

        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output");
        Err(VideoError::EncodeFailure(format!(
            "{} exited with {}: {}",
            self.program, output.status, reason
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VideoJob {
        VideoJob {
            framerate: 12,
            input_pattern: PathBuf::from("/w/esp32_images/frame_%04d.jpg"),
            start_number: 0,
            frames: vec![PathBuf::from("/w/esp32_images/frame_0000.jpg")],
            output_path: PathBuf::from("/w/esp32_videos/output_1.mp4"),
        }
    }

    #[test]
    fn test_ffmpeg_args() {
        let encoder = FfmpegEncoder::from_config(&VideoConfig::default());
        let args = encoder.args(&job());

        let joined = args.join(" ");
        assert!(joined.starts_with("-y -framerate 12 -start_number 0 -i /w/esp32_images/frame_%04d.jpg"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset ultrafast"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("-vf scale=800:-2,format=yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().unwrap(), "/w/esp32_videos/output_1.mp4");
    }

    #[tokio::test]
    async fn test_missing_executable_is_setup_error() {
        let config = VideoConfig {
            encoder_path: "/nonexistent/blecam-ffmpeg".to_string(),
            ..VideoConfig::default()
        };
        let encoder = FfmpegEncoder::from_config(&config);

        let err = encoder.encode(&job()).await.unwrap_err();
        assert!(matches!(err, VideoError::EncodeSetup(_)));
    }
}
