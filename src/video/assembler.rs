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

//! Turns the stored frames into one video and publishes it.

use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::encoder::{VideoEncoder, VideoJob};
use super::frames::FrameStore;
use crate::error::VideoError;

/// Encoded videos, relative to the working directory.
pub const VIDEOS_DIR: &str = "esp32_videos";

/// Published copies, relative to the working directory.
pub const PUBLIC_DIR: &str = "public_videos";

/// Video assembly pipeline over one working directory.
///
/// Jobs are serialized; a second `convert_to_video` waits for the first.
pub struct VideoAssembler<E: VideoEncoder> {
    frames: FrameStore,
    videos_dir: PathBuf,
    public_dir: PathBuf,
    encoder: E,
    default_framerate: u32,
    job_lock: Mutex<()>,
}

impl<E: VideoEncoder> VideoAssembler<E> {
    pub fn new(work_dir: &Path, encoder: E, default_framerate: u32) -> Self {
        Self {
            frames: FrameStore::new(work_dir),
            videos_dir: work_dir.join(VIDEOS_DIR),
            public_dir: work_dir.join(PUBLIC_DIR),
            encoder,
            default_framerate,
            job_lock: Mutex::new(()),
        }
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Encode every stored frame, in index order, into a new video.
    ///
    /// The first missing or empty frame aborts the job before the encoder
    /// runs. Gaps in the numbering are closed before encoding. Frames are
    /// deleted only after a successful encode.
    pub async fn convert_to_video(&self, framerate: Option<u32>) -> Result<PathBuf, VideoError> {
        let _job = self.job_lock.lock().await;

        let framerate = framerate.unwrap_or(self.default_framerate);
        if framerate == 0 {
            return Err(VideoError::EncodeSetup("framerate must be positive".to_string()));
        }

        let frames = self.frames.list_frames()?;
        if frames.is_empty() {
            return Err(VideoError::NoFrames(self.frames.dir().to_path_buf()));
        }
        validate_frames(&frames)?;

        // The pattern input stops at the first missing index
        let frames = self.frames.compact()?;

        fs::create_dir_all(&self.videos_dir)?;
        let output_path = self.next_output_path();

        let job = VideoJob {
            framerate,
            input_pattern: self.frames.dir().join("frame_%04d.jpg"),
            start_number: 0,
            frames,
            output_path,
        };

        info!(
            "Encoding {} frames at {} fps with {}",
            job.frames.len(),
            job.framerate,
            self.encoder.backend_name()
        );

        if let Err(e) = self.encoder.encode(&job).await {
            error!("Conversion failed: {}", e);
            return Err(e);
        }

        match fs::metadata(&job.output_path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                error!("Encoder reported success but {:?} is missing or empty", job.output_path);
                return Err(VideoError::EncodeFailure(format!(
                    "no output written to {}",
                    job.output_path.display()
                )));
            }
        }

        info!("Video conversion completed: {:?}", job.output_path);
        let removed = self.frames.clear();
        info!("Removed {} temporary frame files", removed);

        Ok(job.output_path)
    }

    /// Copy a finished video into the public directory under the same name.
    ///
    /// Returns `None` on any I/O error.
    pub fn publish(&self, source: &Path) -> Option<PathBuf> {
        let file_name = match source.file_name() {
            Some(name) => name,
            None => {
                error!("Cannot publish {:?}: no file name", source);
                return None;
            }
        };

        if let Err(e) = fs::create_dir_all(&self.public_dir) {
            error!("Error creating {:?}: {}", self.public_dir, e);
            return None;
        }

        let target = self.public_dir.join(file_name);
        match fs::copy(source, &target) {
            Ok(_) => {
                info!("File saved to public storage: {:?}", target);
                Some(target)
            }
            Err(e) => {
                error!("Error saving {:?} to public storage: {}", source, e);
                None
            }
        }
    }

    /// `output_{unixMillis}.mp4`, bumped past any existing file.
    fn next_output_path(&self) -> PathBuf {
        let mut millis = chrono::Utc::now().timestamp_millis();
        loop {
            let path = self.videos_dir.join(format!("output_{}.mp4", millis));
            if !path.exists() {
                return path;
            }
            millis += 1;
        }
    }
}

/// Abort on the first frame that is missing or empty.
fn validate_frames(frames: &[PathBuf]) -> Result<(), VideoError> {
    for path in frames {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => {
                warn!("Invalid frame {}, aborting job", name);
                return Err(VideoError::InvalidFrame(name));
            }
        }
    }

    Ok(())
}
