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


//! Event processing and video orchestration.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bluetooth::ControllerEvent;
use crate::state::AppState;
use crate::video::{VideoAssembler, VideoEncoder};

/// Consumes controller events and runs the video pipeline when a batch
/// completes.
pub struct EventProcessor<E: VideoEncoder + 'static> {
    assembler: Arc<VideoAssembler<E>>,
    state: Arc<AppState>,
    framerate: Option<u32>,
    jobs: Vec<JoinHandle<Option<PathBuf>>>,
}

impl<E: VideoEncoder + 'static> EventProcessor<E> {
    /// Create a new event processor.
    pub fn new(assembler: Arc<VideoAssembler<E>>, state: Arc<AppState>) -> Self {
        Self {
            assembler,
            state,
            framerate: None,
            jobs: Vec::new(),
        }
    }

    /// Override the assembler's default framerate for every job.
    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = Some(framerate);
        self
    }

    /// Process a single event.
    pub async fn process_event(&mut self, event: ControllerEvent) -> Result<()> {
        match event {
            ControllerEvent::StateChanged(status) => {
                info!("Status: {}", status.as_str());
                self.state.set_status(status);
            }
            ControllerEvent::DeviceFound(info) => {
                debug!("Device found: {} ({})", info.display_name(), info.id);
            }
            ControllerEvent::ServicesDiscovered => {
                info!("Ready to receive images");
            }
            ControllerEvent::CommandSent(command) => {
                debug!("Command sent: {}", command);
            }
            ControllerEvent::DataReceived { data, is_complete } => {
                debug!("Image received: {} bytes (complete: {})", data.len(), is_complete);
                self.state.record_image();
            }
            ControllerEvent::FrameSaved { index, path } => {
                debug!("Frame {} saved to {:?}", index, path);
            }
            ControllerEvent::MetadataReceived(total) => {
                info!("Expecting {} images", total);
                self.state.begin_batch(total);
            }
            ControllerEvent::TransferComplete => {
                self.spawn_video_job();
            }
            ControllerEvent::Error { kind, message } => {
                error!("Device link error: {}: {}", kind, message);
                self.state.set_error(format!("{}: {}", kind, message));
            }
        }
        Ok(())
    }

    /// Convert the persisted frames and publish the result in the background.
    fn spawn_video_job(&mut self) {
        self.jobs.retain(|job| !job.is_finished());

        let assembler = self.assembler.clone();
        let state = self.state.clone();
        let framerate = self.framerate;
        info!("Transfer complete, assembling video");

        self.jobs.push(tokio::spawn(async move {
            state.set_converting(true);
            let published = run_video_job(&assembler, &state, framerate).await;
            state.set_converting(false);
            published
        }));
    }

    /// Wait for every running video job. Returns the published paths.
    pub async fn wait_for_jobs(&mut self) -> Vec<Option<PathBuf>> {
        let mut results = Vec::new();
        for job in self.jobs.drain(..) {
            match job.await {
                Ok(published) => results.push(published),
                Err(e) => {
                    error!("Video job panicked: {}", e);
                    results.push(None);
                }
            }
        }
        results
    }

    /// Process events until the controller goes away.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControllerEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.process_event(event).await {
                error!("Failed to process event: {}", e);
            }
        }

        info!("Event stream closed, waiting for video jobs");
        self.wait_for_jobs().await;
    }
}

async fn run_video_job<E: VideoEncoder>(
    assembler: &VideoAssembler<E>,
    state: &AppState,
    framerate: Option<u32>,
) -> Option<PathBuf> {
    let output = match assembler.convert_to_video(framerate).await {
        Ok(output) => output,
        Err(e) => {
            error!("Video assembly failed: {}", e);
            state.set_error(e.to_string());
            return None;
        }
    };
    info!("Video created: {:?}", output);

    match assembler.publish(&output) {
        Some(published) => {
            info!("Video published: {:?}", published);
            state.set_last_video(published.clone());
            Some(published)
        }
        None => {
            warn!("Publishing {:?} failed", output);
            state.set_error(format!("Failed to publish {:?}", output));
            None
        }
    }
}
