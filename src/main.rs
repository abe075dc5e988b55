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


//! blecam daemon

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blecam::bluetooth::{
    BluezLink, ControlRequest, ControllerEvent, DeviceLinkController, LinkEvent,
};
use blecam::config::Config;
use blecam::events::EventProcessor;
use blecam::state::AppState;
use blecam::video::{FfmpegEncoder, FrameStore, VideoAssembler, VideoEncoder};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blecam=info".parse()?),
        )
        .init();

    info!("Starting blecam v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded, working directory {:?}", config.data_dir);

    let encoder = FfmpegEncoder::from_config(&config.video);
    info!("Video encoder: {}", encoder.backend_name());
    let assembler = Arc::new(VideoAssembler::new(
        &config.data_dir,
        encoder,
        config.video.framerate,
    ));

    // Create application state
    let state = AppState::new();

    let (link_tx, link_rx) = mpsc::channel::<LinkEvent>(256);
    let (event_tx, event_rx) = mpsc::channel::<ControllerEvent>(256);
    let (control_tx, control_rx) = mpsc::channel::<ControlRequest>(8);

    info!("Initializing BLE central...");
    let link = BluezLink::new(link_tx).await?;
    let controller = DeviceLinkController::new(
        link,
        config.bluetooth.clone(),
        FrameStore::new(&config.data_dir),
        event_tx,
    );
    info!(
        "Looking for '{}' advertising {}",
        config.bluetooth.device_name_filter, config.bluetooth.service_uuid
    );

    let processor = EventProcessor::new(assembler, state.clone());
    let processor_task = tokio::spawn(processor.run(event_rx));
    let mut controller_task = tokio::spawn(controller.run(link_rx, control_rx));

    info!("Ready.");

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        result = &mut controller_task => {
            if let Err(e) = result {
                error!("Controller task failed: {}", e);
            }
            false
        }
    };

    if interrupted {
        info!("Shutdown signal received");
        if control_tx.send(ControlRequest::Shutdown).await.is_err() {
            error!("Controller already stopped");
        }
        if let Err(e) = controller_task.await {
            error!("Controller task failed: {}", e);
        }
    }

    // The controller dropped its event sender; this drains pending video jobs.
    if let Err(e) = processor_task.await {
        error!("Event processor task failed: {}", e);
    }

    if let Some(video) = state.get_last_video() {
        info!("Last published video: {:?}", video);
    }
    info!("blecam stopped");
    Ok(())
}
