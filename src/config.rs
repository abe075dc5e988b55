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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::ble_constants::{
    COMMAND_UUID, DATA_UUID, DEFAULT_DEVICE_NAME_FILTER, SERVICE_UUID,
};

const APP_DIR: &str = "blecam";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working directory for frames, videos and published copies.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    /// Video settings.
    #[serde(default)]
    pub video: VideoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// GATT service the camera advertises.
    pub service_uuid: Uuid,

    /// Command characteristic (metadata in, acknowledgements out).
    pub command_uuid: Uuid,

    /// Data characteristic (image fragments).
    pub data_uuid: Uuid,

    /// Connect to the first peripheral whose name contains this.
    pub device_name_filter: String,

    /// Drop a partial frame after this many seconds without data. 0 disables.
    pub idle_timeout_secs: u64,
}

impl BluetoothConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            command_uuid: COMMAND_UUID,
            data_uuid: DATA_UUID,
            device_name_filter: DEFAULT_DEVICE_NAME_FILTER.to_string(),
            idle_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Input framerate handed to the encoder.
    pub framerate: u32,

    /// Output width in pixels; height keeps the aspect ratio and is even.
    pub output_width: u32,

    /// Encoder executable.
    pub encoder_path: String,

    pub codec: String,

    pub preset: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            framerate: 12,
            output_width: 800,
            encoder_path: "ffmpeg".to_string(),
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&config_path, content)?;
            config
        };

        // Set data directory
        config.data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Parse configuration text; missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
