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


//! Application state management.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bluetooth::PeripheralState;

/// Progress of the current image batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub expected: Option<u16>,
    pub received: u32,
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Current connection status.
    pub connection_status: RwLock<PeripheralState>,

    pub batch: RwLock<BatchProgress>,

    /// Whether a video job is running.
    pub converting: RwLock<bool>,

    /// Most recent published video.
    pub last_video: RwLock<Option<PathBuf>>,

    /// Most recent error, formatted for display.
    pub last_error: RwLock<Option<String>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(PeripheralState::Idle),
            batch: RwLock::new(BatchProgress::default()),
            converting: RwLock::new(false),
            last_video: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, status: PeripheralState) {
        *self.connection_status.write() = status;
        if status == PeripheralState::Disconnected {
            *self.batch.write() = BatchProgress::default();
        }
    }

    pub fn get_status(&self) -> PeripheralState {
        *self.connection_status.read()
    }

    /// Start a new batch of `total` images.
    pub fn begin_batch(&self, total: u16) {
        *self.batch.write() = BatchProgress {
            expected: Some(total),
            received: 0,
        };
    }

    pub fn record_image(&self) {
        self.batch.write().received += 1;
    }

    pub fn get_batch(&self) -> BatchProgress {
        *self.batch.read()
    }

    pub fn set_converting(&self, converting: bool) {
        *self.converting.write() = converting;
    }

    pub fn is_converting(&self) -> bool {
        *self.converting.read()
    }

    pub fn set_last_video(&self, path: PathBuf) {
        *self.last_video.write() = Some(path);
    }

    pub fn get_last_video(&self) -> Option<PathBuf> {
        self.last_video.read().clone()
    }

    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_clears_batch() {
        let state = AppState::new();
        state.set_status(PeripheralState::Connected);
        state.begin_batch(4);
        state.record_image();

        assert_eq!(
            state.get_batch(),
            BatchProgress {
                expected: Some(4),
                received: 1
            }
        );

        state.set_status(PeripheralState::Disconnected);
        assert_eq!(state.get_batch(), BatchProgress::default());
    }
}
