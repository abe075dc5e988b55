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

//! Transfer session and batch bookkeeping.

/// State of the single in-flight image.
///
/// `expected_file_size == 0` means no frame is active; in that state the
/// buffer is empty and `current_file_size` is zero. The value is replaced
/// wholesale with `TransferSession::default()` after every completed image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSession {
    expected_file_size: u32,
    current_file_size: u32,
    buffer: Vec<Vec<u8>>,
}

impl TransferSession {
    /// Start a frame from a decoded header and the first payload chunk.
    pub fn begin(expected_file_size: u32, first_chunk: &[u8]) -> Self {
        Self {
            expected_file_size,
            current_file_size: first_chunk.len() as u32,
            buffer: vec![first_chunk.to_vec()],
        }
    }

    /// Append a continuation chunk.
    pub fn append(&mut self, chunk: &[u8]) {
        self.current_file_size = self.current_file_size.saturating_add(chunk.len() as u32);
        self.buffer.push(chunk.to_vec());
    }

    pub fn is_active(&self) -> bool {
        self.expected_file_size > 0
    }

    /// True once at least the declared number of bytes has arrived.
    pub fn is_complete(&self) -> bool {
        self.is_active() && self.current_file_size >= self.expected_file_size
    }

    /// Check the idle invariant: no length, no bytes, no chunks.
    pub fn is_idle(&self) -> bool {
        self.expected_file_size == 0 && self.current_file_size == 0 && self.buffer.is_empty()
    }

    pub fn expected_file_size(&self) -> u32 {
        self.expected_file_size
    }

    pub fn current_file_size(&self) -> u32 {
        self.current_file_size
    }

    pub fn chunk_count(&self) -> usize {
        self.buffer.len()
    }

    /// Concatenate the chunks in arrival order, truncated to the declared length.
    pub fn into_image(self) -> Vec<u8> {
        let len = self.current_file_size.min(self.expected_file_size) as usize;
        let mut image = Vec::with_capacity(len);
        for chunk in self.buffer {
            let room = len - image.len();
            if room == 0 {
                break;
            }
            image.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
        image
    }
}

/// Image counts for one announced batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounters {
    /// Announced by the last metadata message; `None` until one arrives.
    pub total_images_expected: Option<u16>,
    /// Completed images since the last metadata message.
    pub images_received: u32,
}

impl BatchCounters {
    /// Start a new batch of `total` images.
    pub fn announce(total: u16) -> Self {
        Self {
            total_images_expected: Some(total),
            images_received: 0,
        }
    }

    /// Count one completed image. Returns true exactly when this image
    /// finishes the announced batch.
    pub fn record_image(&mut self) -> bool {
        self.images_received += 1;
        match self.total_images_expected {
            Some(total) => self.images_received == u32::from(total),
            None => false,
        }
    }

    /// An empty batch is never done; it has no image to finish it.
    pub fn is_done(&self) -> bool {
        match self.total_images_expected {
            Some(total) => total > 0 && self.images_received >= u32::from(total),
            None => false,
        }
    }
}
