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


//! Frame storage and video assembly.

mod assembler;
mod encoder;
mod frames;

pub use assembler::{VideoAssembler, PUBLIC_DIR, VIDEOS_DIR};
pub use encoder::{FfmpegEncoder, VideoEncoder, VideoJob};
pub use frames::{frame_file_name, parse_frame_index, FrameStore, FRAMES_DIR};
