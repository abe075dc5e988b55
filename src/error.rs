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

//! Error types shared by the link controller and the video pipeline.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of a link or protocol error reported to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    BluetoothDisabled,
    ScanFailed,
    ConnectionFailed,
    ServiceDiscoveryFailed,
    CharacteristicNotFound,
    CommandFailed,
    DataError,
    FileIoError,
    TransferTimeout,
}

impl LinkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkErrorKind::BluetoothDisabled => "BLUETOOTH_DISABLED",
            LinkErrorKind::ScanFailed => "SCAN_FAILED",
            LinkErrorKind::ConnectionFailed => "CONNECTION_FAILED",
            LinkErrorKind::ServiceDiscoveryFailed => "SERVICE_DISCOVERY_FAILED",
            LinkErrorKind::CharacteristicNotFound => "CHARACTERISTIC_NOT_FOUND",
            LinkErrorKind::CommandFailed => "COMMAND_FAILED",
            LinkErrorKind::DataError => "DATA_ERROR",
            LinkErrorKind::FileIoError => "FILE_IO_ERROR",
            LinkErrorKind::TransferTimeout => "TRANSFER_TIMEOUT",
        }
    }
}

impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a link-stack operation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct LinkError {
    pub kind: LinkErrorKind,
    pub message: String,
}

impl LinkError {
    pub fn new(kind: LinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Frame persistence failure.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to write frame {index} to {path:?}: {source}")]
    Write {
        index: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame {index} at {path:?} is empty after write")]
    Empty { index: u32, path: PathBuf },

    #[error("frame {index} at {path:?} truncated: wrote {expected} bytes, read back {actual}")]
    Truncated {
        index: u32,
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Video assembly failure. Terminal for the job that produced it.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("No frames found in {0:?}")]
    NoFrames(PathBuf),

    #[error("Missing or empty frame: {0}")]
    InvalidFrame(String),

    #[error("Setup error: {0}")]
    EncodeSetup(String),

    #[error("Conversion failed: {0}")]
    EncodeFailure(String),
}

impl From<std::io::Error> for VideoError {
    fn from(e: std::io::Error) -> Self {
        VideoError::EncodeSetup(e.to_string())
    }
}
