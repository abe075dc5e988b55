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

//! Wire format of the command and data channels.
//!
//! Command channel, inbound: exactly two bytes, big-endian image count.
//! Command channel, outbound: UTF-8 text, e.g. `RECEIVED`.
//! Data channel: the first fragment of each image carries a big-endian
//! `u32` byte length followed by payload; continuation fragments are raw.

use crate::error::{LinkError, LinkErrorKind};

use super::ble_constants::wire::{ACK_RECEIVED, FRAME_HEADER_SIZE, METADATA_SIZE};

/// Outbound command written to the command characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Per-image application acknowledgement.
    Received,
    /// Arbitrary text supplied by the orchestrator.
    Text(String),
}

impl Command {
    /// Text carried by this command.
    pub fn as_str(&self) -> &str {
        match self {
            Command::Received => ACK_RECEIVED,
            Command::Text(text) => text,
        }
    }

    /// UTF-8 encoding written to the characteristic.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }
}

/// Parse a metadata notification into the announced image count.
pub fn parse_metadata(data: &[u8]) -> Result<u16, LinkError> {
    match <[u8; METADATA_SIZE]>::try_from(data) {
        Ok(bytes) => Ok(u16::from_be_bytes(bytes)),
        Err(_) => Err(LinkError::new(
            LinkErrorKind::DataError,
            "invalid command data length",
        )),
    }
}

/// Split the first fragment of an image into declared length and payload.
///
/// Returns `None` when the fragment is too short to carry a header.
pub fn split_frame_header(data: &[u8]) -> Option<(u32, &[u8])> {
    if data.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let (header, payload) = data.split_at(FRAME_HEADER_SIZE);
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    Some((len, payload))
}

/// Build the header for an image of `len` bytes.
pub fn frame_header(len: u32) -> [u8; FRAME_HEADER_SIZE] {
    len.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_big_endian() {
        assert_eq!(parse_metadata(&[0x00, 0x03]).unwrap(), 3);
        assert_eq!(parse_metadata(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(parse_metadata(&[0xFF, 0xFF]).unwrap(), u16::MAX);
    }

    #[test]
    fn test_metadata_wrong_length() {
        for data in [&[][..], &[0x01][..], &[0x00, 0x00, 0x03][..]] {
            let err = parse_metadata(data).unwrap_err();
            assert_eq!(err.kind, LinkErrorKind::DataError);
        }
    }

    #[test]
    fn test_split_frame_header() {
        let packet = [0x00, 0x00, 0x00, 0x0A, 1, 2, 3];
        let (len, payload) = split_frame_header(&packet).unwrap();
        assert_eq!(len, 10);
        assert_eq!(payload, &[1, 2, 3]);

        let (len, payload) = split_frame_header(&[0x00, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(len, 65536);
        assert!(payload.is_empty());

        assert!(split_frame_header(&[0x00, 0x00, 0x0A]).is_none());
        assert!(split_frame_header(&[]).is_none());
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::Received.to_bytes(), b"RECEIVED".to_vec());
        assert_eq!(Command::Text("CAPTURE".into()).as_str(), "CAPTURE");
        assert_eq!(frame_header(10), [0, 0, 0, 10]);
    }
}
