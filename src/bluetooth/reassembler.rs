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

//! Reassembly of length-prefixed image fragments.
//!
//! The link layer is assumed to deliver notifications in order and without
//! loss. Out-of-order or duplicated fragments are not detected.

use tracing::{debug, warn};

use super::protocol::{frame_header, split_frame_header};
use super::session::TransferSession;

/// Turns data-channel notifications into complete images.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    session: TransferSession,
}

impl FrameReassembler {
    /// Create a new frame reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one data-channel notification.
    ///
    /// Returns `Some(image)` when the declared length has been reached,
    /// otherwise returns `None`. The session is idle again on return
    /// whenever an image is produced.
    pub fn process_packet(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        if self.session.is_active() {
            self.session.append(packet);
        } else {
            match split_frame_header(packet) {
                Some((0, _)) => {
                    warn!("Frame header declares zero length, dropping packet");
                    return None;
                }
                Some((expected, payload)) => {
                    debug!("Started frame reassembly, expecting {} bytes", expected);
                    self.session = TransferSession::begin(expected, payload);
                }
                None => {
                    warn!(
                        "Dropping {}-byte packet received with no active frame",
                        packet.len()
                    );
                    return None;
                }
            }
        }

        if !self.session.is_complete() {
            return None;
        }

        let session = std::mem::take(&mut self.session);
        let expected = session.expected_file_size();
        let received = session.current_file_size();
        if received > expected {
            warn!(
                "Frame overshoot: expected {} bytes, got {}; discarding {} trailing bytes",
                expected,
                received,
                received - expected
            );
        }
        debug!("Frame reassembly complete: {} bytes", expected);
        Some(session.into_image())
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.session = TransferSession::default();
    }

    /// Check if a frame is being reassembled.
    pub fn is_in_progress(&self) -> bool {
        self.session.is_active()
    }

    /// Current transfer session.
    pub fn session(&self) -> &TransferSession {
        &self.session
    }
}

/// Split an image into notification payloads as the peripheral sends them.
///
/// The first packet carries the 4-byte length header; every packet holds
/// at most `max_packet` bytes.
pub fn chunk_image(data: &[u8], max_packet: usize) -> Vec<Vec<u8>> {
    let header = frame_header(data.len() as u32);
    let first_payload = max_packet.saturating_sub(header.len()).min(data.len());

    let mut first = Vec::with_capacity(header.len() + first_payload);
    first.extend_from_slice(&header);
    first.extend_from_slice(&data[..first_payload]);

    let mut packets = vec![first];
    for chunk in data[first_payload..].chunks(max_packet.max(1)) {
        packets.push(chunk.to_vec());
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_packet_frame() {
        let mut reassembler = FrameReassembler::new();

        let packet = vec![0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];

        let result = reassembler.process_packet(&packet);
        assert_eq!(result, Some(b"hello".to_vec()));
        assert!(!reassembler.is_in_progress());
        assert!(reassembler.session().is_idle());
    }

    #[test]
    fn test_two_packet_frame() {
        let mut reassembler = FrameReassembler::new();

        // 10-byte image, 6 bytes in the first packet
        let packet1 = vec![0x00, 0x00, 0x00, 0x0A, 1, 2, 3, 4, 5, 6];
        assert!(reassembler.process_packet(&packet1).is_none());
        assert!(reassembler.is_in_progress());
        assert_eq!(reassembler.session().current_file_size(), 6);

        let packet2 = vec![7, 8, 9, 10];
        let result = reassembler.process_packet(&packet2);
        assert_eq!(result, Some(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
        assert!(reassembler.session().is_idle());
    }

    #[test]
    fn test_header_only_first_packet() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0x00, 0x00, 0x00, 0x03]).is_none());
        assert!(reassembler.is_in_progress());
        assert_eq!(reassembler.session().current_file_size(), 0);

        assert_eq!(reassembler.process_packet(b"abc"), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_continuation_starting_with_header_like_bytes() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 0, 8, 0xFF, 0xD8]).is_none());
        // Looks like a header, but a frame is active so it is payload
        let result = reassembler.process_packet(&[0, 0, 0, 1, 0xFF, 0xD9]);
        assert_eq!(result, Some(vec![0xFF, 0xD8, 0, 0, 0, 1, 0xFF, 0xD9]));
    }

    #[test]
    fn test_overshoot_truncates_to_declared_length() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 0, 4, b'a', b'b']).is_none());
        let result = reassembler.process_packet(b"cdXYZ");
        assert_eq!(result, Some(b"abcd".to_vec()));
        assert!(reassembler.session().is_idle());
    }

    #[test]
    fn test_zero_length_packet_without_active_frame() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[]).is_none());
        assert!(reassembler.session().is_idle());

        // The next real header still starts a clean frame
        assert!(reassembler.process_packet(&[0, 0, 0, 2, 9]).is_none());
        assert_eq!(reassembler.process_packet(&[8]), Some(vec![9, 8]));
    }

    #[test]
    fn test_short_packet_without_active_frame_is_dropped() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 1]).is_none());
        assert!(reassembler.session().is_idle());
    }

    #[test]
    fn test_zero_length_continuation_keeps_frame() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 0, 2, 1]).is_none());
        assert!(reassembler.process_packet(&[]).is_none());
        assert!(reassembler.is_in_progress());
        assert_eq!(reassembler.process_packet(&[2]), Some(vec![1, 2]));
    }

    #[test]
    fn test_zero_declared_length_is_dropped() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 0, 0, 1, 2]).is_none());
        assert!(reassembler.session().is_idle());
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut reassembler = FrameReassembler::new();

        assert!(reassembler.process_packet(&[0, 0, 0, 9, 1, 2, 3]).is_none());
        reassembler.reset();
        assert!(reassembler.session().is_idle());

        assert!(reassembler.process_packet(&[0, 0, 0, 1, 7]).is_some());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut reassembler = FrameReassembler::new();

        assert_eq!(reassembler.process_packet(&[0, 0, 0, 1, 0xAA]), Some(vec![0xAA]));
        assert!(reassembler.session().is_idle());
        assert_eq!(reassembler.process_packet(&[0, 0, 0, 1, 0xBB]), Some(vec![0xBB]));
    }

    #[test]
    fn test_chunk_image_layout() {
        let data: Vec<u8> = (0..50).collect();
        let packets = chunk_image(&data, 20);

        assert_eq!(&packets[0][..4], &[0, 0, 0, 50]);
        assert_eq!(packets[0].len(), 20);
        assert!(packets.iter().all(|p| p.len() <= 20));
    }

    #[test]
    fn test_chunked_image_reassembles() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut reassembler = FrameReassembler::new();

        let mut result = None;
        for packet in chunk_image(&data, 180) {
            if let Some(image) = reassembler.process_packet(&packet) {
                result = Some(image);
            }
        }

        assert_eq!(result, Some(data));
    }
}
