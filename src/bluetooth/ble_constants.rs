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

//! BLE service and characteristic UUIDs for the camera peripheral.

use uuid::Uuid;

/// Camera GATT service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xabcd0001_0000_1000_8000_00805f9b34fb);

/// Command characteristic UUID.
/// Properties: Write Without Response, Notify (batch metadata)
pub const COMMAND_UUID: Uuid = Uuid::from_u128(0xabcd0002_0000_1000_8000_00805f9b34fb);

/// Data characteristic UUID.
/// Properties: Notify (image fragments)
pub const DATA_UUID: Uuid = Uuid::from_u128(0xabcd0003_0000_1000_8000_00805f9b34fb);

/// Advertised name substring that identifies the camera.
pub const DEFAULT_DEVICE_NAME_FILTER: &str = "SimpleBLE";

/// Wire layout constants.
pub mod wire {
    /// Size of the big-endian image length prefix on the first fragment.
    pub const FRAME_HEADER_SIZE: usize = 4;

    /// Exact size of a metadata message on the command channel.
    pub const METADATA_SIZE: usize = 2;

    /// Application-level acknowledgement sent once per completed image.
    pub const ACK_RECEIVED: &str = "RECEIVED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "abcd0001-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            COMMAND_UUID.to_string(),
            "abcd0002-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(DATA_UUID.to_string(), "abcd0003-0000-1000-8000-00805f9b34fb");
    }
}
