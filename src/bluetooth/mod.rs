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


//! Bluetooth LE central module.
//!
//! Connects to the camera peripheral, reassembles images from data
//! notifications and acknowledges each one on the command characteristic.

pub mod ble_constants;
mod bluez;
mod controller;
mod link;
pub mod mock;
pub mod protocol;
mod reassembler;
mod session;

pub use bluez::BluezLink;
pub use controller::{ControlRequest, ControllerEvent, DeviceLinkController, PeripheralHandle};
pub use link::{
    CharacteristicRefs, LinkAdapter, LinkEvent, PeripheralId, PeripheralInfo, PeripheralState,
};
pub use reassembler::{chunk_image, FrameReassembler};
pub use session::{BatchCounters, TransferSession};
