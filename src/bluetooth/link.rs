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

//! Link-stack abstraction consumed by the controller.

use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

use crate::error::LinkError;

/// Opaque peripheral identifier (the BlueZ address on Linux).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Connection state of the controller's peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

impl PeripheralState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeripheralState::Idle => "Idle",
            PeripheralState::Scanning => "Scanning...",
            PeripheralState::Connecting => "Connecting...",
            PeripheralState::Connected => "Connected",
            PeripheralState::Disconnected => "Disconnected",
        }
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    pub id: PeripheralId,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl PeripheralInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Resolved command and data characteristics.
///
/// Only ever constructed with both handles present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicRefs {
    pub command: Uuid,
    pub data: Uuid,
}

impl CharacteristicRefs {
    /// Pick both characteristics out of a discovery result.
    pub fn resolve(found: &[Uuid], command: Uuid, data: Uuid) -> Option<Self> {
        if found.contains(&command) && found.contains(&data) {
            Some(Self { command, data })
        } else {
            None
        }
    }
}

/// Asynchronous events delivered by the link stack, in order.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Radio became available.
    PoweredOn,
    /// Radio was switched off or removed.
    PoweredOff,
    /// Advertisement received while scanning.
    Discovered(PeripheralInfo),
    /// Notification on a subscribed characteristic.
    Notification { characteristic: Uuid, value: Vec<u8> },
    /// Link to the peripheral is gone, requested or not.
    Disconnected(PeripheralId),
}

/// Operations the controller needs from a BLE central stack.
#[async_trait]
pub trait LinkAdapter: Send + Sync {
    /// Start scanning for peripherals advertising `service`.
    async fn start_scan(&mut self, service: Uuid) -> Result<(), LinkError>;

    /// Stop an active scan. Stopping an idle scanner is not an error.
    async fn stop_scan(&mut self) -> Result<(), LinkError>;

    /// Open a connection to a discovered peripheral.
    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError>;

    /// Discover which of `wanted` exist under `service`.
    async fn discover_characteristics(
        &mut self,
        peripheral: &PeripheralId,
        service: Uuid,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, LinkError>;

    /// Enable notifications; values arrive as `LinkEvent::Notification`.
    async fn subscribe(
        &mut self,
        peripheral: &PeripheralId,
        characteristic: Uuid,
    ) -> Result<(), LinkError>;

    /// Write without response.
    async fn write(
        &mut self,
        peripheral: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), LinkError>;

    /// Tear the connection down. `Ok` means the peripheral is gone.
    async fn disconnect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError>;

    /// Drop per-peripheral resources after the link went away on its own.
    async fn release(&mut self, _peripheral: &PeripheralId) -> Result<(), LinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_both() {
        let cmd = Uuid::from_u128(1);
        let data = Uuid::from_u128(2);

        assert!(CharacteristicRefs::resolve(&[cmd, data], cmd, data).is_some());
        assert!(CharacteristicRefs::resolve(&[cmd], cmd, data).is_none());
        assert!(CharacteristicRefs::resolve(&[data], cmd, data).is_none());
        assert!(CharacteristicRefs::resolve(&[], cmd, data).is_none());
    }
}
