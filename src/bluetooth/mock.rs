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

//! In-memory link adapter for exercising the controller without a radio.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ble_constants::{COMMAND_UUID, DATA_UUID};
use super::link::{LinkAdapter, LinkEvent, PeripheralId};
use crate::error::{LinkError, LinkErrorKind};

/// A call made against the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    StartScan(Uuid),
    StopScan,
    Connect(PeripheralId),
    Discover(PeripheralId),
    Subscribe(Uuid),
    Write(Uuid, Vec<u8>),
    Disconnect(PeripheralId),
    Release(PeripheralId),
}

#[derive(Debug, Default)]
struct MockLinkState {
    calls: Vec<LinkCall>,
    characteristics: Vec<Uuid>,
    fail_scan: Option<String>,
    fail_connect: Option<String>,
    fail_discovery: Option<String>,
    fail_subscribe: Option<String>,
    fail_write: Option<String>,
    events: Option<mpsc::Sender<LinkEvent>>,
}

/// Mock link adapter. Clones share state, so a test keeps one handle for
/// inspection while the controller owns another.
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLink {
    /// Mock exposing both camera characteristics.
    pub fn new() -> Self {
        let state = MockLinkState {
            characteristics: vec![COMMAND_UUID, DATA_UUID],
            ..MockLinkState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Also report `Disconnected` on this channel when a disconnect is
    /// requested, as a link stack that confirms teardown asynchronously would.
    pub fn with_events(self, tx: mpsc::Sender<LinkEvent>) -> Self {
        self.state.lock().events = Some(tx);
        self
    }

    /// Characteristics returned by discovery.
    pub fn set_characteristics(&self, characteristics: Vec<Uuid>) {
        self.state.lock().characteristics = characteristics;
    }

    pub fn fail_scan(&self, message: &str) {
        self.state.lock().fail_scan = Some(message.to_string());
    }

    pub fn fail_connect(&self, message: &str) {
        self.state.lock().fail_connect = Some(message.to_string());
    }

    pub fn fail_discovery(&self, message: &str) {
        self.state.lock().fail_discovery = Some(message.to_string());
    }

    pub fn fail_subscribe(&self, message: &str) {
        self.state.lock().fail_subscribe = Some(message.to_string());
    }

    pub fn fail_write(&self, message: &str) {
        self.state.lock().fail_write = Some(message.to_string());
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().calls.clone()
    }

    /// Payloads written to any characteristic, decoded as UTF-8.
    pub fn written_text(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                LinkCall::Write(_, data) => Some(String::from_utf8_lossy(data).into_owned()),
                _ => None,
            })
            .collect()
    }

    fn record(
        &self,
        call: LinkCall,
        failure: impl FnOnce(&MockLinkState) -> Option<String>,
        kind: LinkErrorKind,
    ) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match failure(&*state) {
            Some(message) => Err(LinkError::new(kind, message)),
            None => Ok(()),
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkAdapter for MockLink {
    async fn start_scan(&mut self, service: Uuid) -> Result<(), LinkError> {
        self.record(
            LinkCall::StartScan(service),
            |s| s.fail_scan.clone(),
            LinkErrorKind::ScanFailed,
        )
    }

    async fn stop_scan(&mut self) -> Result<(), LinkError> {
        self.state.lock().calls.push(LinkCall::StopScan);
        Ok(())
    }

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        self.record(
            LinkCall::Connect(peripheral.clone()),
            |s| s.fail_connect.clone(),
            LinkErrorKind::ConnectionFailed,
        )
    }

    async fn discover_characteristics(
        &mut self,
        peripheral: &PeripheralId,
        _service: Uuid,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, LinkError> {
        self.record(
            LinkCall::Discover(peripheral.clone()),
            |s| s.fail_discovery.clone(),
            LinkErrorKind::ServiceDiscoveryFailed,
        )?;
        let state = self.state.lock();
        Ok(state
            .characteristics
            .iter()
            .filter(|c| wanted.contains(c))
            .copied()
            .collect())
    }

    async fn subscribe(
        &mut self,
        _peripheral: &PeripheralId,
        characteristic: Uuid,
    ) -> Result<(), LinkError> {
        self.record(
            LinkCall::Subscribe(characteristic),
            |s| s.fail_subscribe.clone(),
            LinkErrorKind::CommandFailed,
        )
    }

    async fn write(
        &mut self,
        _peripheral: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), LinkError> {
        self.record(
            LinkCall::Write(characteristic, data.to_vec()),
            |s| s.fail_write.clone(),
            LinkErrorKind::DataError,
        )
    }

    async fn disconnect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        let events = {
            let mut state = self.state.lock();
            state.calls.push(LinkCall::Disconnect(peripheral.clone()));
            state.events.clone()
        };
        if let Some(tx) = events {
            let _ = tx.try_send(LinkEvent::Disconnected(peripheral.clone()));
        }
        Ok(())
    }

    async fn release(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        self.state
            .lock()
            .calls
            .push(LinkCall::Release(peripheral.clone()));
        Ok(())
    }
}
