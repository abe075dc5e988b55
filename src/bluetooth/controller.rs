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

//! BLE central controller for the camera peripheral.
//!
//! Drives scan, connect, characteristic discovery and subscription, then
//! handles the command channel (batch metadata, acknowledgements) and the
//! data channel (image reassembly and persistence). Link events are handled
//! one at a time to completion, so session state needs no locking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::link::{
    CharacteristicRefs, LinkAdapter, LinkEvent, PeripheralId, PeripheralInfo, PeripheralState,
};
use super::protocol::{parse_metadata, Command};
use super::reassembler::FrameReassembler;
use super::session::{BatchCounters, TransferSession};
use crate::config::BluetoothConfig;
use crate::error::{LinkError, LinkErrorKind};
use crate::video::FrameStore;

/// Events emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Connection state changed.
    StateChanged(PeripheralState),
    /// Peripheral seen for the first time during a scan.
    DeviceFound(PeripheralInfo),
    /// Command and data characteristics resolved and subscribed.
    ServicesDiscovered,
    /// A command write completed.
    CommandSent(String),
    /// A complete image was reassembled.
    DataReceived { data: Vec<u8>, is_complete: bool },
    /// A complete image was written to disk.
    FrameSaved { index: u32, path: PathBuf },
    /// Batch size announced on the command channel.
    MetadataReceived(u16),
    /// Every announced image has been received.
    TransferComplete,
    /// Error occurred.
    Error { kind: LinkErrorKind, message: String },
}

/// Requests from the orchestrator.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    StartScanning,
    Connect(PeripheralId),
    SendCommand(String),
    Disconnect,
    Shutdown,
}

/// A peripheral the controller is connecting or connected to.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    pub id: PeripheralId,
    pub name: Option<String>,
}

/// Connection manager, command channel and data reassembler for one peripheral.
pub struct DeviceLinkController<L: LinkAdapter> {
    link: L,
    config: BluetoothConfig,
    frames: FrameStore,
    event_tx: mpsc::Sender<ControllerEvent>,
    state: PeripheralState,
    discovered: HashMap<PeripheralId, PeripheralInfo>,
    peripheral: Option<PeripheralHandle>,
    characteristics: Option<CharacteristicRefs>,
    reassembler: FrameReassembler,
    batch: BatchCounters,
    last_fragment_at: Option<Instant>,
}

impl<L: LinkAdapter> DeviceLinkController<L> {
    /// Create a new controller.
    pub fn new(
        link: L,
        config: BluetoothConfig,
        frames: FrameStore,
        event_tx: mpsc::Sender<ControllerEvent>,
    ) -> Self {
        Self {
            link,
            config,
            frames,
            event_tx,
            state: PeripheralState::Idle,
            discovered: HashMap::new(),
            peripheral: None,
            characteristics: None,
            reassembler: FrameReassembler::new(),
            batch: BatchCounters::default(),
            last_fragment_at: None,
        }
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    pub fn session(&self) -> &TransferSession {
        self.reassembler.session()
    }

    pub fn batch(&self) -> BatchCounters {
        self.batch
    }

    pub fn characteristics(&self) -> Option<CharacteristicRefs> {
        self.characteristics
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Look up a peripheral seen during scanning.
    pub fn peripheral_by_id(&self, id: &PeripheralId) -> Option<&PeripheralInfo> {
        self.discovered.get(id)
    }

    /// Emit an event.
    async fn emit(&self, event: ControllerEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn emit_error(&self, kind: LinkErrorKind, message: impl Into<String>) {
        let message = message.into();
        error!("{}: {}", kind, message);
        self.emit(ControllerEvent::Error { kind, message }).await;
    }

    async fn set_state(&mut self, state: PeripheralState) {
        self.state = state;
        info!("Connection state: {}", state.as_str());
        self.emit(ControllerEvent::StateChanged(state)).await;
    }

    /// Start scanning for the configured service.
    pub async fn start_scanning(&mut self) {
        match self.link.start_scan(self.config.service_uuid).await {
            Ok(()) => self.set_state(PeripheralState::Scanning).await,
            Err(e) => self.emit_error(LinkErrorKind::ScanFailed, e.message).await,
        }
    }

    /// Connect to a peripheral found by a previous scan.
    pub async fn connect_by_id(&mut self, id: &PeripheralId) {
        match self.discovered.get(id).cloned() {
            Some(info) => self.connect_to_device(info).await,
            None => {
                self.emit_error(
                    LinkErrorKind::ConnectionFailed,
                    format!("Device with ID {} not found", id),
                )
                .await
            }
        }
    }

    /// Connect, then discover and subscribe to the characteristics.
    pub async fn connect_to_device(&mut self, info: PeripheralInfo) {
        self.peripheral = Some(PeripheralHandle {
            id: info.id.clone(),
            name: info.name.clone(),
        });
        self.set_state(PeripheralState::Connecting).await;

        if let Err(e) = self.link.connect(&info.id).await {
            self.peripheral = None;
            self.set_state(PeripheralState::Disconnected).await;
            self.emit_error(LinkErrorKind::ConnectionFailed, e.message).await;
            return;
        }

        info!("Connected to {} ({})", info.display_name(), info.id);
        self.set_state(PeripheralState::Connected).await;
        self.discover_characteristics(&info.id).await;
    }

    async fn discover_characteristics(&mut self, id: &PeripheralId) {
        let wanted = [self.config.command_uuid, self.config.data_uuid];
        let found = match self
            .link
            .discover_characteristics(id, self.config.service_uuid, &wanted)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                self.emit_error(LinkErrorKind::ServiceDiscoveryFailed, e.message)
                    .await;
                return;
            }
        };

        let Some(refs) =
            CharacteristicRefs::resolve(&found, self.config.command_uuid, self.config.data_uuid)
        else {
            self.emit_error(
                LinkErrorKind::CharacteristicNotFound,
                "Command or Data characteristic not found",
            )
            .await;
            return;
        };

        self.characteristics = Some(refs);
        self.subscribe(id, refs).await;
        self.emit(ControllerEvent::ServicesDiscovered).await;
    }

    /// Enable notifications on both characteristics.
    ///
    /// A failure is reported but does not tear the connection down; traffic
    /// on the unsubscribed characteristic simply never arrives.
    async fn subscribe(&mut self, id: &PeripheralId, refs: CharacteristicRefs) {
        for characteristic in [refs.command, refs.data] {
            if let Err(e) = self.link.subscribe(id, characteristic).await {
                self.emit_error(LinkErrorKind::CommandFailed, e.message).await;
            }
        }
    }

    /// Write a command without response.
    pub async fn send_command(&mut self, command: Command) {
        let target = match (&self.peripheral, self.characteristics) {
            (Some(peripheral), Some(refs)) => Some((peripheral.id.clone(), refs.command)),
            _ => None,
        };
        let Some((id, characteristic)) = target else {
            self.emit_error(
                LinkErrorKind::CharacteristicNotFound,
                "Command characteristic not found",
            )
            .await;
            return;
        };

        match self.link.write(&id, characteristic, &command.to_bytes()).await {
            Ok(()) => {
                debug!("Command sent: {}", command.as_str());
                self.emit(ControllerEvent::CommandSent(command.as_str().to_string()))
                    .await;
            }
            Err(e) => self.emit_error(LinkErrorKind::DataError, e.message).await,
        }
    }

    /// Disconnect and reset. Safe to call with no connection or repeatedly.
    ///
    /// The session is reset as soon as the link accepts the request; a later
    /// `Disconnected` for the same peripheral is ignored.
    pub async fn disconnect(&mut self) {
        let Some(peripheral) = self.peripheral.as_ref() else {
            debug!("Disconnect requested with no active peripheral");
            return;
        };

        let id = peripheral.id.clone();
        info!("Disconnecting from {}", id);
        if let Err(e) = self.link.disconnect(&id).await {
            warn!("Disconnect request failed: {}", e);
            return;
        }

        self.cleanup();
        self.set_state(PeripheralState::Disconnected).await;
    }

    /// Handle one event from the link stack.
    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::PoweredOn => {
                info!("Bluetooth powered on");
                self.start_scanning().await;
            }
            LinkEvent::PoweredOff => {
                if let Err(e) = self.link.stop_scan().await {
                    debug!("Stopping scan after power-off failed: {}", e);
                }
                if self.state == PeripheralState::Scanning {
                    self.state = PeripheralState::Idle;
                }
                self.emit_error(LinkErrorKind::BluetoothDisabled, "Bluetooth is disabled")
                    .await;
            }
            LinkEvent::Discovered(info) => self.on_discover(info).await,
            LinkEvent::Notification {
                characteristic,
                value,
            } => match self.characteristics {
                Some(refs) if characteristic == refs.command => {
                    self.handle_command_data(&value).await
                }
                Some(refs) if characteristic == refs.data => self.handle_data(&value).await,
                _ => debug!(
                    "Ignoring {}-byte notification from {}",
                    value.len(),
                    characteristic
                ),
            },
            LinkEvent::Disconnected(id) => self.on_disconnected(id).await,
        }
    }

    async fn on_discover(&mut self, info: PeripheralInfo) {
        if !self.discovered.contains_key(&info.id) {
            info!("Discovered device: {} ({})", info.display_name(), info.id);
            self.discovered.insert(info.id.clone(), info.clone());
            self.emit(ControllerEvent::DeviceFound(info.clone())).await;
        }

        let matches = info
            .name
            .as_deref()
            .is_some_and(|name| name.contains(&self.config.device_name_filter));
        if !matches || self.state != PeripheralState::Scanning {
            return;
        }

        if let Err(e) = self.link.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.connect_to_device(info).await;
    }

    async fn on_disconnected(&mut self, id: PeripheralId) {
        match self.peripheral.as_ref() {
            Some(p) if p.id == id => {}
            _ => {
                debug!("Disconnect from inactive peripheral {}", id);
                return;
            }
        }

        info!("Device {} disconnected", id);
        if let Err(e) = self.link.release(&id).await {
            debug!("Releasing {} failed: {}", id, e);
        }
        self.cleanup();
        self.set_state(PeripheralState::Disconnected).await;
    }

    /// Forget the connection and any in-flight transfer.
    fn cleanup(&mut self) {
        self.peripheral = None;
        self.characteristics = None;
        self.reassembler.reset();
        self.batch = BatchCounters::default();
        self.last_fragment_at = None;
    }

    async fn handle_command_data(&mut self, value: &[u8]) {
        match parse_metadata(value) {
            Ok(total) => {
                if total == 0 {
                    warn!("Empty batch announced, no transfer will complete");
                } else {
                    info!("Batch announced: {} images", total);
                }
                self.batch = BatchCounters::announce(total);
                self.emit(ControllerEvent::MetadataReceived(total)).await;
            }
            Err(LinkError { kind, message }) => self.emit_error(kind, message).await,
        }
    }

    async fn handle_data(&mut self, value: &[u8]) {
        let image = self.reassembler.process_packet(value);
        self.last_fragment_at = if self.reassembler.is_in_progress() {
            Some(Instant::now())
        } else {
            None
        };

        if let Some(image) = image {
            self.complete_image(image).await;
        }
    }

    async fn complete_image(&mut self, image: Vec<u8>) {
        let index = self.batch.images_received;
        let saved = self.frames.persist(&image, index);

        self.emit(ControllerEvent::DataReceived {
            data: image,
            is_complete: true,
        })
        .await;

        let batch_done = self.batch.record_image();

        match saved {
            Ok(path) => {
                self.emit(ControllerEvent::FrameSaved { index, path }).await;
                self.send_command(Command::Received).await;
            }
            Err(e) => self.emit_error(LinkErrorKind::FileIoError, e.to_string()).await,
        }

        if batch_done {
            info!("Transfer complete: {} images", self.batch.images_received);
            self.emit(ControllerEvent::TransferComplete).await;
        }
    }

    /// When the current partial frame is abandoned for inactivity.
    pub fn idle_deadline(&self) -> Option<Instant> {
        let timeout = self.config.idle_timeout()?;
        self.last_fragment_at.map(|at| at + timeout)
    }

    /// Drop a partial frame that has been idle past the timeout.
    pub async fn expire_stalled_transfer(&mut self, now: Instant) {
        let Some(deadline) = self.idle_deadline() else {
            return;
        };
        if now < deadline || !self.reassembler.is_in_progress() {
            return;
        }

        let session = self.reassembler.session();
        let message = format!(
            "No data for {:?}, dropped partial frame ({}/{} bytes)",
            self.config.idle_timeout().unwrap_or(Duration::ZERO),
            session.current_file_size(),
            session.expected_file_size()
        );
        self.reassembler.reset();
        self.last_fragment_at = None;
        self.emit_error(LinkErrorKind::TransferTimeout, message).await;
    }

    /// Handle one orchestrator request. Returns false on shutdown.
    pub async fn handle_request(&mut self, request: ControlRequest) -> bool {
        match request {
            ControlRequest::StartScanning => self.start_scanning().await,
            ControlRequest::Connect(id) => self.connect_by_id(&id).await,
            ControlRequest::SendCommand(text) => self.send_command(Command::Text(text)).await,
            ControlRequest::Disconnect => self.disconnect().await,
            ControlRequest::Shutdown => {
                self.disconnect().await;
                return false;
            }
        }
        true
    }

    /// Run the controller until shutdown or the link event stream ends.
    pub async fn run(
        mut self,
        mut link_rx: mpsc::Receiver<LinkEvent>,
        mut control_rx: mpsc::Receiver<ControlRequest>,
    ) {
        info!("Device link controller started");

        loop {
            let deadline = self.idle_deadline();
            tokio::select! {
                event = link_rx.recv() => match event {
                    Some(event) => self.handle_link_event(event).await,
                    None => {
                        info!("Link event stream closed");
                        break;
                    }
                },
                Some(request) = control_rx.recv() => {
                    if !self.handle_request(request).await {
                        break;
                    }
                }
                _ = sleep_until(deadline) => {
                    self.expire_stalled_transfer(Instant::now()).await;
                }
            }
        }

        info!("Device link controller stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}
