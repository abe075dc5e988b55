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

//! BlueZ central backend built on bluer.
//!
//! Adapter power changes, advertisements, notifications and link loss are
//! forwarded to the controller as `LinkEvent`s over a single channel, so the
//! controller sees them in arrival order. Streams are opened inside their
//! forwarding task, which reports the open result back before it starts
//! forwarding, so setup failures surface from the trait call.

use anyhow::Result;
use async_trait::async_trait;
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, Device, DeviceEvent, DeviceProperty,
    DiscoveryFilter, DiscoveryTransport, Session,
};
use futures::{pin_mut, StreamExt};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::link::{LinkAdapter, LinkEvent, PeripheralId, PeripheralInfo};
use crate::error::{LinkError, LinkErrorKind};

/// How long to wait for BlueZ to resolve GATT services after connecting.
const SERVICE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);
const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(200);

/// Link adapter over the default BlueZ adapter.
pub struct BluezLink {
    _session: Session,
    adapter: Adapter,
    event_tx: mpsc::Sender<LinkEvent>,
    power_task: JoinHandle<()>,
    scan_task: Option<JoinHandle<()>>,
    device_tasks: Vec<JoinHandle<()>>,
    characteristics: HashMap<Uuid, Characteristic>,
}

impl BluezLink {
    /// Open a BlueZ session and start watching adapter power.
    pub async fn new(event_tx: mpsc::Sender<LinkEvent>) -> Result<Self> {
        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        let power_task = tokio::spawn(watch_power(adapter.clone(), event_tx.clone()));

        Ok(Self {
            _session: session,
            adapter,
            event_tx,
            power_task,
            scan_task: None,
            device_tasks: Vec::new(),
            characteristics: HashMap::new(),
        })
    }

    fn device(&self, peripheral: &PeripheralId, kind: LinkErrorKind) -> Result<Device, LinkError> {
        let address: Address = peripheral
            .0
            .parse()
            .map_err(|_| LinkError::new(kind, format!("invalid address {}", peripheral)))?;
        self.adapter.device(address).map_err(|e| link_error(kind, e))
    }

    async fn wait_services_resolved(&self, device: &Device) -> Result<(), LinkError> {
        let started = tokio::time::Instant::now();
        loop {
            let resolved = device
                .is_services_resolved()
                .await
                .map_err(|e| link_error(LinkErrorKind::ServiceDiscoveryFailed, e))?;
            if resolved {
                return Ok(());
            }
            if started.elapsed() > SERVICE_RESOLVE_TIMEOUT {
                return Err(LinkError::new(
                    LinkErrorKind::ServiceDiscoveryFailed,
                    "timed out waiting for GATT services",
                ));
            }
            tokio::time::sleep(SERVICE_RESOLVE_POLL).await;
        }
    }

    /// Stop notification forwarders and the link watcher, and forget
    /// discovered characteristics.
    fn abort_device_tasks(&mut self) {
        for task in self.device_tasks.drain(..) {
            task.abort();
        }
        self.characteristics.clear();
    }

    fn characteristic(&self, uuid: Uuid, kind: LinkErrorKind) -> Result<&Characteristic, LinkError> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| LinkError::new(kind, format!("characteristic {} not discovered", uuid)))
    }
}

impl Drop for BluezLink {
    fn drop(&mut self) {
        self.power_task.abort();
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        self.abort_device_tasks();
    }
}

fn link_error(kind: LinkErrorKind, e: bluer::Error) -> LinkError {
    LinkError::new(kind, e.to_string())
}

type Ready = oneshot::Sender<Result<(), bluer::Error>>;

/// Wait for a forwarding task to report whether its stream opened.
async fn stream_opened(
    ready: oneshot::Receiver<Result<(), bluer::Error>>,
    kind: LinkErrorKind,
) -> Result<(), LinkError> {
    match ready.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(link_error(kind, e)),
        Err(_) => Err(LinkError::new(kind, "stream task ended before opening")),
    }
}

/// Forward adapter power state as `PoweredOn`/`PoweredOff`.
async fn watch_power(adapter: Adapter, tx: mpsc::Sender<LinkEvent>) {
    match adapter.is_powered().await {
        Ok(true) => {
            let _ = tx.send(LinkEvent::PoweredOn).await;
        }
        Ok(false) => {
            let _ = tx.send(LinkEvent::PoweredOff).await;
        }
        Err(e) => warn!("Failed to read adapter power state: {}", e),
    }

    let events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Failed to watch adapter events: {}", e);
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
            let event = if powered {
                LinkEvent::PoweredOn
            } else {
                LinkEvent::PoweredOff
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// Forward device additions during discovery as `Discovered`.
async fn forward_discoveries(adapter: Adapter, tx: mpsc::Sender<LinkEvent>, ready: Ready) {
    let events = match adapter.discover_devices().await {
        Ok(events) => {
            let _ = ready.send(Ok(()));
            events
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        let AdapterEvent::DeviceAdded(address) = event else {
            continue;
        };
        let name = match adapter.device(address) {
            Ok(device) => device.name().await.unwrap_or_default(),
            Err(_) => None,
        };
        let info = PeripheralInfo {
            id: PeripheralId(address.to_string()),
            name,
        };
        if tx.send(LinkEvent::Discovered(info)).await.is_err() {
            break;
        }
    }
    debug!("Discovery stream ended");
}

/// Report `Disconnected` once the device drops its link.
async fn watch_connection(device: Device, id: PeripheralId, tx: mpsc::Sender<LinkEvent>) {
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Failed to watch device {}: {}", id, e);
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            let _ = tx.send(LinkEvent::Disconnected(id)).await;
            return;
        }
    }
}

/// Forward notification values from one characteristic.
async fn forward_notifications(
    characteristic: Characteristic,
    uuid: Uuid,
    tx: mpsc::Sender<LinkEvent>,
    ready: Ready,
) {
    let values = match characteristic.notify().await {
        Ok(values) => {
            let _ = ready.send(Ok(()));
            values
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    pin_mut!(values);

    while let Some(value) = values.next().await {
        let event = LinkEvent::Notification {
            characteristic: uuid,
            value,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("Notification stream for {} ended", uuid);
}

#[async_trait]
impl LinkAdapter for BluezLink {
    async fn start_scan(&mut self, service: Uuid) -> Result<(), LinkError> {
        if self.scan_task.is_some() {
            self.stop_scan().await?;
        }

        let filter = DiscoveryFilter {
            uuids: HashSet::from([service]),
            transport: DiscoveryTransport::Le,
            ..Default::default()
        };
        self.adapter
            .set_discovery_filter(filter)
            .await
            .map_err(|e| link_error(LinkErrorKind::ScanFailed, e))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(forward_discoveries(
            self.adapter.clone(),
            self.event_tx.clone(),
            ready_tx,
        ));
        stream_opened(ready_rx, LinkErrorKind::ScanFailed).await?;

        info!("Scanning for service {}", service);
        self.scan_task = Some(task);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), LinkError> {
        // Dropping the discovery stream ends the BlueZ discovery session.
        if let Some(task) = self.scan_task.take() {
            task.abort();
            debug!("Scan stopped");
        }
        Ok(())
    }

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        let device = self.device(peripheral, LinkErrorKind::ConnectionFailed)?;
        // Watchers from an earlier peripheral must not outlive it.
        self.abort_device_tasks();
        device
            .connect()
            .await
            .map_err(|e| link_error(LinkErrorKind::ConnectionFailed, e))?;

        self.device_tasks.push(tokio::spawn(watch_connection(
            device,
            peripheral.clone(),
            self.event_tx.clone(),
        )));
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        peripheral: &PeripheralId,
        service: Uuid,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, LinkError> {
        let kind = LinkErrorKind::ServiceDiscoveryFailed;
        let device = self.device(peripheral, kind)?;
        self.wait_services_resolved(&device).await?;

        self.characteristics.clear();
        for svc in device.services().await.map_err(|e| link_error(kind, e))? {
            if svc.uuid().await.map_err(|e| link_error(kind, e))? != service {
                continue;
            }
            for characteristic in svc.characteristics().await.map_err(|e| link_error(kind, e))? {
                let uuid = characteristic.uuid().await.map_err(|e| link_error(kind, e))?;
                if wanted.contains(&uuid) {
                    debug!("Found characteristic {}", uuid);
                    self.characteristics.insert(uuid, characteristic);
                }
            }
        }

        Ok(self.characteristics.keys().copied().collect())
    }

    async fn subscribe(
        &mut self,
        _peripheral: &PeripheralId,
        characteristic: Uuid,
    ) -> Result<(), LinkError> {
        let handle = self
            .characteristic(characteristic, LinkErrorKind::CommandFailed)?
            .clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(forward_notifications(
            handle,
            characteristic,
            self.event_tx.clone(),
            ready_tx,
        ));
        stream_opened(ready_rx, LinkErrorKind::CommandFailed).await?;

        self.device_tasks.push(task);
        debug!("Subscribed to {}", characteristic);
        Ok(())
    }

    async fn write(
        &mut self,
        _peripheral: &PeripheralId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), LinkError> {
        let handle = self.characteristic(characteristic, LinkErrorKind::DataError)?;
        let request = CharacteristicWriteRequest {
            op_type: WriteOp::Command,
            ..Default::default()
        };
        handle
            .write_ext(data, &request)
            .await
            .map_err(|e| link_error(LinkErrorKind::DataError, e))
    }

    async fn disconnect(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        let device = self.device(peripheral, LinkErrorKind::ConnectionFailed)?;
        self.abort_device_tasks();
        device
            .disconnect()
            .await
            .map_err(|e| link_error(LinkErrorKind::ConnectionFailed, e))
    }

    async fn release(&mut self, peripheral: &PeripheralId) -> Result<(), LinkError> {
        debug!("Releasing link resources for {}", peripheral);
        self.abort_device_tasks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opened_stream_is_ok() {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = tx.send(Ok(()));
        });
        assert!(stream_opened(rx, LinkErrorKind::ScanFailed).await.is_ok());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_task_ending_before_open_is_reported() {
        let (tx, rx) = oneshot::channel::<Result<(), bluer::Error>>();
        let task = tokio::spawn(async move {
            drop(tx);
        });
        let err = stream_opened(rx, LinkErrorKind::CommandFailed)
            .await
            .unwrap_err();
        assert_eq!(err.kind, LinkErrorKind::CommandFailed);
        task.await.unwrap();
    }
}
