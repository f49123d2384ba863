//! btleplug-backed BLE central and GATT device.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central as _, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GattError, TransportError, TransportResult};
use crate::printer::{
    BleCentral, DeviceInfo, GattCharacteristic, GattDevice, GattService, SERVICE_HINTS, WriteKind,
};

/// Default time spent listening for advertisements.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(3);

/// The host's first BLE adapter, if it has one.
pub struct BtleCentral {
    adapter: Option<Adapter>,
    scan_window: Duration,
}

impl BtleCentral {
    /// Opens the platform BLE manager. A host without BLE yields a central
    /// that reports itself unavailable.
    pub async fn new(scan_window: Duration) -> Self {
        let adapter = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(adapters) => adapters.into_iter().next(),
                Err(e) => {
                    warn!(error = %e, "listing BLE adapters failed");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "BLE manager unavailable");
                None
            }
        };
        Self {
            adapter,
            scan_window,
        }
    }
}

#[async_trait]
impl BleCentral for BtleCentral {
    type Device = BtleDevice;

    async fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    async fn scan(&self, hints: &[Uuid]) -> Result<Vec<BtleDevice>, GattError> {
        let adapter = self.adapter.as_ref().ok_or("no BLE adapter")?;
        // printers advertise inconsistently, so listen for everything
        debug!(window = ?self.scan_window, hints = hints.len(), "scanning");
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.scan_window).await;
        if let Err(e) = adapter.stop_scan().await {
            warn!(error = %e, "stop_scan failed");
        }

        let peripherals = match adapter.peripherals().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "listing peripherals failed");
                Vec::new()
            }
        };
        let results =
            futures::future::join_all(peripherals.into_iter().map(BtleDevice::from_peripheral))
                .await;
        Ok(keep_readable(results))
    }
}

// A device can vanish between listing and reading its properties. Skip it
// rather than failing the whole scan.
fn keep_readable<T, E: std::fmt::Display>(results: Vec<Result<T, E>>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|r| match r {
            Ok(device) => Some(device),
            Err(e) => {
                warn!(error = %e, "skipping unreadable peripheral");
                None
            }
        })
        .collect()
}

/// Lists nearby devices, hinted printers first.
///
/// - `scan_window`: how long to listen for advertisements
pub async fn scan(scan_window: Duration) -> TransportResult<Vec<DeviceInfo>> {
    let central = BtleCentral::new(scan_window).await;
    if !central.is_available().await {
        return Err(TransportError::UnsupportedEnvironment(
            "no BLE adapter available".into(),
        ));
    }
    let mut infos: Vec<DeviceInfo> = central
        .scan(&SERVICE_HINTS)
        .await
        .map_err(|e| TransportError::UnsupportedEnvironment(format!("scan failed: {e}")))?
        .iter()
        .map(GattDevice::info)
        .collect();
    infos.sort_by_key(|d| !d.advertises_hint());
    Ok(infos)
}

/// One peripheral seen during a scan.
pub struct BtleDevice {
    peripheral: Peripheral,
    info: DeviceInfo,
}

impl BtleDevice {
    async fn from_peripheral(peripheral: Peripheral) -> Result<Self, GattError> {
        let props = peripheral.properties().await?;
        let info = match props {
            Some(p) => DeviceInfo {
                id: p.address.to_string(),
                name: p.local_name,
                services: p.services,
            },
            None => DeviceInfo {
                id: format!("{:?}", peripheral.id()),
                name: None,
                services: Vec::new(),
            },
        };
        Ok(Self { peripheral, info })
    }
}

impl From<WriteKind> for WriteType {
    fn from(kind: WriteKind) -> Self {
        match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        }
    }
}

#[async_trait]
impl GattDevice for BtleDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    async fn is_connected(&self) -> Result<bool, GattError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn connect(&self) -> Result<(), GattError> {
        self.peripheral.connect().await?;
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn primary_services(&self) -> Result<Vec<GattService>, GattError> {
        if self.peripheral.services().is_empty() {
            self.peripheral.discover_services().await?;
        }
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.primary)
            .map(|s| GattService {
                uuid: s.uuid,
                characteristics: s
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: c.properties,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<(), GattError> {
        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid
            })
            .ok_or("characteristic no longer present")?;
        self.peripheral.write(&target, data, kind.into()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_peripherals_are_skipped() {
        let results: Vec<Result<&str, String>> =
            vec![Ok("A"), Err("device not found".into()), Ok("C")];
        assert_eq!(keep_readable(results), vec!["A", "C"]);
    }

    #[test]
    fn test_all_unreadable_yields_empty_scan() {
        let results: Vec<Result<u8, String>> = vec![Err("gone".into())];
        assert!(keep_readable(results).is_empty());
    }
}
