//! BLE ticket transport.
//!
//! The host BLE stack is reached only through [`BleCentral`] and
//! [`GattDevice`]; the transport turns their failures into
//! [`TransportError`] kinds according to the step that failed.

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{GattError, TransportError, TransportResult};
use crate::protocol::EncodedTicket;

/// Services commonly exposed by generic BLE thermal printers. Used to rank
/// devices in the chooser, never to filter them.
pub const SERVICE_HINTS: [Uuid; 2] = [
    Uuid::from_u128(0x000018f0_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2),
];

/// What the chooser shows for one nearby device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: Option<String>,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
}

impl DeviceInfo {
    pub fn advertises_hint(&self) -> bool {
        self.services.iter().any(|s| SERVICE_HINTS.contains(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharPropFlags,
}

impl GattCharacteristic {
    pub fn is_writable(&self) -> bool {
        self.properties
            .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
    }

    /// Acknowledged write when supported.
    pub fn write_kind(&self) -> WriteKind {
        if self.properties.contains(CharPropFlags::WRITE) {
            WriteKind::WithResponse
        } else {
            WriteKind::WithoutResponse
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    /// In the order the host stack reports them
    pub characteristics: Vec<GattCharacteristic>,
}

/// A remote device as exposed by the host BLE stack.
#[async_trait]
pub trait GattDevice: Send + Sync {
    fn info(&self) -> DeviceInfo;

    async fn is_connected(&self) -> Result<bool, GattError>;

    /// Opens (or reopens) the GATT session.
    async fn connect(&self) -> Result<(), GattError>;

    /// Primary services, in the order the host stack reports them.
    async fn primary_services(&self) -> Result<Vec<GattService>, GattError>;

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<(), GattError>;
}

/// The host's BLE central role.
#[async_trait]
pub trait BleCentral: Send + Sync {
    type Device: GattDevice;

    /// Whether the host has a usable BLE adapter.
    async fn is_available(&self) -> bool;

    /// Every device in range, unfiltered. `hints` may bias ordering only.
    async fn scan(&self, hints: &[Uuid]) -> Result<Vec<Self::Device>, GattError>;
}

/// User-facing device picker.
#[async_trait]
pub trait DeviceChooser: Send + Sync {
    /// Index into `devices`, or `None` when dismissed.
    async fn choose(&self, devices: &[DeviceInfo]) -> Option<usize>;
}

/// Asks the user to pick a printer among nearby devices.
///
/// - `central`: host BLE stack
/// - `chooser`: device picker shown to the user
///
/// Returns `Ok(None)` when the chooser is dismissed. Fails with
/// `UnsupportedEnvironment` before prompting when the host has no BLE.
#[instrument(skip_all)]
pub async fn discover_device<C, H>(
    central: &C,
    chooser: &H,
) -> TransportResult<Option<PrinterHandle<C::Device>>>
where
    C: BleCentral,
    H: DeviceChooser,
{
    if !central.is_available().await {
        return Err(TransportError::UnsupportedEnvironment(
            "no BLE adapter available".into(),
        ));
    }

    let mut devices = central
        .scan(&SERVICE_HINTS)
        .await
        .map_err(|e| TransportError::UnsupportedEnvironment(format!("scan failed: {e}")))?;
    // hinted devices first, scan order otherwise
    devices.sort_by_cached_key(|d| !d.info().advertises_hint());
    let infos: Vec<DeviceInfo> = devices.iter().map(GattDevice::info).collect();
    debug!(found = infos.len(), "scan complete");

    match choose(chooser, &infos).await {
        Ok(index) => {
            let device = devices.swap_remove(index);
            info!(id = %infos[index].id, name = ?infos[index].name, "device selected");
            Ok(Some(PrinterHandle::new(device)))
        }
        Err(TransportError::UserCancelled) => {
            info!("device selection cancelled");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn choose<H: DeviceChooser>(chooser: &H, devices: &[DeviceInfo]) -> TransportResult<usize> {
    chooser
        .choose(devices)
        .await
        .filter(|&i| i < devices.len())
        .ok_or(TransportError::UserCancelled)
}

/// Returns the first characteristic, in service-then-characteristic order as
/// reported by the device, that accepts writes with or without response.
///
/// - `device`: connected device
pub async fn find_writable_characteristic<D: GattDevice + ?Sized>(
    device: &D,
) -> TransportResult<GattCharacteristic> {
    let services = device
        .primary_services()
        .await
        .map_err(|e| TransportError::Connection(format!("service discovery failed: {e}")))?;

    services
        .iter()
        .flat_map(|s| s.characteristics.iter())
        .find(|c| c.is_writable())
        .cloned()
        .ok_or_else(|| {
            TransportError::NoWritableEndpoint(format!(
                "none among {} service(s)",
                services.len()
            ))
        })
}

#[derive(Debug, Default)]
struct LinkState {
    connected: bool,
    endpoint: Option<GattCharacteristic>,
}

/// A paired printer, reusable across tickets.
///
/// Tracks whether the GATT session is up and caches the resolved write
/// endpoint for that session. Operations on one handle are serialized, so
/// concurrent sends never interleave on the characteristic.
pub struct PrinterHandle<D> {
    device: D,
    link: Mutex<LinkState>,
}

impl<D: GattDevice> PrinterHandle<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            link: Mutex::new(LinkState::default()),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn info(&self) -> DeviceInfo {
        self.device.info()
    }

    /// Connection state as of the last connect or send.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.connected
    }

    /// Write endpoint resolved for the current session, if any.
    pub async fn endpoint(&self) -> Option<GattCharacteristic> {
        self.link.lock().await.endpoint.clone()
    }

    /// Establishes or re-establishes the GATT session.
    #[instrument(skip(self), fields(device = %self.device.info().id))]
    pub async fn connect(&self) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await
    }

    /// Delivers the ticket in a single write, reconnecting first if the
    /// session dropped. No retries.
    #[instrument(skip_all, fields(device = %self.device.info().id, bytes = ticket.len()))]
    pub async fn send(&self, ticket: &EncodedTicket) -> TransportResult<()> {
        let mut link = self.link.lock().await;

        link.connected = self.device.is_connected().await.unwrap_or(false);
        if !link.connected {
            debug!("session down, reconnecting");
            self.connect_locked(&mut link).await?;
        }

        let endpoint = match link.endpoint.clone() {
            Some(c) => c,
            None => {
                let c = find_writable_characteristic(&self.device).await?;
                debug!(
                    characteristic = %c.uuid,
                    service = %c.service_uuid,
                    "write endpoint resolved"
                );
                link.endpoint = Some(c.clone());
                c
            }
        };

        if let Err(e) = self
            .device
            .write(&endpoint, ticket.as_bytes(), endpoint.write_kind())
            .await
        {
            link.connected = self.device.is_connected().await.unwrap_or(false);
            if !link.connected {
                link.endpoint = None;
            }
            warn!(error = %e, connected = link.connected, "ticket write failed");
            return Err(TransportError::WriteFailed(e.to_string()));
        }

        info!("ticket delivered");
        Ok(())
    }

    async fn connect_locked(&self, link: &mut LinkState) -> TransportResult<()> {
        // a new session may expose a different attribute table
        link.endpoint = None;
        match self.device.connect().await {
            Ok(()) => {
                link.connected = true;
                info!("connected");
                Ok(())
            }
            Err(e) => {
                link.connected = false;
                warn!(error = %e, "connect failed");
                Err(TransportError::Connection(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(props: CharPropFlags) -> GattCharacteristic {
        GattCharacteristic {
            uuid: Uuid::new_v4(),
            service_uuid: Uuid::new_v4(),
            properties: props,
        }
    }

    #[test]
    fn test_writable_flags() {
        assert!(characteristic(CharPropFlags::WRITE).is_writable());
        assert!(characteristic(CharPropFlags::WRITE_WITHOUT_RESPONSE).is_writable());
        assert!(!characteristic(CharPropFlags::READ | CharPropFlags::NOTIFY).is_writable());
    }

    #[test]
    fn test_write_kind_prefers_response() {
        let both = characteristic(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert_eq!(both.write_kind(), WriteKind::WithResponse);
        let wwr = characteristic(CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert_eq!(wwr.write_kind(), WriteKind::WithoutResponse);
    }

    #[test]
    fn test_hint_detection() {
        let mut info = DeviceInfo {
            id: "AA".into(),
            name: None,
            services: vec![Uuid::new_v4()],
        };
        assert!(!info.advertises_hint());
        info.services.push(SERVICE_HINTS[1]);
        assert!(info.advertises_hint());
    }
}
