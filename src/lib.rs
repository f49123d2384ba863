//! Ticketprinter library: encode point-of-sale receipts as ESC/POS and
//! deliver them to thermal printers over BLE.
//!
//! Main modules:
//! - protocol: ESC/POS encoder
//! - ticket: order data and receipt layout
//! - printer: BLE transport (discovery, connection, delivery)
//! - ble: btleplug host implementation
//! - dispatch: BLE delivery or host print fallback
//! - config: shop settings and order sequence

pub mod ble;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod ticket;

/// BLE host API: scan and connect through btleplug
pub use ble::{BtleCentral, BtleDevice, scan};
pub use config::{
    OrderSequence, PaperWidth, PrinterMode, SettingsStore, ShopSettings, TicketConfig,
};
pub use dispatch::{FallbackReason, PrintOutcome, print_order, print_ticket};
pub use error::{ConfigError, ConfigResult, GattError, TransportError, TransportResult};
/// Transport API
pub use printer::{
    BleCentral, DeviceChooser, DeviceInfo, GattCharacteristic, GattDevice, GattService,
    PrinterHandle, WriteKind, discover_device, find_writable_characteristic,
};
/// Encoder API
pub use protocol::{Align, EncodedTicket, EscPosEncoder, Instruction};
pub use ticket::{LineItem, Order, ShopInfo, format_ticket, preview_lines};
