//! Chooses between direct BLE delivery and the host print flow.

use tracing::{info, warn};

use crate::config::{PrinterMode, TicketConfig};
use crate::error::TransportError;
use crate::printer::{GattDevice, PrinterHandle};
use crate::protocol::EncodedTicket;
use crate::ticket::{Order, format_ticket};

/// Why the caller should print through the host instead.
#[derive(Debug)]
pub enum FallbackReason {
    /// Configured for the host print dialog
    SystemMode,
    /// Bluetooth mode, but no printer was paired
    NoPrinterConnected,
    /// Direct delivery was attempted and failed
    BleFailed(TransportError),
}

#[derive(Debug)]
pub enum PrintOutcome {
    Delivered { bytes: usize },
    Fallback(FallbackReason),
}

impl PrintOutcome {
    pub fn needs_fallback(&self) -> bool {
        matches!(self, PrintOutcome::Fallback(_))
    }
}

/// Sends an encoded ticket when the printer mode and a paired printer allow
/// it, otherwise reports why the host flow must take over.
pub async fn print_ticket<D: GattDevice>(
    mode: PrinterMode,
    printer: Option<&PrinterHandle<D>>,
    ticket: &EncodedTicket,
) -> PrintOutcome {
    let printer = match (mode, printer) {
        (PrinterMode::System, _) => return PrintOutcome::Fallback(FallbackReason::SystemMode),
        (PrinterMode::Bluetooth, None) => {
            warn!("bluetooth mode without a paired printer, using host print");
            return PrintOutcome::Fallback(FallbackReason::NoPrinterConnected);
        }
        (PrinterMode::Bluetooth, Some(p)) => p,
    };

    match printer.send(ticket).await {
        Ok(()) => {
            info!(bytes = ticket.len(), "printed over BLE");
            PrintOutcome::Delivered {
                bytes: ticket.len(),
            }
        }
        Err(e) => {
            warn!(error = %e, retryable = e.is_retryable(), "BLE print failed");
            PrintOutcome::Fallback(FallbackReason::BleFailed(e))
        }
    }
}

/// Encodes a fresh ticket for `order` and dispatches it.
pub async fn print_order<D: GattDevice>(
    order: &Order,
    config: &TicketConfig,
    printer: Option<&PrinterHandle<D>>,
) -> PrintOutcome {
    let ticket = format_ticket(order, config);
    print_ticket(config.printer_mode, printer, &ticket).await
}
