//! # ticketprinter CLI
//!
//! ```bash
//! # List nearby BLE devices (likely printers first)
//! ticketprinter scan
//!
//! # Show the receipt as the host print flow would
//! ticketprinter preview --order cart.json
//!
//! # Write the ESC/POS ticket to a file (hex dump without --out)
//! ticketprinter encode --order cart.json --out ticket.bin
//!
//! # Print the next order, over BLE when configured for it
//! ticketprinter print --order cart.json
//! ```
//!
//! Settings and the order counter live in `--data-dir` as `settings.json`
//! and `sequence.json`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use ticketprinter::{
    BtleCentral, DeviceChooser, DeviceInfo, LineItem, Order, OrderSequence, PrintOutcome,
    PrinterHandle, PrinterMode, SettingsStore, ShopSettings, TicketConfig, discover_device,
    format_ticket, preview_lines, print_order,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Point-of-sale ticket printing for ESC/POS thermal printers
#[derive(Parser, Debug)]
#[command(name = "ticketprinter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding settings.json and sequence.json
    #[arg(long, global = true, default_value = ".ticketprinter")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List nearby BLE devices
    Scan {
        /// Seconds to listen for advertisements
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
    /// Print the plain-text receipt for a cart
    Preview {
        #[arg(long)]
        order: PathBuf,
    },
    /// Encode a cart as an ESC/POS ticket
    Encode {
        #[arg(long)]
        order: PathBuf,
        /// Output file (hex dump to stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the next order and advance the order counter
    Print {
        #[arg(long)]
        order: PathBuf,
        /// Seconds to listen for printers
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
}

/// Cart file contents
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cart {
    items: Vec<LineItem>,
    #[serde(default)]
    footer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketprinter=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = SettingsStore::new(&cli.data_dir);

    match cli.command {
        Commands::Scan { seconds } => {
            let devices = ticketprinter::scan(Duration::from_secs(seconds)).await?;
            if devices.is_empty() {
                println!("No devices found.");
            }
            print_devices(&devices);
        }
        Commands::Preview { order } => {
            let (order, config) = load_order(&store, &order)?;
            for line in preview_lines(&order, &config) {
                println!("{line}");
            }
        }
        Commands::Encode { order, out } => {
            let (order, config) = load_order(&store, &order)?;
            let ticket = format_ticket(&order, &config);
            match out {
                Some(path) => {
                    std::fs::write(&path, ticket.as_bytes())?;
                    println!("Wrote {} bytes to {}", ticket.len(), path.display());
                }
                None => println!("{}", hex_dump(ticket.as_bytes())),
            }
        }
        Commands::Print { order, seconds } => {
            run_print(&store, &order, Duration::from_secs(seconds)).await?;
        }
    }

    Ok(())
}

fn load_order(
    store: &SettingsStore,
    cart_path: &Path,
) -> Result<(Order, TicketConfig), BoxError> {
    let settings = store.load_settings()?;
    let sequence = store.load_sequence()?;
    let cart: Cart = serde_json::from_str(&std::fs::read_to_string(cart_path)?)?;
    Ok(build_order(&settings, &sequence, cart))
}

fn build_order(
    settings: &ShopSettings,
    sequence: &OrderSequence,
    cart: Cart,
) -> (Order, TicketConfig) {
    let mut order = Order::new(
        settings.shop_info(),
        cart.items,
        sequence.current(),
        chrono::Local::now().naive_local(),
    );
    order.footer = cart.footer;
    (order, settings.ticket_config())
}

async fn run_print(
    store: &SettingsStore,
    cart_path: &Path,
    window: Duration,
) -> Result<(), BoxError> {
    let settings = store.load_settings()?;
    if !settings.is_configured() {
        tracing::warn!(dir = %store.dir().display(), "shop name not configured");
    }
    let mut sequence = store.load_sequence()?;
    let cart: Cart = serde_json::from_str(&std::fs::read_to_string(cart_path)?)?;
    if cart.items.is_empty() {
        println!("Cart is empty, nothing to print.");
        return Ok(());
    }
    let (order, config) = build_order(&settings, &sequence, cart);

    let printer = match config.printer_mode {
        PrinterMode::Bluetooth => pair_printer(window).await,
        PrinterMode::System => None,
    };

    match print_order(&order, &config, printer.as_ref()).await {
        PrintOutcome::Delivered { bytes } => {
            println!("Sent {bytes} bytes to the Bluetooth printer ({}).", order.label());
        }
        PrintOutcome::Fallback(reason) => {
            tracing::info!(?reason, "using host print flow");
            for line in preview_lines(&order, &config) {
                println!("{line}");
            }
        }
    }

    sequence.advance();
    store.save_sequence(&sequence)?;
    Ok(())
}

/// Discovers and connects a printer. Any failure means "no printer".
async fn pair_printer(window: Duration) -> Option<PrinterHandle<ticketprinter::BtleDevice>> {
    let central = BtleCentral::new(window).await;
    let handle = match discover_device(&central, &StdinChooser).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return None,
        Err(e) => {
            eprintln!("Bluetooth unavailable: {e}");
            return None;
        }
    };
    if let Err(e) = handle.connect().await {
        // send reconnects on its own, report and carry on
        eprintln!("Failed to connect: {e}");
    }
    Some(handle)
}

/// Prompts on the terminal for a device number.
struct StdinChooser;

#[async_trait]
impl DeviceChooser for StdinChooser {
    async fn choose(&self, devices: &[DeviceInfo]) -> Option<usize> {
        if devices.is_empty() {
            println!("No devices found. Make sure the printer is powered on and advertising.");
            return None;
        }
        print_devices(devices);
        let count = devices.len();
        tokio::task::spawn_blocking(move || prompt_index(count))
            .await
            .ok()
            .flatten()
    }
}

fn prompt_index(count: usize) -> Option<usize> {
    print!("Select device number (1-{count}, empty to cancel): ");
    io::stdout().flush().ok()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input).ok()?;
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn print_devices(devices: &[DeviceInfo]) {
    for (i, d) in devices.iter().enumerate() {
        let mark = if d.advertises_hint() { "*" } else { " " };
        println!("  {}){mark} id={} name={:?}", i + 1, d.id, d.name);
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
