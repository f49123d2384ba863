//! Shop settings, the formatter configuration derived from them, and the
//! JSON store that persists settings and the order sequence between runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigResult;
use crate::ticket::ShopInfo;

pub const DEFAULT_FOOTER: &str = "Obrigado pela preferência!";

const SETTINGS_FILE: &str = "settings.json";
const SEQUENCE_FILE: &str = "sequence.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperWidth {
    #[default]
    #[serde(rename = "58mm")]
    Mm58,
    #[serde(rename = "80mm")]
    Mm80,
}

impl PaperWidth {
    /// Characters per line in the default font.
    pub fn columns(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterMode {
    /// Host print dialog
    #[default]
    System,
    /// Direct ESC/POS over BLE
    Bluetooth,
}

/// Immutable configuration handed to the ticket formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketConfig {
    pub paper_width: PaperWidth,
    pub printer_mode: PrinterMode,
    /// Footer used when the order carries none. Empty falls back to `DEFAULT_FOOTER`.
    pub default_footer: String,
    /// Spaces to indent the plain-text preview
    pub left_padding: usize,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            paper_width: PaperWidth::default(),
            printer_mode: PrinterMode::default(),
            default_footer: DEFAULT_FOOTER.to_string(),
            left_padding: 0,
        }
    }
}

/// User-editable shop settings, stored as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShopSettings {
    pub shop_name: String,
    /// CNPJ or CPF
    pub document: String,
    pub address: String,
    pub phone: String,
    pub footer_message: String,
    pub printer_width: PaperWidth,
    pub printer_type: PrinterMode,
    pub printer_padding_left: usize,
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            shop_name: String::new(),
            document: String::new(),
            address: String::new(),
            phone: String::new(),
            footer_message: DEFAULT_FOOTER.to_string(),
            printer_width: PaperWidth::Mm58,
            printer_type: PrinterMode::System,
            printer_padding_left: 0,
        }
    }
}

impl ShopSettings {
    pub fn ticket_config(&self) -> TicketConfig {
        TicketConfig {
            paper_width: self.printer_width,
            printer_mode: self.printer_type,
            default_footer: self.footer_message.clone(),
            left_padding: self.printer_padding_left,
        }
    }

    pub fn shop_info(&self) -> ShopInfo {
        ShopInfo {
            name: self.shop_name.clone(),
            address: self.address.clone(),
            phone: non_empty(&self.phone),
            document: non_empty(&self.document),
        }
    }

    /// A shop name is required before tickets are worth printing.
    pub fn is_configured(&self) -> bool {
        !self.shop_name.trim().is_empty()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Sequential order numbers, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSequence {
    next_order_id: u32,
}

impl Default for OrderSequence {
    fn default() -> Self {
        Self { next_order_id: 1 }
    }
}

impl OrderSequence {
    pub fn starting_at(next_order_id: u32) -> Self {
        Self { next_order_id }
    }

    /// Number for the ticket being built.
    pub fn current(&self) -> u32 {
        self.next_order_id
    }

    /// Moves to the next number once the current order is finished.
    pub fn advance(&mut self) -> u32 {
        self.next_order_id = self.next_order_id.saturating_add(1);
        self.next_order_id
    }
}

/// Directory-backed JSON store for settings and the order sequence.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads settings, merging a partial file over the defaults.
    /// A missing file yields the defaults.
    pub fn load_settings(&self) -> ConfigResult<ShopSettings> {
        self.load(SETTINGS_FILE)
    }

    pub fn save_settings(&self, settings: &ShopSettings) -> ConfigResult<()> {
        self.save(SETTINGS_FILE, settings)
    }

    pub fn load_sequence(&self) -> ConfigResult<OrderSequence> {
        self.load(SEQUENCE_FILE)
    }

    pub fn save_sequence(&self, sequence: &OrderSequence) -> ConfigResult<()> {
        self.save(SEQUENCE_FILE, sequence)
    }

    fn load<T: for<'de> Deserialize<'de> + Default>(&self, name: &str) -> ConfigResult<T> {
        let path = self.dir.join(name);
        if !path.exists() {
            debug!(path = %path.display(), "no stored file, using defaults");
            return Ok(T::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save<T: Serialize>(&self, name: &str, value: &T) -> ConfigResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        info!(path = %path.display(), "saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_merge_over_defaults() {
        let s: ShopSettings =
            serde_json::from_str(r#"{"shopName":"Trailer do João","printerWidth":"80mm"}"#)
                .unwrap();
        assert_eq!(s.shop_name, "Trailer do João");
        assert_eq!(s.printer_width, PaperWidth::Mm80);
        assert_eq!(s.printer_type, PrinterMode::System);
        assert_eq!(s.footer_message, DEFAULT_FOOTER);
    }

    #[test]
    fn test_ticket_config_from_settings() {
        let s = ShopSettings {
            printer_type: PrinterMode::Bluetooth,
            footer_message: "Volte sempre".into(),
            printer_padding_left: 2,
            ..Default::default()
        };
        let cfg = s.ticket_config();
        assert_eq!(cfg.printer_mode, PrinterMode::Bluetooth);
        assert_eq!(cfg.default_footer, "Volte sempre");
        assert_eq!(cfg.left_padding, 2);
        assert_eq!(cfg.paper_width.columns(), 32);
    }

    #[test]
    fn test_shop_info_drops_blank_optionals() {
        let s = ShopSettings {
            shop_name: "X".into(),
            phone: "  ".into(),
            document: "12.345".into(),
            ..Default::default()
        };
        let info = s.shop_info();
        assert_eq!(info.phone, None);
        assert_eq!(info.document.as_deref(), Some("12.345"));
    }

    #[test]
    fn test_sequence_advances() {
        let mut seq = OrderSequence::default();
        assert_eq!(seq.current(), 1);
        assert_eq!(seq.advance(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn test_store_roundtrip_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("jpos"));
        assert_eq!(store.load_settings().unwrap(), ShopSettings::default());
        assert_eq!(store.load_sequence().unwrap().current(), 1);

        let settings = ShopSettings {
            shop_name: "Trailer".into(),
            ..Default::default()
        };
        store.save_settings(&settings).unwrap();
        store.save_sequence(&OrderSequence::starting_at(7)).unwrap();

        assert_eq!(store.load_settings().unwrap(), settings);
        assert_eq!(store.load_sequence().unwrap().current(), 7);
    }
}
