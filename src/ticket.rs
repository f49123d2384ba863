//! Order data and the fixed receipt layout.
//!
//! [`format_ticket`] composes encoder calls into the ESC/POS ticket sent to a
//! BLE printer. [`preview_lines`] renders the same receipt as plain text for
//! the host print flow.

use chrono::NaiveDateTime;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_FOOTER, TicketConfig};
use crate::protocol::{Align, EncodedTicket, EscPosEncoder};

pub const FALLBACK_SHOP_NAME: &str = "LOJA SEM NOME";
pub const BANNER: &str = "*** COMPROVANTE ***";
pub const COLUMN_HEADER: &str = "ITEM                 QTD   TOTAL";
pub const TRAILER: &str = "JPos Thermal";
const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShopInfo {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    /// Tax id (CNPJ/CPF)
    pub document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    /// Price times quantity, saturating at the `Decimal` bounds.
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Everything printed on one receipt. Not validated here: negative prices
/// and the like are rendered as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub shop: ShopInfo,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub number: u32,
    pub captured_at: NaiveDateTime,
    /// Overrides the configured footer when non-empty
    pub footer: Option<String>,
}

impl Order {
    /// Builds an order whose total is the sum of its line totals.
    pub fn new(
        shop: ShopInfo,
        items: Vec<LineItem>,
        number: u32,
        captured_at: NaiveDateTime,
    ) -> Self {
        let total = items
            .iter()
            .map(LineItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        Self {
            shop,
            items,
            total,
            number,
            captured_at,
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Order number as printed, e.g. `#0007`.
    pub fn label(&self) -> String {
        format!("#{:04}", self.number)
    }

    fn shop_name(&self) -> String {
        if self.shop.name.trim().is_empty() {
            FALLBACK_SHOP_NAME.to_string()
        } else {
            self.shop.name.to_uppercase()
        }
    }

    fn timestamp(&self) -> String {
        self.captured_at.format(DATE_FORMAT).to_string()
    }

    /// Custom footer, then the configured default, then the built-in message.
    pub fn footer_text<'a>(&'a self, config: &'a TicketConfig) -> &'a str {
        [self.footer.as_deref(), Some(config.default_footer.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(DEFAULT_FOOTER)
    }
}

/// Fixed two-decimal rendering, `19.9` -> `19.90`.
pub fn format_money(value: Decimal) -> String {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v.to_string()
}

fn item_detail(item: &LineItem) -> String {
    format!(
        "{:<5} R$ {:>8}",
        format!("{}x", item.quantity),
        format_money(item.line_total())
    )
}

/// Composes the receipt into an ESC/POS ticket.
pub fn format_ticket(order: &Order, config: &TicketConfig) -> EncodedTicket {
    let mut enc = EscPosEncoder::new()
        .reset()
        .align(Align::Center)
        .emphasis(true)
        .text(order.shop_name())
        .newline(1)
        .emphasis(false);

    let address = order.shop.address.as_str();
    if !address.trim().is_empty() {
        enc = enc.text(address).newline(1);
    }
    if let Some(phone) = order.shop.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        enc = enc.text(format!("Tel: {phone}")).newline(1);
    }

    let enc = enc
        .separator_line('-')
        .align(Align::Left)
        .text(format!("DATA: {}", order.timestamp()))
        .newline(1)
        .text(format!("PEDIDO: {}", order.label()))
        .newline(1)
        .separator_line('-')
        .align(Align::Center)
        .emphasis(true)
        .text(BANNER)
        .newline(1)
        .separator_line('-')
        .align(Align::Left)
        .emphasis(true)
        .text(COLUMN_HEADER)
        .newline(1)
        .emphasis(false);

    let enc = order.items.iter().fold(enc, |enc, item| {
        enc.text(&item.name)
            .newline(1)
            .align(Align::Right)
            .text(item_detail(item))
            .newline(1)
            .align(Align::Left)
    });

    enc.separator_line('-')
        .align(Align::Right)
        .emphasis(true)
        .text(format!("TOTAL: R$ {}", format_money(order.total)))
        .newline(1)
        .separator_line('-')
        .align(Align::Center)
        .emphasis(false)
        .newline(1)
        .text(order.footer_text(config))
        .newline(1)
        .text(TRAILER)
        .newline(3)
        .cut()
        .encode()
}

// === Plain-text preview ===

fn width_of(s: &str) -> usize {
    s.chars().count()
}

fn center(s: &str, width: usize) -> String {
    let w = width_of(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat((width - w) / 2), s)
}

fn left_right(left: &str, right: &str, width: usize) -> String {
    let used = width_of(left) + width_of(right);
    if used >= width {
        format!("{left} {right}")
    } else {
        format!("{left}{}{right}", " ".repeat(width - used))
    }
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// Item, quantity and total columns at roughly 1/2, 1/6 and 1/3 of the line.
fn item_row(name: &str, qty: &str, total: &str, width: usize) -> String {
    let name_w = width / 2;
    let qty_w = width / 6;
    let total_w = width - name_w - qty_w;
    format!(
        "{:<name_w$}{:>qty_w$}{:>total_w$}",
        truncate(name, name_w.saturating_sub(1)),
        qty,
        total
    )
}

/// Renders the receipt as plain-text lines for the host print flow, sized to
/// the configured paper width and indented by the configured padding.
pub fn preview_lines(order: &Order, config: &TicketConfig) -> Vec<String> {
    let width = config.paper_width.columns();
    let dashes = "-".repeat(width);
    let mut lines = vec![center(&order.shop_name(), width)];

    let address = order.shop.address.as_str();
    if !address.trim().is_empty() {
        lines.push(center(address, width));
    }
    if let Some(phone) = order.shop.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        lines.push(center(&format!("Tel: {phone}"), width));
    }
    if let Some(doc) = order.shop.document.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(center(&format!("CNPJ/CPF: {doc}"), width));
    }

    lines.push(dashes.clone());
    lines.push(left_right(&order.timestamp(), &order.label(), width));
    lines.push(center(BANNER, width));
    lines.push(dashes.clone());
    lines.push(item_row("ITEM", "QTD", "TOTAL", width));
    for item in &order.items {
        lines.push(item_row(
            &item.name,
            &format!("{}x", item.quantity),
            &format!("R$ {}", format_money(item.line_total())),
            width,
        ));
    }
    lines.push(dashes.clone());
    lines.push(left_right(
        "TOTAL:",
        &format!("R$ {}", format_money(order.total)),
        width,
    ));
    lines.push(dashes);
    lines.push(center(order.footer_text(config), width));
    lines.push(center(TRAILER, width));

    let pad = " ".repeat(config.left_padding);
    lines
        .into_iter()
        .map(|l| format!("{pad}{l}").trim_end().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(format_money(Decimal::new(199, 1)), "19.90");
        assert_eq!(format_money(Decimal::new(43, 0)), "43.00");
        assert_eq!(format_money(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_money(Decimal::new(-5, 1)), "-0.50");
    }

    #[test]
    fn test_line_total_is_derived() {
        let item = LineItem::new("X-Tudo", Decimal::new(1850, 2), 2);
        assert_eq!(item.line_total(), Decimal::new(37, 0));
    }

    #[test]
    fn test_huge_totals_saturate() {
        let item = LineItem::new("Lote", Decimal::MAX, 2);
        assert_eq!(item.line_total(), Decimal::MAX);

        let order = Order::new(ShopInfo::default(), vec![item.clone(), item], 1, at());
        assert_eq!(order.total, Decimal::MAX);
        let bytes = format_ticket(&order, &TicketConfig::default());
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_item_detail_padding() {
        let item = LineItem::new("Refri", Decimal::new(600, 2), 1);
        assert_eq!(item_detail(&item), "1x    R$     6.00");
    }

    #[test]
    fn test_footer_precedence() {
        let order = Order::new(ShopInfo::default(), vec![], 1, at());
        let mut cfg = TicketConfig::default();
        cfg.default_footer = "Volte sempre".into();
        assert_eq!(order.footer_text(&cfg), "Volte sempre");

        let custom = order.clone().with_footer("Feliz aniversario");
        assert_eq!(custom.footer_text(&cfg), "Feliz aniversario");

        cfg.default_footer = String::new();
        assert_eq!(order.footer_text(&cfg), DEFAULT_FOOTER);
        assert_eq!(order.clone().with_footer(" ").footer_text(&cfg), DEFAULT_FOOTER);
    }

    #[test]
    fn test_label_zero_padded() {
        let order = Order::new(ShopInfo::default(), vec![], 42, at());
        assert_eq!(order.label(), "#0042");
    }

    #[test]
    fn test_blank_shop_name_fallback() {
        let order = Order::new(ShopInfo::default(), vec![], 1, at());
        let bytes = format_ticket(&order, &TicketConfig::default());
        let text = String::from_utf8_lossy(bytes.as_bytes());
        assert!(text.contains(FALLBACK_SHOP_NAME));
    }

    #[test]
    fn test_shop_fields_printed_as_given() {
        let shop = ShopInfo {
            name: " Loja ".into(),
            address: "  Rua A, 10".into(),
            ..Default::default()
        };
        let order = Order::new(shop, vec![], 1, at());
        let bytes = format_ticket(&order, &TicketConfig::default());
        let text = String::from_utf8_lossy(bytes.as_bytes());
        assert!(text.contains(" LOJA \n"));
        assert!(text.contains("  Rua A, 10\n"));

        let blank = Order::new(
            ShopInfo {
                name: "   ".into(),
                address: " ".into(),
                ..Default::default()
            },
            vec![],
            1,
            at(),
        );
        let empty = Order::new(ShopInfo::default(), vec![], 1, at());
        assert_eq!(
            format_ticket(&blank, &TicketConfig::default()).as_bytes(),
            format_ticket(&empty, &TicketConfig::default()).as_bytes()
        );
    }

    #[test]
    fn test_missing_phone_omits_line() {
        let shop = ShopInfo {
            name: "Loja".into(),
            ..Default::default()
        };
        let order = Order::new(shop, vec![], 1, at());
        let bytes = format_ticket(&order, &TicketConfig::default());
        let text = String::from_utf8_lossy(bytes.as_bytes());
        assert!(!text.contains("Tel:"));
    }

    #[test]
    fn test_preview_layout() {
        let shop = ShopInfo {
            name: "Loja".into(),
            address: "Rua A".into(),
            phone: None,
            document: Some("123".into()),
        };
        let order = Order::new(
            shop,
            vec![LineItem::new("Refri", Decimal::new(600, 2), 1)],
            3,
            at(),
        );
        let lines = preview_lines(&order, &TicketConfig::default());
        assert_eq!(lines[0], format!("{}LOJA", " ".repeat(14)));
        assert!(lines.iter().any(|l| l.ends_with("CNPJ/CPF: 123")));
        assert!(lines.contains(&format!("09/03/2024 14:05{}#0003", " ".repeat(11))));
        assert!(lines.contains(&format!("TOTAL:{}R$ 6.00", " ".repeat(19))));
        assert!(lines.iter().all(|l| width_of(l) <= 32));
    }

    #[test]
    fn test_preview_padding() {
        let order = Order::new(ShopInfo::default(), vec![], 1, at());
        let cfg = TicketConfig {
            left_padding: 2,
            ..Default::default()
        };
        let lines = preview_lines(&order, &cfg);
        assert!(lines.iter().all(|l| l.starts_with("  ")));
    }
}
