use chrono::{DateTime, FixedOffset};
use tracing::warn;

use crate::config::TelegramConfig;
use crate::expense_rules::TransactionRecord;

const TELEGRAM_URL: &str = "https://api.telegram.org";

/// Expense capture scheme consumed by the bookkeeping app on the phone.
const EXPENSE_URL_SCHEME: &str = "dcapp://x-callback-url/expense?";

/// Card every captured expense is booked against unless a rule says
/// otherwise.
pub const DEFAULT_EXPENSE_ACCOUNT: &str = "BBVA Crédito";

/// Fire-and-forget delivery: a rejected or failed send is logged and never
/// propagated to the caller.
pub fn send(client: &reqwest::blocking::Client, cfg: &TelegramConfig, text: &str) {
    let url = format!("{TELEGRAM_URL}/bot{}/sendMessage", cfg.bot_token);
    let params = [
        ("chat_id", cfg.chat_id.as_str()),
        ("text", text),
        ("parse_mode", "html"),
    ];
    match client.post(url).form(&params).send() {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => warn!("telegram rejected message with status {}", response.status()),
        Err(err) => warn!("telegram send failed: {err}"),
    }
}

pub fn expense_url_scheme(record: &TransactionRecord) -> String {
    let params = record
        .fields()
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{EXPENSE_URL_SCHEME}{params}")
}

fn title_case(key: &str) -> String {
    key.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Field-by-field block with title-cased keys, the capture date, and the
/// URL scheme to log the expense with one tap.
pub fn format_expense_message(
    record: &TransactionRecord,
    now: DateTime<FixedOffset>,
) -> String {
    let mut text = String::from("<b>Gasto detectado</b>\n\n");
    for (key, value) in record.fields() {
        text.push_str(&format!("<b>{}</b>: {value}\n", title_case(key)));
    }
    text.push_str(&format!("\n<b>Date</b>: {}\n\n", now.format("%Y-%m-%d, %H:%M")));
    text.push_str(&format!(
        "<b>D&C URL scheme</b>: {}",
        expense_url_scheme(record)
    ));
    text
}

pub fn format_invoice_message(link: Option<&str>) -> String {
    let mut text = String::from("*Facturación detectada ADO*\n\n");
    match link {
        Some(link) => text.push_str(&format!("*PDF Link*: {link}")),
        None => text.push_str("Facturación fallida"),
    }
    text
}

pub fn format_unreadable_ticket_message(link: &str) -> String {
    format!(
        "*Facturación ADO*\n\nNo fue posible leer el boleto: {link}\n\
         Probablemente fue cancelado o cambiado."
    )
}
