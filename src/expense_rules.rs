use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::error::{ClassifyError, ParseError};
use crate::graph_mail::ReceiptMessage;
use crate::scrape;
use crate::ticket_pdf;

/// Normalized expense produced from one receipt document. Amounts keep the
/// exact text extracted from the source; they feed a URL scheme and a
/// human-readable message, both of which must reproduce it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionRecord {
    pub amount: String,
    pub description: String,
    pub category: String,
    pub payee: String,
    pub tag: Option<String>,
    pub notes: Option<String>,
    pub account: Option<String>,
}

impl TransactionRecord {
    /// Present fields in registration order, for URL-scheme and message
    /// formatting.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut out = vec![
            ("amount", self.amount.as_str()),
            ("description", self.description.as_str()),
            ("category", self.category.as_str()),
            ("payee", self.payee.as_str()),
        ];
        if let Some(tag) = &self.tag {
            out.push(("tag", tag));
        }
        if let Some(notes) = &self.notes {
            out.push(("notes", notes));
        }
        if let Some(account) = &self.account {
            out.push(("account", account));
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SubjectMatch {
    Any,
    Contains(&'static str),
    Equals(&'static str),
}

impl SubjectMatch {
    fn matches(&self, subject: &str) -> bool {
        match self {
            SubjectMatch::Any => true,
            SubjectMatch::Contains(fragment) => subject.contains(fragment),
            SubjectMatch::Equals(expected) => subject == *expected,
        }
    }
}

pub struct ParseContext<'a> {
    pub http: &'a reqwest::blocking::Client,
}

type ParseFn =
    fn(&ParseContext, &ReceiptMessage, &Html) -> Result<Vec<TransactionRecord>, ClassifyError>;

/// One (sender, subject) dispatch entry tied to a vendor's extraction rules.
pub struct VendorRule {
    pub sender: &'static str,
    pub subject: SubjectMatch,
    parse: ParseFn,
}

// Resolved by linear scan, first match wins: the Uber Eats entry must stay
// ahead of the generic Uber entry since both share a sender. Adding a vendor
// means adding one entry here plus its parse function.
pub const VENDOR_RULES: &[VendorRule] = &[
    VendorRule {
        sender: "Uber Receipts",
        subject: SubjectMatch::Contains("Uber Eats"),
        parse: parse_uber_eats,
    },
    VendorRule {
        sender: "Uber Receipts",
        subject: SubjectMatch::Any,
        parse: parse_uber,
    },
    VendorRule {
        sender: "ADO en Linea",
        subject: SubjectMatch::Any,
        parse: parse_ado,
    },
    VendorRule {
        sender: "Parkimovil",
        subject: SubjectMatch::Any,
        parse: parse_parkimovil,
    },
    VendorRule {
        sender: "Apple",
        subject: SubjectMatch::Equals("Your receipt from Apple."),
        parse: parse_apple_receipt,
    },
];

/// Route a message to the vendor rule matching its sender and subject and
/// return the extracted records, in source document order.
pub fn classify(
    ctx: &ParseContext,
    message: &ReceiptMessage,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    let rule = VENDOR_RULES
        .iter()
        .find(|rule| {
            rule.sender == message.sender_name() && rule.subject.matches(&message.subject)
        })
        .ok_or_else(|| ClassifyError::NoRule {
            sender: message.sender_name().to_string(),
            subject: message.subject.clone(),
        })?;
    let doc = Html::parse_document(message.body_html());
    (rule.parse)(ctx, message, &doc)
}

fn mx_currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"MX\$.+").expect("currency regex"))
}

fn total_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("Total:").expect("total marker regex"))
}

fn visit_place_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<strong>(.+)</strong>\s*le agradece su visita\.").expect("visit place regex")
    })
}

fn total_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("TOTAL").expect("total cell regex"))
}

fn item_cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("td.item-cell.aapl-mobile-cell").expect("item cell selector"))
}

fn item_title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span.title").expect("item title selector"))
}

/// Trip and meal receipts share the amount rule: first text node carrying
/// the MX$ prefix.
fn mx_amount(doc: &Html) -> Result<String, ParseError> {
    scrape::first_text_matching(doc, mx_currency_re())
        .map(|text| text.replace("MX$", ""))
        .ok_or(ParseError::FieldMissing { field: "amount" })
}

fn parse_uber_eats(
    _ctx: &ParseContext,
    _message: &ReceiptMessage,
    doc: &Html,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    Ok(vec![TransactionRecord {
        amount: mx_amount(doc)?,
        description: "Comida".to_string(),
        category: "Comida".to_string(),
        payee: "Uber Eats".to_string(),
        ..Default::default()
    }])
}

fn parse_uber(
    _ctx: &ParseContext,
    _message: &ReceiptMessage,
    doc: &Html,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    Ok(vec![TransactionRecord {
        amount: mx_amount(doc)?,
        description: "Uber".to_string(),
        category: "Taxi".to_string(),
        payee: "Uber".to_string(),
        ..Default::default()
    }])
}

/// The ticket vendor's email only links to the receipt: download the PDF and
/// emit one record per ticket page, in page order.
fn parse_ado(
    ctx: &ParseContext,
    message: &ReceiptMessage,
    doc: &Html,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    let link = ticket_pdf::boleto_link(doc).ok_or(ParseError::FieldMissing {
        field: "boleto link",
    })?;
    let bytes = ticket_pdf::download(ctx.http, &link)?;
    let tickets = ticket_pdf::parse_ticket_pdf(&bytes, &message.id)?;
    Ok(tickets
        .into_iter()
        .map(|ticket| TransactionRecord {
            amount: ticket.price,
            description: "ADO".to_string(),
            category: "Deudas".to_string(),
            payee: "ADO".to_string(),
            tag: Some("Deudas".to_string()),
            ..Default::default()
        })
        .collect())
}

fn parse_parkimovil(
    _ctx: &ParseContext,
    message: &ReceiptMessage,
    doc: &Html,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    // The total lives in the text node three children after the marker's
    // opening tag inside the same parent.
    let amount = scrape::marker_parent_content(doc, "strong", total_marker_re(), 3)
        .map(|text| text.replace("MX$", ""))
        .ok_or(ParseError::FieldMissing { field: "amount" })?;
    let place = scrape::raw_capture(message.body_html(), visit_place_re())
        .ok_or(ParseError::FieldMissing { field: "visit place" })?;
    Ok(vec![TransactionRecord {
        amount,
        description: "Estacionamiento".to_string(),
        category: "Servicios".to_string(),
        payee: "Parkimovil".to_string(),
        notes: Some(format!("Lugar: {place}")),
        ..Default::default()
    }])
}

fn parse_apple_receipt(
    _ctx: &ParseContext,
    _message: &ReceiptMessage,
    doc: &Html,
) -> Result<Vec<TransactionRecord>, ClassifyError> {
    let amount = scrape::marker_parent_content(doc, "td", total_cell_re(), 5)
        .map(|text| text.replace('$', "").trim().to_string())
        .ok_or(ParseError::FieldMissing { field: "amount" })?;
    let items = doc
        .select(item_cell_selector())
        .filter_map(|cell| cell.select(item_title_selector()).next())
        .map(|title| title.text().collect::<Vec<_>>().join("").trim().to_string())
        .collect::<Vec<_>>();
    if items.is_empty() {
        return Err(ParseError::FieldMissing {
            field: "purchased items",
        }
        .into());
    }
    Ok(vec![TransactionRecord {
        amount,
        description: items.join(", "),
        category: "Servicios".to_string(),
        payee: "Apple".to_string(),
        ..Default::default()
    }])
}
