use pdf_extract::extract_text_from_mem;
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use tracing::info;

use crate::error::ParseError;
use crate::scrape;

/// One bus ticket as printed on a single PDF page. Folio and seat together
/// identify the ticket within a batch; the travel date stays in the vendor's
/// own text form until the eligibility step resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    pub folio: String,
    pub passenger_name: String,
    pub seat: String,
    pub price: String,
    pub travel_date: String,
    pub source_message_id: String,
}

// Field anchors as laid out on the vendor's ticket PDF. These encode the
// live document template and must not be loosened.
fn folio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+").expect("folio regex"))
}

fn passenger_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/NAME(.+)ORIGEN").expect("passenger regex"))
}

fn seat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"SEAT(.+)FECHA").expect("seat regex"))
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$ (.+)PRECIO").expect("price regex"))
}

fn travel_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/DATEADULTO[^\d]+(.+)HORA/HOUR").expect("travel date regex"))
}

fn boleto_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("Boleto").expect("boleto regex"))
}

/// Ticket-download link inside the vendor's email body.
pub fn boleto_link(doc: &Html) -> Option<String> {
    scrape::anchor_href_matching(doc, boleto_re())
}

fn capture(pattern: &Regex, text: &str, field: &'static str) -> Result<String, ParseError> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::FieldMissing { field })
}

pub fn ticket_from_page_text(text: &str, message_id: &str) -> Result<TicketRecord, ParseError> {
    let text = text.trim_start();
    let folio = folio_re()
        .find(text)
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::FieldMissing { field: "folio" })?;
    Ok(TicketRecord {
        folio,
        passenger_name: capture(passenger_re(), text, "passenger name")?,
        seat: capture(seat_re(), text, "seat")?,
        price: capture(price_re(), text, "price")?,
        travel_date: capture(travel_date_re(), text, "travel date")?,
        source_message_id: message_id.to_string(),
    })
}

/// Decode a ticket PDF and extract one record per page, in page order.
///
/// A field missing on any page fails the whole document; an undecodable
/// byte stream is reported as the distinct unreadable condition so callers
/// can skip the document and tell the operator.
pub fn parse_ticket_pdf(bytes: &[u8], message_id: &str) -> Result<Vec<TicketRecord>, ParseError> {
    let text = extract_text_from_mem(bytes)
        .map_err(|err| ParseError::UnreadableDocument(err.to_string()))?;
    let tickets = tickets_from_document_text(&text, message_id)?;
    info!("extracted {} ticket(s) from pdf", tickets.len());
    Ok(tickets)
}

/// Pages arrive separated by form feeds; each non-empty page is one ticket,
/// kept in page order.
pub fn tickets_from_document_text(
    text: &str,
    message_id: &str,
) -> Result<Vec<TicketRecord>, ParseError> {
    let mut tickets = Vec::new();
    for page in text.split('\u{000C}') {
        if page.trim().is_empty() {
            continue;
        }
        tickets.push(ticket_from_page_text(page, message_id)?);
    }
    if tickets.is_empty() {
        return Err(ParseError::UnreadableDocument(
            "no ticket pages in document".to_string(),
        ));
    }
    Ok(tickets)
}

pub fn download(
    client: &reqwest::blocking::Client,
    link: &str,
) -> Result<Vec<u8>, reqwest::Error> {
    let bytes = client.get(link).send()?.error_for_status()?.bytes()?;
    Ok(bytes.to_vec())
}
