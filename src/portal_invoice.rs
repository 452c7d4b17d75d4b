use regex::Regex;
use scraper::Html;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::info;

use crate::config::PortalConfig;
use crate::error::PortalStepError;
use crate::scrape;
use crate::ticket_pdf::TicketRecord;

const VALIDATE_URL: &str = "http://factura.grupoado.com.mx/jsp/validate.jsp";
const REGISTER_URL: &str = "http://factura.grupoado.com.mx/register.jsp";
const FACTURAR_URL: &str = "http://factura.grupoado.com.mx/facturar.jsp";

/// The portal reads -1 as "no lot opened yet"; the first validation call
/// replies with the real lot id.
pub const NO_LOT: i64 = -1;

// Pre-filled customer fields scraped from the registration response, by
// element id and in submission order.
const CUSTOMER_FIELD_IDS: &[&str] = &[
    "RRfc",
    "IDDatosCliente",
    "RName",
    "RCalle",
    "RColonia",
    "RNumExt",
    "RNumInt",
    "RMunicipio",
    "RCodigoPostal",
    "RPais",
    "REmail",
];

// These two never appear as form values; the portal assigns them from
// inline script text instead.
const SCRIPT_FIELD_IDS: &[&str] = &["RNac", "REstado"];

fn link_arg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\('(.+)'\)").expect("link arg regex"))
}

#[derive(Debug, Clone)]
pub struct PortalReply {
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

/// Transport seam for the billing portal. All calls of one submission run
/// must go through the same implementation instance so the portal's
/// server-side session (the lot) survives between steps.
pub trait PortalHttp {
    fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<PortalReply, PortalStepError>;
}

/// Cookie-bearing HTTP session, created fresh per submission run.
pub struct PortalSession {
    client: reqwest::blocking::Client,
}

impl PortalSession {
    pub fn new() -> Result<Self, PortalStepError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

impl PortalHttp for PortalSession {
    fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<PortalReply, PortalStepError> {
        let response = self.client.post(url).form(form).send()?;
        let status = response.status();
        let body = response.text()?;
        Ok(PortalReply {
            ok: status.is_success(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Run the validate → register → scrape → submit protocol for one ticket
/// group and return the invoice download link.
///
/// Nothing is retried: the submit endpoint is not known to be idempotent and
/// a blind retry risks a duplicate invoice. On any failure the error is
/// returned as-is for the caller to surface, and the only remaining record
/// of the attempt is the portal's own lot state.
pub fn facturar_lote<P: PortalHttp>(
    portal: &mut P,
    cfg: &PortalConfig,
    tickets: &[TicketRecord],
) -> Result<String, PortalStepError> {
    info!("invoicing a lot of {} ticket(s)", tickets.len());

    // Each validation echoes back the lot id the next one must carry, so
    // this loop is inherently sequential.
    let mut lot = NO_LOT;
    for ticket in tickets {
        lot = validate_ticket(portal, cfg, ticket, lot)?;
    }

    let reply = portal.post_form(REGISTER_URL, &register_form(cfg, lot, tickets))?;
    if !reply.ok {
        return Err(PortalStepError::Register {
            status: reply.status,
        });
    }

    let form = customer_form(&reply.body, cfg, lot)?;

    let reply = portal.post_form(FACTURAR_URL, &form)?;
    if !reply.ok {
        return Err(PortalStepError::Submit {
            status: reply.status,
        });
    }
    download_link(&reply.body).ok_or(PortalStepError::BadLink)
}

fn validate_ticket<P: PortalHttp>(
    portal: &mut P,
    cfg: &PortalConfig,
    ticket: &TicketRecord,
    lot: i64,
) -> Result<i64, PortalStepError> {
    let reply = portal.post_form(VALIDATE_URL, &validate_form(cfg, ticket, lot))?;
    if !reply.ok {
        return Err(PortalStepError::Validate(format!(
            "folio {} rejected with status {}",
            ticket.folio, reply.status
        )));
    }
    lot_from_validate_body(&reply.body)
}

pub fn validate_form(
    cfg: &PortalConfig,
    ticket: &TicketRecord,
    lot: i64,
) -> Vec<(String, String)> {
    vec![
        ("tipo".to_string(), "validateFolio".to_string()),
        ("folio".to_string(), ticket.folio.clone()),
        ("asiento".to_string(), ticket.seat.clone()),
        ("rfc".to_string(), cfg.rfc.clone()),
        ("idl".to_string(), lot.to_string()),
    ]
}

/// The validation endpoint answers with a JSON array whose first element
/// carries the accumulated lot id under `IDL`, as a number or a numeric
/// string.
pub fn lot_from_validate_body(body: &str) -> Result<i64, PortalStepError> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|err| PortalStepError::Validate(format!("unparseable response: {err}")))?;
    let idl = parsed
        .get(0)
        .and_then(|entry| entry.get("IDL"))
        .ok_or_else(|| PortalStepError::Validate("response carries no IDL".to_string()))?;
    match idl {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| PortalStepError::Validate(format!("non-integer IDL: {number}"))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| PortalStepError::Validate(format!("non-integer IDL: '{text}'"))),
        other => Err(PortalStepError::Validate(format!(
            "unexpected IDL value: {other}"
        ))),
    }
}

pub fn register_form(
    cfg: &PortalConfig,
    lot: i64,
    tickets: &[TicketRecord],
) -> Vec<(String, String)> {
    // Single-ticket lots carry the folio and seat as distinguished fields;
    // the portal wants the seat, not the price, in the amount slot.
    let (single_folio, single_seat) = match tickets {
        [only] => (only.folio.clone(), only.seat.clone()),
        _ => (String::new(), String::new()),
    };
    vec![
        ("sch_RFC".to_string(), cfg.rfc.clone()),
        ("idlote".to_string(), lot.to_string()),
        ("rfc".to_string(), cfg.rfc.clone()),
        ("sch_Id_Ticket".to_string(), single_folio),
        ("sch_Ticket_Amount".to_string(), single_seat),
    ]
}

/// Assemble the submission payload from the registration response: the
/// pre-filled customer fields, the two script-embedded ones, the renamed
/// customer-record id, the lot id, and the contact email override.
pub fn customer_form(
    register_body: &str,
    cfg: &PortalConfig,
    lot: i64,
) -> Result<Vec<(String, String)>, PortalStepError> {
    let doc = Html::parse_document(register_body);
    let mut form = Vec::new();
    let mut id_datos_cliente = String::new();
    for &field in CUSTOMER_FIELD_IDS {
        let value =
            scrape::value_by_id(&doc, field).ok_or(PortalStepError::MissingField(field))?;
        if field == "IDDatosCliente" {
            // Re-keyed below; the portal rejects the original name.
            id_datos_cliente = value;
            continue;
        }
        if field == "REmail" {
            // Never send the invoice to the address on file.
            form.push(("REmail".to_string(), cfg.invoice_email.clone()));
            continue;
        }
        form.push((field.to_string(), value));
    }
    for &field in SCRIPT_FIELD_IDS {
        let value = scrape::inline_selector_value(register_body, field)
            .ok_or(PortalStepError::MissingField(field))?;
        form.push((field.to_string(), value));
    }
    form.push(("id_datos_cliente".to_string(), id_datos_cliente));
    form.push(("idlo".to_string(), lot.to_string()));
    Ok(form)
}

/// The confirmation page exposes the invoice PDF through a download button
/// whose click handler wraps the URL in single quotes.
pub fn download_link(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    let onclick = scrape::attr_by_id(&doc, "buttondwPDF", "onclick")?;
    scrape::raw_capture(&onclick, link_arg_re())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const REGISTER_BODY: &str = r#"<html><body>
        <input id="RRfc" value="IVE950901EI6">
        <input id="IDDatosCliente" value="99887">
        <input id="RName" value="RAFAEL YOBAIN LUNA GOMEZ">
        <input id="RCalle" value="INSURGENTES SUR">
        <input id="RColonia" value="DEL VALLE">
        <input id="RNumExt" value="100">
        <input id="RNumInt" value="4">
        <input id="RMunicipio" value="BENITO JUAREZ">
        <input id="RCodigoPostal" value="03100">
        <input id="RPais" value="MEXICO">
        <input id="REmail" value="portal-kept@example.com">
        <script>
            $('#RNac [value="MEX"]').attr('selected', 'selected');
            $('#REstado [value="CDMX"]').attr('selected', 'selected');
        </script>
    </body></html>"#;

    const SUBMIT_BODY: &str = r#"<html><body>
        <button id="buttondwPDF" onclick="descargar('http://factura.grupoado.com.mx/pdf/lote-33.pdf')">PDF</button>
    </body></html>"#;

    struct FakePortal {
        calls: Vec<(String, Vec<(String, String)>)>,
        replies: VecDeque<PortalReply>,
    }

    impl FakePortal {
        fn new(replies: Vec<PortalReply>) -> Self {
            Self {
                calls: Vec::new(),
                replies: replies.into(),
            }
        }

        fn field<'a>(&'a self, call: usize, key: &str) -> &'a str {
            self.calls[call]
                .1
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .unwrap_or_else(|| panic!("call {call} carries no field {key}"))
        }
    }

    impl PortalHttp for FakePortal {
        fn post_form(
            &mut self,
            url: &str,
            form: &[(String, String)],
        ) -> Result<PortalReply, PortalStepError> {
            self.calls.push((url.to_string(), form.to_vec()));
            Ok(self.replies.pop_front().expect("unscripted portal call"))
        }
    }

    fn ok_reply(body: &str) -> PortalReply {
        PortalReply {
            ok: true,
            status: 200,
            body: body.to_string(),
        }
    }

    fn cfg() -> PortalConfig {
        PortalConfig {
            rfc: "IVE950901EI6".to_string(),
            invoice_email: "facturas@example.com".to_string(),
        }
    }

    fn ticket(folio: &str, seat: &str) -> TicketRecord {
        TicketRecord {
            folio: folio.to_string(),
            passenger_name: "RAFAEL YOBAIN LUNA GOMEZ".to_string(),
            seat: seat.to_string(),
            price: "315.00".to_string(),
            travel_date: "02 ENE 24".to_string(),
            source_message_id: "msg-1".to_string(),
        }
    }

    #[test]
    fn validations_run_in_ticket_order_threading_the_lot_id() {
        let mut portal = FakePortal::new(vec![
            ok_reply(r#"[{"IDL": 11}]"#),
            ok_reply(r#"[{"IDL": 22}]"#),
            ok_reply(r#"[{"IDL": 33}]"#),
            ok_reply(REGISTER_BODY),
            ok_reply(SUBMIT_BODY),
        ]);
        let tickets = vec![ticket("111", "1"), ticket("222", "2"), ticket("333", "3")];

        let link = facturar_lote(&mut portal, &cfg(), &tickets).expect("submission");
        assert_eq!(link, "http://factura.grupoado.com.mx/pdf/lote-33.pdf");

        assert_eq!(portal.calls.len(), 5);
        for call in 0..3 {
            assert_eq!(portal.calls[call].0, VALIDATE_URL);
            assert_eq!(portal.field(call, "tipo"), "validateFolio");
        }
        assert_eq!(portal.field(0, "folio"), "111");
        assert_eq!(portal.field(0, "idl"), "-1");
        assert_eq!(portal.field(1, "folio"), "222");
        assert_eq!(portal.field(1, "idl"), "11");
        assert_eq!(portal.field(2, "folio"), "333");
        assert_eq!(portal.field(2, "idl"), "22");

        assert_eq!(portal.calls[3].0, REGISTER_URL);
        assert_eq!(portal.field(3, "idlote"), "33");
        assert_eq!(portal.calls[4].0, FACTURAR_URL);
        assert_eq!(portal.field(4, "idlo"), "33");
    }

    #[test]
    fn single_validation_failure_aborts_the_whole_group() {
        let mut portal = FakePortal::new(vec![
            ok_reply(r#"[{"IDL": 11}]"#),
            PortalReply {
                ok: false,
                status: 500,
                body: String::new(),
            },
        ]);
        let tickets = vec![ticket("111", "1"), ticket("222", "2"), ticket("333", "3")];

        let err = facturar_lote(&mut portal, &cfg(), &tickets).expect_err("should abort");
        assert!(matches!(err, PortalStepError::Validate(_)));
        // No register or submit call after the failed validation.
        assert_eq!(portal.calls.len(), 2);
    }

    #[test]
    fn submit_failure_reports_failure_without_panicking() {
        let mut portal = FakePortal::new(vec![
            ok_reply(r#"[{"IDL": 11}]"#),
            ok_reply(REGISTER_BODY),
            PortalReply {
                ok: false,
                status: 502,
                body: String::new(),
            },
        ]);
        let tickets = vec![ticket("111", "1")];

        let err = facturar_lote(&mut portal, &cfg(), &tickets).expect_err("should fail");
        assert!(matches!(err, PortalStepError::Submit { status: 502 }));
    }

    #[test]
    fn a_fresh_run_starts_again_from_the_no_lot_sentinel() {
        // A prior failure leaves no residual lot state behind.
        for _ in 0..2 {
            let mut portal = FakePortal::new(vec![PortalReply {
                ok: false,
                status: 500,
                body: String::new(),
            }]);
            let tickets = vec![ticket("111", "1")];
            let _ = facturar_lote(&mut portal, &cfg(), &tickets);
            assert_eq!(portal.field(0, "idl"), "-1");
        }
    }

    #[test]
    fn register_form_distinguishes_single_ticket_lots() {
        let single = register_form(&cfg(), 33, &[ticket("111", "7")]);
        let find = |form: &[(String, String)], key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .expect("field present")
        };
        assert_eq!(find(&single, "sch_Id_Ticket"), "111");
        assert_eq!(find(&single, "sch_Ticket_Amount"), "7");

        let multi = register_form(&cfg(), 33, &[ticket("111", "7"), ticket("222", "8")]);
        assert_eq!(find(&multi, "sch_Id_Ticket"), "");
        assert_eq!(find(&multi, "sch_Ticket_Amount"), "");
    }

    #[test]
    fn customer_form_rewrites_keys_and_always_overrides_the_email() {
        let form = customer_form(REGISTER_BODY, &cfg(), 33).expect("scrape");
        let keys = form.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        assert!(!keys.contains(&"IDDatosCliente"));
        let find = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .expect("field present")
        };
        assert_eq!(find("id_datos_cliente"), "99887");
        assert_eq!(find("idlo"), "33");
        assert_eq!(find("RNac"), "MEX");
        assert_eq!(find("REstado"), "CDMX");
        // The scraped address differs from the configured one and must lose.
        assert_eq!(find("REmail"), "facturas@example.com");
        assert_eq!(find("RRfc"), "IVE950901EI6");
        assert_eq!(find("RCodigoPostal"), "03100");
    }

    #[test]
    fn customer_form_fails_when_a_field_is_missing() {
        let body = REGISTER_BODY.replace(r#"<input id="RCalle" value="INSURGENTES SUR">"#, "");
        let err = customer_form(&body, &cfg(), 33).expect_err("should fail");
        assert!(matches!(err, PortalStepError::MissingField("RCalle")));
    }

    #[test]
    fn lot_id_parses_from_number_or_numeric_string() {
        assert_eq!(lot_from_validate_body(r#"[{"IDL": 42}]"#).expect("number"), 42);
        assert_eq!(
            lot_from_validate_body(r#"[{"IDL": "42"}]"#).expect("string"),
            42
        );
        assert!(lot_from_validate_body(r#"[{"IDL": null}]"#).is_err());
        assert!(lot_from_validate_body(r#"[]"#).is_err());
        assert!(lot_from_validate_body("not json").is_err());
    }

    #[test]
    fn download_link_comes_from_the_button_click_handler() {
        assert_eq!(
            download_link(SUBMIT_BODY),
            Some("http://factura.grupoado.com.mx/pdf/lote-33.pdf".to_string())
        );
        assert_eq!(download_link("<html><body>listo</body></html>"), None);
    }
}
