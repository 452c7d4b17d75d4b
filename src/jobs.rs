use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use scraper::Html;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::eligibility;
use crate::error::{ClassifyError, JobError, ParseError};
use crate::expense_rules::{self, ParseContext};
use crate::graph_mail::{self, ReceiptMessage};
use crate::notify;
use crate::portal_invoice::{self, PortalSession};
use crate::ticket_pdf::{self, TicketRecord};
use crate::token_store::TokenStore;

/// Shared plumbing for both scheduled jobs: one plain HTTP client (the
/// invoicing portal gets its own cookie-bearing session per run) and the
/// loaded configuration.
pub struct JobContext {
    pub http: reqwest::blocking::Client,
    pub cfg: AppConfig,
}

impl JobContext {
    pub fn new(cfg: AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder().build()?;
        Ok(Self { http, cfg })
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&eligibility::mexico_city_offset())
    }
}

/// Sweep the expense folder: classify every message, push one notification
/// per extracted record, then delete only the messages that produced
/// records. Unclassified or unparseable messages stay in the mailbox.
pub fn run_expense_job(ctx: &JobContext) -> Result<(), JobError> {
    info!("expense capture run started");
    let store = TokenStore::new(&ctx.http, &ctx.cfg.firebase);
    let token = graph_mail::get_access_token(&ctx.http, &ctx.cfg.graph, &store)?;
    let messages =
        graph_mail::fetch_messages(&ctx.http, &token, &ctx.cfg.folders.expense_folder_id)?;

    let parse_ctx = ParseContext { http: &ctx.http };
    let mut records = Vec::new();
    let mut processed: Vec<&ReceiptMessage> = Vec::new();
    for message in &messages {
        match expense_rules::classify(&parse_ctx, message) {
            Ok(found) => {
                records.extend(found);
                processed.push(message);
            }
            Err(ClassifyError::NoRule { sender, subject }) => {
                info!("no rule for sender '{sender}' with subject '{subject}', skipping");
            }
            Err(err) => {
                warn!("skipping '{}': {err}", message.subject);
            }
        }
    }

    let now = ctx.local_now();
    for mut record in records {
        if record.account.is_none() {
            record.account = Some(notify::DEFAULT_EXPENSE_ACCOUNT.to_string());
        }
        notify::send(
            &ctx.http,
            &ctx.cfg.telegram,
            &notify::format_expense_message(&record, now),
        );
    }

    graph_mail::delete_messages(
        &ctx.http,
        &token,
        &ctx.cfg.folders.expense_folder_id,
        &processed,
    );
    info!("expense capture run finished");
    Ok(())
}

/// Collect last month's tickets from the ticket folder and run one invoice
/// submission per passenger group. Ticket emails are left in the mailbox.
pub fn run_invoicing_job(ctx: &JobContext) -> Result<(), JobError> {
    info!("invoicing run started");
    let store = TokenStore::new(&ctx.http, &ctx.cfg.firebase);
    let token = graph_mail::get_access_token(&ctx.http, &ctx.cfg.graph, &store)?;
    let messages =
        graph_mail::fetch_messages(&ctx.http, &token, &ctx.cfg.folders.ticket_folder_id)?;

    let mut tickets: Vec<TicketRecord> = Vec::new();
    for message in &messages {
        let doc = Html::parse_document(message.body_html());
        let Some(link) = ticket_pdf::boleto_link(&doc) else {
            warn!("no ticket link in '{}', skipping", message.subject);
            continue;
        };
        match fetch_tickets(ctx, &link, &message.id) {
            Ok(found) => tickets.extend(found),
            Err(ParseError::UnreadableDocument(reason)) => {
                warn!("unreadable ticket pdf at {link}: {reason}");
                notify::send(
                    &ctx.http,
                    &ctx.cfg.telegram,
                    &notify::format_unreadable_ticket_message(&link),
                );
            }
            Err(err) => {
                warn!("skipping ticket pdf at {link}: {err}");
            }
        }
    }

    let (primary, other) =
        eligibility::split_tickets(tickets, ctx.local_now(), &ctx.cfg.primary_passenger)?;
    for group in [primary, other] {
        if group.is_empty() {
            continue;
        }
        invoice_group(ctx, &group);
    }
    info!("invoicing run finished");
    Ok(())
}

fn fetch_tickets(
    ctx: &JobContext,
    link: &str,
    message_id: &str,
) -> Result<Vec<TicketRecord>, ParseError> {
    let bytes = ticket_pdf::download(&ctx.http, link)
        .map_err(|err| ParseError::UnreadableDocument(err.to_string()))?;
    ticket_pdf::parse_ticket_pdf(&bytes, message_id)
}

fn invoice_group(ctx: &JobContext, group: &[TicketRecord]) {
    let outcome = PortalSession::new()
        .and_then(|mut session| portal_invoice::facturar_lote(&mut session, &ctx.cfg.portal, group));
    let text = match outcome {
        Ok(link) => notify::format_invoice_message(Some(&link)),
        Err(err) => {
            warn!("invoice submission failed: {err}");
            notify::format_invoice_message(None)
        }
    };
    notify::send(&ctx.http, &ctx.cfg.telegram, &text);
}

/// The invoicing job fires when the local wall clock first passes day 1
/// 09:30 in a month it has not run in yet.
pub fn invoicing_due(now: DateTime<FixedOffset>, last_run: Option<(i32, u32)>) -> bool {
    if now.day() != 1 {
        return false;
    }
    if now.hour() < 9 || (now.hour() == 9 && now.minute() < 30) {
        return false;
    }
    last_run != Some((now.year(), now.month()))
}
