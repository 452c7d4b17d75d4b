pub mod config;
pub mod eligibility;
pub mod error;
pub mod expense_rules;
pub mod graph_mail;
pub mod jobs;
pub mod notify;
pub mod portal_invoice;
pub mod scrape;
pub mod ticket_pdf;
pub mod token_store;

pub use config::AppConfig;
pub use error::{ClassifyError, DateFormatError, JobError, ParseError, PortalStepError};
pub use expense_rules::{classify, TransactionRecord};
pub use jobs::JobContext;
pub use ticket_pdf::TicketRecord;
