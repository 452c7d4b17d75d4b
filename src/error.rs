use thiserror::Error;

/// Failures while pulling fields out of a single receipt document.
///
/// Both variants are recoverable for the surrounding batch: the document is
/// skipped and the remaining messages keep processing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("required field not found: {field}")]
    FieldMissing { field: &'static str },

    #[error("document could not be read: {0}")]
    UnreadableDocument(String),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no rule for sender '{sender}' with subject '{subject}'")]
    NoRule { sender: String, subject: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("ticket download failed: {0}")]
    Download(#[from] reqwest::Error),
}

/// A malformed travel date indicates a broken extraction rule, not bad
/// external data, so this aborts the whole eligibility step.
#[derive(Debug, Error)]
pub enum DateFormatError {
    #[error("unknown month abbreviation in '{0}'")]
    UnknownMonth(String),

    #[error("unparseable travel date: {0}")]
    BadDate(#[from] chrono::ParseError),
}

#[derive(Debug, Error)]
pub enum PortalStepError {
    #[error("portal request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("folio validation rejected: {0}")]
    Validate(String),

    #[error("invoice registration failed with status {status}")]
    Register { status: u16 },

    #[error("customer field missing from registration response: {0}")]
    MissingField(&'static str),

    #[error("invoice submission failed with status {status}")]
    Submit { status: u16 },

    #[error("download link not present in submission response")]
    BadLink,
}

/// Failures that abort a whole scheduled run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token store: {0}")]
    TokenStore(String),

    #[error(transparent)]
    DateFormat(#[from] DateFormatError),
}
