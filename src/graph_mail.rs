use serde::Deserialize;
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::error::JobError;
use crate::token_store::TokenStore;

const MS_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const REDIRECT_URI: &str = "http://localhost:5000/";
const TOKEN_SCOPES: &[&str] = &[
    "offline_access",
    "user.readwrite",
    "mail.read",
    "mail.send",
    "mail.readwrite",
];

/// Key the rotating mailbox refresh token lives under in the token store.
pub const REFRESH_TOKEN_KEY: &str = "hotmail";

/// One inbound receipt email as the mailbox API returns it. Immutable once
/// fetched; the classifier only reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptMessage {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    pub sender: Sender,
    pub body: MessageBody,
}

impl ReceiptMessage {
    pub fn sender_name(&self) -> &str {
        &self.sender.email_address.name
    }

    pub fn body_html(&self) -> &str {
        &self.body.content
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    value: Vec<ReceiptMessage>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// Exchange the stored refresh token for a fresh access token, persisting
/// the rotated refresh token back into the store.
pub fn get_access_token(
    client: &reqwest::blocking::Client,
    cfg: &GraphConfig,
    store: &TokenStore,
) -> Result<String, JobError> {
    info!("refreshing mailbox access token");
    let refresh_token = store.get(REFRESH_TOKEN_KEY)?;
    let scope = TOKEN_SCOPES.join(" ");
    let params = [
        ("client_id", cfg.client_id.as_str()),
        ("scope", scope.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("redirect_uri", REDIRECT_URI),
        ("client_secret", cfg.client_secret.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response: TokenResponse = client
        .post(TOKEN_URL)
        .form(&params)
        .send()?
        .error_for_status()?
        .json()?;
    store.put(REFRESH_TOKEN_KEY, &response.refresh_token)?;
    Ok(response.access_token)
}

pub fn fetch_messages(
    client: &reqwest::blocking::Client,
    token: &str,
    folder_id: &str,
) -> Result<Vec<ReceiptMessage>, JobError> {
    let url = format!("{MS_GRAPH_URL}/me/mailFolders/{folder_id}/messages");
    let list: MessageList = client
        .get(url)
        .header("Authorization", token)
        .send()?
        .error_for_status()?
        .json()?;
    Ok(list.value)
}

/// Delete processed messages one at a time. A failed delete is logged and
/// the remaining deletions continue.
pub fn delete_messages(
    client: &reqwest::blocking::Client,
    token: &str,
    folder_id: &str,
    messages: &[&ReceiptMessage],
) {
    for message in messages {
        let url = format!(
            "{MS_GRAPH_URL}/me/mailFolders/{folder_id}/messages/{}",
            message.id
        );
        match client.delete(url).header("Authorization", token).send() {
            Ok(response) if response.status().is_success() => {
                info!("deleted '{}'", message.subject);
            }
            Ok(response) => {
                warn!(
                    "delete of '{}' returned status {}",
                    message.subject,
                    response.status()
                );
            }
            Err(err) => {
                warn!("delete of '{}' failed: {err}", message.subject);
            }
        }
    }
}
