use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub firebase: FirebaseConfig,
    pub telegram: TelegramConfig,
    pub portal: PortalConfig,
    pub folders: FolderConfig,
    /// Reference traveler name tickets are fuzzy-matched against.
    pub primary_passenger: String,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub rfc: String,
    /// Invoices are always mailed here, never to the address the portal has
    /// on file.
    pub invoice_email: String,
}

#[derive(Debug, Clone)]
pub struct FolderConfig {
    pub expense_folder_id: String,
    pub ticket_folder_id: String,
}

fn required(name: &'static str) -> Result<String, String> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(format!("missing required environment variable {name}"));
    }
    Ok(value)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            graph: GraphConfig {
                client_id: required("CLIENT_ID")?,
                client_secret: required("CLIENT_SECRET")?,
            },
            firebase: FirebaseConfig {
                database_url: required("FIREBASE_DATABASE_URL")?,
                auth_token: required("FIREBASE_AUTH_TOKEN")?,
            },
            telegram: TelegramConfig {
                bot_token: required("TELEGRAM_BOT_TOKEN")?,
                chat_id: required("TELEGRAM_CHAT_ID")?,
            },
            portal: PortalConfig {
                rfc: required("PORTAL_RFC")?,
                invoice_email: required("INVOICE_EMAIL")?,
            },
            folders: FolderConfig {
                expense_folder_id: required("EXPENSE_FOLDER_ID")?,
                ticket_folder_id: required("TICKET_FOLDER_ID")?,
            },
            primary_passenger: required("PRIMARY_PASSENGER")?,
        })
    }
}
