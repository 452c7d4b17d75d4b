use crate::config::FirebaseConfig;
use crate::error::JobError;

/// Key-value store for rotating credentials, backed by a Firebase Realtime
/// Database REST endpoint.
pub struct TokenStore<'a> {
    client: &'a reqwest::blocking::Client,
    cfg: &'a FirebaseConfig,
}

impl<'a> TokenStore<'a> {
    pub fn new(client: &'a reqwest::blocking::Client, cfg: &'a FirebaseConfig) -> Self {
        Self { client, cfg }
    }

    fn key_url(&self, key: &str) -> String {
        format!(
            "{}/refresh_tokens/{key}.json?auth={}",
            self.cfg.database_url.trim_end_matches('/'),
            self.cfg.auth_token
        )
    }

    pub fn get(&self, key: &str) -> Result<String, JobError> {
        let value: Option<String> = self
            .client
            .get(self.key_url(key))
            .send()?
            .error_for_status()?
            .json()?;
        match value {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(JobError::TokenStore(format!("no value stored under {key}"))),
        }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), JobError> {
        self.client
            .put(self.key_url(key))
            .json(&value)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
