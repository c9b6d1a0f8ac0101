//! Discord REST API v10 client.
//!
//! Uses reqwest to call the guild role, member, and interaction webhook
//! endpoints the verification flow needs.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{debug, warn};

use citizenlink_core::config::DiscordConfig;

use super::types::{ApiErrorBody, FLAG_EPHEMERAL, FollowupMessage, GuildRole, ModifyMember};

/// Audit-log reason attached to role and nickname changes.
const AUDIT_REASON: &str = "CitizenLink RSI verification";

/// Follow-ups can race the deferred acknowledgement; Discord answers 404
/// until the interaction is registered.
const FOLLOWUP_ATTEMPTS: u32 = 3;
const FOLLOWUP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Discord API client errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Discord REST API client.
#[derive(Debug)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    application_id: String,
}

impl DiscordClient {
    /// Create a new Discord API client.
    pub fn new(config: &DiscordConfig) -> Result<Self, DiscordError> {
        if config.api_base_url.is_empty() {
            return Err(DiscordError::Config("api_base_url is empty".into()));
        }
        if config.token.is_empty() {
            return Err(DiscordError::Config("token is empty".into()));
        }
        if config.application_id.is_empty() {
            return Err(DiscordError::Config("application_id is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let mut token_val = HeaderValue::from_str(&format!("Bot {}", config.token))
            .map_err(|_| DiscordError::Config("Invalid token format".into()))?;
        token_val.set_sensitive(true);
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(
                "DiscordBot (https://github.com/srs-bot/citizenlink, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(Duration::from_secs(15))
            .build()?;

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            application_id: config.application_id.clone(),
        })
    }

    /// Build the API URL for a given path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into an API error carrying Discord's message.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, DiscordError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| format!("{} (code {})", b.message, b.code))
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown").to_string());
        Err(DiscordError::Api {
            status: status.as_u16(),
            message,
        })
    }

    // =========================================================================
    // Roles and members
    // =========================================================================

    /// List the roles of a guild.
    pub async fn guild_roles(&self, guild_id: &str) -> Result<Vec<GuildRole>, DiscordError> {
        let url = self.api_url(&format!("/guilds/{guild_id}/roles"));
        let resp = self.http.get(&url).send().await?;
        Ok(Self::check_status(resp).await?.json().await?)
    }

    /// Add a role to a guild member.
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), DiscordError> {
        let url = self.api_url(&format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"));
        let resp = self
            .http
            .put(&url)
            .header("X-Audit-Log-Reason", AUDIT_REASON)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// Remove a role from a guild member.
    pub async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), DiscordError> {
        let url = self.api_url(&format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"));
        let resp = self
            .http
            .delete(&url)
            .header("X-Audit-Log-Reason", AUDIT_REASON)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    /// Set a guild member's nickname.
    pub async fn set_nickname(
        &self,
        guild_id: &str,
        user_id: &str,
        nick: &str,
    ) -> Result<(), DiscordError> {
        let url = self.api_url(&format!("/guilds/{guild_id}/members/{user_id}"));
        let resp = self
            .http
            .patch(&url)
            .header("X-Audit-Log-Reason", AUDIT_REASON)
            .json(&ModifyMember {
                nick: nick.to_string(),
            })
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    // =========================================================================
    // Interaction follow-ups
    // =========================================================================

    /// Send an ephemeral follow-up message for a deferred interaction.
    pub async fn create_followup(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        let url = self.api_url(&format!(
            "/webhooks/{}/{interaction_token}",
            self.application_id
        ));
        let body = FollowupMessage {
            content: content.to_string(),
            flags: FLAG_EPHEMERAL,
        };

        let mut attempt = 1;
        loop {
            let resp = self.http.post(&url).json(&body).send().await?;
            match Self::check_status(resp).await {
                Ok(_) => {
                    debug!(attempt, "Follow-up message sent");
                    return Ok(());
                }
                Err(DiscordError::Api { status: 404, .. }) if attempt < FOLLOWUP_ATTEMPTS => {
                    warn!(attempt, "Interaction not ready for follow-up, retrying");
                    tokio::time::sleep(FOLLOWUP_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
