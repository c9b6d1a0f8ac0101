//! Discord API v10 payload types.
//!
//! Subsets of the interaction, member, and role objects plus the response
//! bodies the bot sends back.

use serde::{Deserialize, Serialize};

/// Interaction type: endpoint health check from Discord.
pub const INTERACTION_PING: u8 = 1;
/// Interaction type: slash command invocation.
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;

/// Response type: acknowledge a ping.
pub const RESPONSE_PONG: u8 = 1;
/// Response type: reply with a message right away.
pub const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
/// Response type: acknowledge now, send follow-ups later.
pub const RESPONSE_DEFERRED_CHANNEL_MESSAGE: u8 = 5;

/// Message flag: only the invoking user can see the message.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Discord user (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Guild member attached to guild interactions.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    pub user: User,
}

/// One option passed to a slash command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Slash command payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandData {
    /// Value of a string option, if present.
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
            .and_then(serde_json::Value::as_str)
    }
}

/// Incoming interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    /// Webhook token for follow-ups. Absent only on pings.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Absent for direct-message invocations.
    #[serde(default)]
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub data: Option<CommandData>,
}

/// Message body of an interaction response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub flags: u64,
}

/// Reply to an interaction webhook.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl InteractionResponse {
    pub const fn pong() -> Self {
        Self {
            kind: RESPONSE_PONG,
            data: None,
        }
    }

    /// "Bot is thinking..." visible only to the invoking member.
    pub const fn deferred_ephemeral() -> Self {
        Self {
            kind: RESPONSE_DEFERRED_CHANNEL_MESSAGE,
            data: Some(ResponseData {
                content: None,
                flags: FLAG_EPHEMERAL,
            }),
        }
    }

    pub fn ephemeral_message(content: impl Into<String>) -> Self {
        Self {
            kind: RESPONSE_CHANNEL_MESSAGE,
            data: Some(ResponseData {
                content: Some(content.into()),
                flags: FLAG_EPHEMERAL,
            }),
        }
    }
}

/// Guild role (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct GuildRole {
    pub id: String,
    pub name: String,
}

/// Follow-up message sent through the interaction webhook.
#[derive(Debug, Clone, Serialize)]
pub struct FollowupMessage {
    pub content: String,
    pub flags: u64,
}

/// `PATCH /guilds/{guild}/members/{user}` body.
#[derive(Debug, Clone, Serialize)]
pub struct ModifyMember {
    pub nick: String,
}

/// Error body returned by the Discord API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u64,
    #[serde(default)]
    pub message: String,
}
