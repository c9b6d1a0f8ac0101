//! [`Community`] backed by one Discord guild and one interaction.

use std::sync::Arc;

use async_trait::async_trait;

use citizenlink_core::challenge::IdentityId;
use citizenlink_core::community::{Community, CommunityError, Role};

use super::client::{DiscordClient, DiscordError};

/// Guild operations plus ephemeral follow-ups to the invoking member.
pub struct DiscordCommunity {
    client: Arc<DiscordClient>,
    guild_id: String,
    interaction_token: String,
}

impl DiscordCommunity {
    pub fn new(
        client: Arc<DiscordClient>,
        guild_id: impl Into<String>,
        interaction_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            guild_id: guild_id.into(),
            interaction_token: interaction_token.into(),
        }
    }
}

impl From<DiscordError> for CommunityError {
    fn from(e: DiscordError) -> Self {
        match e {
            DiscordError::Api { status, message } => Self::Rejected { status, message },
            other => Self::Request(other.to_string()),
        }
    }
}

#[async_trait]
impl Community for DiscordCommunity {
    async fn roles(&self) -> Result<Vec<Role>, CommunityError> {
        let roles = self.client.guild_roles(&self.guild_id).await?;
        Ok(roles.into_iter().map(|r| Role::new(r.id, r.name)).collect())
    }

    async fn add_role(&self, member: &IdentityId, role: &Role) -> Result<(), CommunityError> {
        self.client
            .add_member_role(&self.guild_id, member.as_str(), &role.id)
            .await?;
        Ok(())
    }

    async fn remove_role(&self, member: &IdentityId, role: &Role) -> Result<(), CommunityError> {
        self.client
            .remove_member_role(&self.guild_id, member.as_str(), &role.id)
            .await?;
        Ok(())
    }

    async fn set_nickname(
        &self,
        member: &IdentityId,
        nickname: &str,
    ) -> Result<(), CommunityError> {
        self.client
            .set_nickname(&self.guild_id, member.as_str(), nickname)
            .await?;
        Ok(())
    }

    async fn notify(&self, message: &str) -> Result<(), CommunityError> {
        self.client
            .create_followup(&self.interaction_token, message)
            .await?;
        Ok(())
    }
}
