//! Chat-community collaborator interface.
//!
//! The verification flow never talks to a chat platform directly. It is handed
//! a [`Community`] scoped to one interaction: the guild the command came from
//! plus a reply channel back to the invoking member.

use async_trait::async_trait;
use thiserror::Error;

use crate::challenge::IdentityId;

/// Errors returned by chat-platform calls.
#[derive(Debug, Error)]
pub enum CommunityError {
    #[error("chat platform request failed: {0}")]
    Request(String),

    #[error("chat platform rejected the call ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// An access-control role configured on the community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Find a role by exact name.
pub fn find_role<'a>(roles: &'a [Role], name: &str) -> Option<&'a Role> {
    roles.iter().find(|r| r.name == name)
}

/// Community operations needed by the verification flow.
#[async_trait]
pub trait Community: Send + Sync {
    /// All roles configured on the community.
    async fn roles(&self) -> Result<Vec<Role>, CommunityError>;

    async fn add_role(&self, member: &IdentityId, role: &Role) -> Result<(), CommunityError>;

    async fn remove_role(&self, member: &IdentityId, role: &Role) -> Result<(), CommunityError>;

    /// Change the member's display name within the community.
    async fn set_nickname(&self, member: &IdentityId, nickname: &str)
    -> Result<(), CommunityError>;

    /// Send a private message back to the member who ran the command.
    async fn notify(&self, message: &str) -> Result<(), CommunityError>;
}
