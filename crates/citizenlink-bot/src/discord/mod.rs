//! Discord integration.
//!
//! Provides a reqwest-based client for the Discord REST API v10, the
//! interaction payload types, and the [`Community`](citizenlink_core::Community)
//! adapter used by the verification engine.

mod client;
mod community;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{DiscordClient, DiscordError};
pub use community::DiscordCommunity;
pub use types::{Interaction, InteractionResponse};
