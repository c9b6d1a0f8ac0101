//! `CitizenLink` Core Library
//!
//! Links chat-community members to their RSI citizen dossier:
//! - One-time challenge codes and the per-member challenge table
//! - Dossier fetching and bio extraction
//! - The verification engine that moves members between roles
//! - Configuration resolution and tracing setup

pub mod challenge;
pub mod community;
pub mod config;
pub mod error;
pub mod profile;
pub mod tracing_init;
pub mod verify;

pub use challenge::{ChallengeCode, ChallengeState, ChallengeStore, IdentityId, MemoryChallengeStore};
pub use community::{Community, CommunityError, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use verify::{CommandOutcome, Member, VerificationEngine, VerifyOutcome};
