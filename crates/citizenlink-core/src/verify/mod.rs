//! The `/verify` protocol: issue a code, find it in the profile bio, move roles.
//!
//! Only the success path changes the challenge table. Every other outcome
//! leaves the pending code in place so the member can simply retry.

mod outcome;


use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::challenge::{self, ChallengeCode, ChallengeState, ChallengeStore, IdentityId};
use crate::community::{Community, Role, find_role};
use crate::config::Config;
use crate::error::Result;
use crate::profile::{BioExtractor, ExternalProfile, FetchError, HttpProfileFetcher, ProfileFetcher};

pub use outcome::{VerifyOutcome, instructions};

/// Citizen handles: letters, digits, dash and underscore.
static HANDLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,60}$").ok());

/// Whether `handle` can be embedded in a dossier URL.
pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE_RE.as_ref().is_some_and(|re| re.is_match(handle))
}

/// The member who ran the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: IdentityId,
    pub name: String,
    /// How to address the member in a message (a platform mention tag).
    pub mention: String,
}

impl Member {
    pub fn new(id: IdentityId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            mention: name.clone(),
            name,
        }
    }

    #[must_use]
    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = mention.into();
        self
    }
}

/// Static inputs of the verification flow.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pending_role: String,
    pub verified_role: String,
    pub welcome_channel: String,
    pub account_url: String,
    /// Wait between the success notice and removing the pending role.
    pub revoke_delay: Duration,
    /// Age after which a pending code stops being accepted.
    pub code_ttl: Option<Duration>,
    /// How long a finished verification stays in the challenge table.
    pub verified_retention: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            pending_role: config.roles.pending.clone(),
            verified_role: config.roles.verified.clone(),
            welcome_channel: config.discord.welcome_channel.clone(),
            account_url: config.profile.account_url.clone(),
            revoke_delay: config.verification.revoke_delay(),
            code_ttl: config.verification.code_ttl(),
            verified_retention: config.verification.verified_retention(),
        }
    }
}

/// What a `/verify` invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// No handle given: a new code was issued.
    Issued(ChallengeCode),
    /// A handle was given: a verification attempt ran.
    Verification(VerifyOutcome),
}

/// Pending-role removal scheduled after a successful verification.
struct Revocation {
    member: IdentityId,
    role: Role,
}

/// Drives challenge issuing and verification for all members.
pub struct VerificationEngine {
    store: Arc<dyn ChallengeStore>,
    fetcher: Arc<dyn ProfileFetcher>,
    extractor: BioExtractor,
    settings: EngineSettings,
    revocations: TaskTracker,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        fetcher: Arc<dyn ProfileFetcher>,
        extractor: BioExtractor,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            settings,
            revocations: TaskTracker::new(),
        }
    }

    /// Build an engine that fetches real dossier pages.
    pub fn from_config(config: &Config, store: Arc<dyn ChallengeStore>) -> Result<Self> {
        let fetcher = HttpProfileFetcher::new(&config.profile)?;
        let extractor = BioExtractor::new(&config.profile.bio_selector)?;
        Ok(Self::new(
            store,
            Arc::new(fetcher),
            extractor,
            EngineSettings::from(config),
        ))
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Entry point for the `/verify [handle]` command.
    ///
    /// A missing or blank handle issues a new code; otherwise the pending code
    /// is checked against the handle's profile.
    pub async fn handle_command(
        &self,
        community: Arc<dyn Community>,
        member: &Member,
        handle: Option<&str>,
    ) -> CommandOutcome {
        match handle.map(str::trim).filter(|h| !h.is_empty()) {
            None => CommandOutcome::Issued(self.issue(community.as_ref(), member).await),
            Some(handle) => {
                CommandOutcome::Verification(self.verify(community, member, handle).await)
            }
        }
    }

    /// Issue a fresh code and send the member the instructions.
    #[instrument(skip_all, fields(member = %member.id))]
    pub async fn issue(&self, community: &dyn Community, member: &Member) -> ChallengeCode {
        self.prune().await;
        let code = challenge::issue(self.store.as_ref(), &member.id).await;
        let message = instructions(member, &code, &self.settings.account_url);
        match community.notify(&message).await {
            Ok(()) => info!(member = %member.name, "Sent verification code"),
            Err(e) => warn!(error = %e, "Failed to deliver verification code"),
        }
        code
    }

    /// Check `handle`'s profile for the member's pending code.
    ///
    /// On success the verified role is granted, the member is renamed, the
    /// success notice is sent, and the pending role is removed after
    /// `revoke_delay` without blocking the caller.
    #[instrument(skip_all, fields(member = %member.id, handle = %handle))]
    pub async fn verify(
        &self,
        community: Arc<dyn Community>,
        member: &Member,
        handle: &str,
    ) -> VerifyOutcome {
        self.prune().await;
        let (outcome, revocation) = self.attempt(community.as_ref(), member, handle).await;

        if outcome.is_verified() {
            info!(member = %member.name, "Member verified");
        } else {
            info!(outcome = outcome.kind(), "Verification attempt ended");
        }

        let message = outcome.user_message(&self.settings);
        if let Err(e) = community.notify(&message).await {
            warn!(error = %e, "Failed to deliver verification result");
        }

        if let Some(revocation) = revocation {
            self.schedule_revocation(community, revocation);
        }
        outcome
    }

    /// Wait for scheduled role revocations to finish.
    pub async fn shutdown(&self) {
        self.revocations.close();
        if !self.revocations.is_empty() {
            info!(count = self.revocations.len(), "Waiting for pending role revocations");
        }
        self.revocations.wait().await;
    }

    async fn attempt(
        &self,
        community: &dyn Community,
        member: &Member,
        handle: &str,
    ) -> (VerifyOutcome, Option<Revocation>) {
        let state = self.store.get(&member.id).await;
        let Some(code) = state.pending_code().cloned() else {
            return (VerifyOutcome::NotInitiated, None);
        };
        if self.is_expired(&state) {
            self.store
                .transition(&member.id, &state, ChallengeState::Unchallenged)
                .await;
            debug!("Pending code expired");
            return (VerifyOutcome::NotInitiated, None);
        }

        if !is_valid_handle(handle) {
            return (VerifyOutcome::InvalidHandle, None);
        }

        let html = match self.fetcher.fetch(handle).await {
            Ok(html) => html,
            Err(FetchError::Tls(detail)) => {
                error!(error = %detail, "TLS failure fetching profile");
                return (VerifyOutcome::TlsError(detail), None);
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch profile");
                return (VerifyOutcome::UnexpectedError, None);
            }
        };

        let Some(profile) = ExternalProfile::from_html(handle, &html, &self.extractor) else {
            warn!("Bio section not found on profile");
            return (VerifyOutcome::BioFieldMissing, None);
        };
        debug!(bio = %profile.bio, "Bio text found");

        if !code.is_contained_in(&profile.bio) {
            warn!("Code not found in bio");
            return (VerifyOutcome::CodeNotFound, None);
        }

        self.transition_roles(community, member, &profile, &state)
            .await
    }

    async fn prune(&self) {
        let removed = self
            .store
            .prune(self.settings.verified_retention, self.settings.code_ttl)
            .await;
        if removed > 0 {
            debug!(removed, "Pruned challenge table");
        }
    }

    fn is_expired(&self, state: &ChallengeState) -> bool {
        match (state, self.settings.code_ttl) {
            (ChallengeState::Pending { issued_at, .. }, Some(ttl)) => issued_at.elapsed() > ttl,
            _ => false,
        }
    }

    /// Consume the code and move the member from the pending to the verified role.
    async fn transition_roles(
        &self,
        community: &dyn Community,
        member: &Member,
        profile: &ExternalProfile,
        pending_state: &ChallengeState,
    ) -> (VerifyOutcome, Option<Revocation>) {
        let roles = match community.roles().await {
            Ok(roles) => roles,
            Err(e) => {
                error!(error = %e, "Failed to list community roles");
                return (VerifyOutcome::UnexpectedError, None);
            }
        };

        let verified_role = find_role(&roles, &self.settings.verified_role).cloned();
        let pending_role = find_role(&roles, &self.settings.pending_role).cloned();
        let (Some(verified_role), Some(pending_role)) = (verified_role, pending_role) else {
            let missing: Vec<String> = [&self.settings.verified_role, &self.settings.pending_role]
                .into_iter()
                .filter(|name| find_role(&roles, name).is_none())
                .cloned()
                .collect();
            error!(?missing, "Configured roles not found on this server");
            return (VerifyOutcome::RolesMisconfigured { missing }, None);
        };

        let verified_state = ChallengeState::Verified {
            handle: profile.handle.clone(),
            verified_at: Instant::now(),
        };
        if !self
            .store
            .transition(&member.id, pending_state, verified_state.clone())
            .await
        {
            return (self.lost_transition(&member.id, pending_state).await, None);
        }

        if let Err(e) = community.add_role(&member.id, &verified_role).await {
            error!(error = %e, role = %verified_role.name, "Failed to grant verified role");
            self.store
                .transition(&member.id, &verified_state, pending_state.clone())
                .await;
            return (VerifyOutcome::UnexpectedError, None);
        }

        let nickname_applied = match community.set_nickname(&member.id, &profile.handle).await {
            Ok(()) => {
                info!(nickname = %profile.handle, "Changed member nickname");
                true
            }
            Err(e) => {
                warn!(error = %e, nickname = %profile.handle, "Failed to change nickname");
                false
            }
        };

        (
            VerifyOutcome::Verified {
                handle: profile.handle.clone(),
                nickname_applied,
            },
            Some(Revocation {
                member: member.id.clone(),
                role: pending_role,
            }),
        )
    }

    /// Explain why consuming `pending_state` failed, from what replaced it.
    async fn lost_transition(
        &self,
        identity: &IdentityId,
        pending_state: &ChallengeState,
    ) -> VerifyOutcome {
        match self.store.get(identity).await {
            ChallengeState::Verified { handle, .. } => {
                info!(%handle, "Member was verified by a concurrent attempt");
                VerifyOutcome::AlreadyVerified { handle }
            }
            ChallengeState::Pending { code, .. }
                if pending_state.pending_code() != Some(&code) =>
            {
                warn!("Pending code changed during verification");
                VerifyOutcome::Superseded
            }
            ChallengeState::Pending { .. } => {
                // A concurrent attempt consumed the code and then rolled back.
                warn!("Concurrent verification attempt failed");
                VerifyOutcome::UnexpectedError
            }
            ChallengeState::Unchallenged => VerifyOutcome::NotInitiated,
        }
    }

    fn schedule_revocation(&self, community: Arc<dyn Community>, revocation: Revocation) {
        let delay = self.settings.revoke_delay;
        self.revocations.spawn(async move {
            tokio::time::sleep(delay).await;
            match community
                .remove_role(&revocation.member, &revocation.role)
                .await
            {
                Ok(()) => info!(
                    member = %revocation.member,
                    role = %revocation.role.name,
                    "Removed pending role"
                ),
                Err(e) => error!(
                    member = %revocation.member,
                    role = %revocation.role.name,
                    error = %e,
                    "Failed to remove pending role"
                ),
            }
        });
    }
}
