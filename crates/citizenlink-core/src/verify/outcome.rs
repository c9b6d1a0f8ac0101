//! Verification outcomes and the messages shown to members.

use std::fmt::Write;

use crate::challenge::ChallengeCode;

use super::{EngineSettings, Member};

/// Result of one `/verify <handle>` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Ownership proven; roles moved.
    Verified {
        handle: String,
        /// `false` when the rename was refused by the platform.
        nickname_applied: bool,
    },
    /// No code was issued for this member (or it expired).
    NotInitiated,
    /// The handle cannot be a valid citizen handle; nothing was fetched.
    InvalidHandle,
    /// The profile page has no bio field, usually because it is private.
    BioFieldMissing,
    /// The bio does not contain the pending code.
    CodeNotFound,
    /// A newer code was issued while this attempt ran.
    Superseded,
    /// A concurrent attempt already verified the member; nothing was changed.
    AlreadyVerified { handle: String },
    /// The profile site's certificate did not validate.
    TlsError(String),
    /// A configured role name does not exist on the community.
    RolesMisconfigured { missing: Vec<String> },
    /// Anything else; details are only logged.
    UnexpectedError,
}

impl VerifyOutcome {
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Short machine-readable label for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "verified",
            Self::NotInitiated => "not_initiated",
            Self::InvalidHandle => "invalid_handle",
            Self::BioFieldMissing => "bio_field_missing",
            Self::CodeNotFound => "code_not_found",
            Self::Superseded => "superseded",
            Self::AlreadyVerified { .. } => "already_verified",
            Self::TlsError(_) => "tls_error",
            Self::RolesMisconfigured { .. } => "roles_misconfigured",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    /// Text sent back to the member.
    pub fn user_message(&self, settings: &EngineSettings) -> String {
        match self {
            Self::Verified {
                handle,
                nickname_applied,
            } => success_message(handle, *nickname_applied, &settings.welcome_channel),
            Self::NotInitiated => {
                "Please initiate the verification process by typing `/verify` first.".to_string()
            }
            Self::InvalidHandle => "That does not look like an RSI handle. Handles only contain \
                 letters, numbers, dashes and underscores."
                .to_string(),
            Self::BioFieldMissing => "Could not find the bio section on your RSI profile. \
                 Please make sure your profile is public."
                .to_string(),
            Self::CodeNotFound => "Code not found in your RSI bio. Please double-check.".to_string(),
            Self::Superseded => "Your verification code changed while your profile was being \
                 checked. Please run `/verify` with your handle again."
                .to_string(),
            Self::AlreadyVerified { handle } => {
                format!("You are already verified as {handle}. No further action is needed.")
            }
            Self::TlsError(detail) => format!("Error checking RSI profile: {detail}"),
            Self::RolesMisconfigured { .. } => format!(
                "Error: '{}' or '{}' role not found on this server.",
                settings.verified_role, settings.pending_role
            ),
            Self::UnexpectedError => "An unexpected error occurred while checking your RSI \
                 profile. Please try again in a few minutes."
                .to_string(),
        }
    }
}

fn success_message(handle: &str, nickname_applied: bool, welcome_channel: &str) -> String {
    let mut message = if nickname_applied {
        format!("Your nickname has been updated to: {handle}. You have been verified.")
    } else {
        format!(
            "You have been verified, but your nickname could not be changed to {handle}. \
             A moderator can update it for you."
        )
    };
    message.push_str(
        " You can safely go ahead and remove the code from your profile now if you want to. \
         Welcome to the SRS, Citizen!",
    );
    if !welcome_channel.is_empty() {
        let _ = write!(message, "\n\nHead to <#{welcome_channel}> to get chatting!");
    }
    message
}

/// Instructions sent along with a freshly issued code.
pub fn instructions(member: &Member, code: &ChallengeCode, account_url: &str) -> String {
    format!(
        "{}, please enter the below code into the short bio field of your RSI profile found \
         [here]({account_url}). Return and do `/verify <your RSI handle>` to complete the \
         process.\n\n\n`{code}`",
        member.mention
    )
}
