use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use citizenlink_core::{CommandOutcome, IdentityId, Member, VerificationEngine};

use crate::discord::types::{GuildMember, INTERACTION_APPLICATION_COMMAND, INTERACTION_PING};
use crate::discord::{DiscordClient, DiscordCommunity, Interaction, InteractionResponse};
use crate::signature::{SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER};

/// Slash command handled by the bot.
pub const VERIFY_COMMAND: &str = "verify";
/// Optional handle argument of [`VERIFY_COMMAND`].
pub const HANDLE_OPTION: &str = "rsi_username";

const GUILD_ONLY_MESSAGE: &str = "This command can only be used inside the server.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VerificationEngine>,
    pub discord: Arc<DiscordClient>,
    pub verifier: Arc<SignatureVerifier>,
    /// Command tasks still running after their interaction was acknowledged.
    pub tasks: TaskTracker,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/interactions", post(interactions))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /interactions`: Discord interactions webhook.
pub async fn interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (Some(signature), Some(timestamp)) = (
        header(&headers, SIGNATURE_HEADER),
        header(&headers, TIMESTAMP_HEADER),
    ) else {
        return (StatusCode::UNAUTHORIZED, "missing request signature").into_response();
    };
    if !state.verifier.verify(timestamp, &body, signature) {
        warn!("Rejected interaction with invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(i) => i,
        Err(e) => {
            debug!(error = %e, "Malformed interaction payload");
            return (StatusCode::BAD_REQUEST, "malformed interaction").into_response();
        }
    };

    match interaction.kind {
        INTERACTION_PING => Json(InteractionResponse::pong()).into_response(),
        INTERACTION_APPLICATION_COMMAND => handle_command(&state, interaction),
        other => {
            debug!(kind = other, "Unsupported interaction type");
            (StatusCode::BAD_REQUEST, "unsupported interaction type").into_response()
        }
    }
}

fn handle_command(state: &AppState, interaction: Interaction) -> Response {
    let Some(data) = interaction.data else {
        return (StatusCode::BAD_REQUEST, "missing command data").into_response();
    };
    if data.name != VERIFY_COMMAND {
        debug!(command = %data.name, "Unknown command");
        return (StatusCode::BAD_REQUEST, "unknown command").into_response();
    }

    let (Some(guild_id), Some(guild_member)) = (interaction.guild_id, interaction.member) else {
        return Json(InteractionResponse::ephemeral_message(GUILD_ONLY_MESSAGE)).into_response();
    };

    let member = member_from(&guild_member);
    let handle = data.string_option(HANDLE_OPTION).map(str::to_string);
    let community = Arc::new(DiscordCommunity::new(
        Arc::clone(&state.discord),
        guild_id,
        interaction.token,
    ));
    let engine = Arc::clone(&state.engine);

    info!(member = %member.id, with_handle = handle.is_some(), "Received /verify");
    state.tasks.spawn(async move {
        match engine
            .handle_command(community, &member, handle.as_deref())
            .await
        {
            CommandOutcome::Issued(_) => debug!(member = %member.id, "Code issued"),
            CommandOutcome::Verification(outcome) => {
                debug!(member = %member.id, outcome = outcome.kind(), "Verification finished");
            }
        }
    });

    Json(InteractionResponse::deferred_ephemeral()).into_response()
}

fn member_from(guild_member: &GuildMember) -> Member {
    let user = &guild_member.user;
    Member::new(IdentityId::new(user.id.clone()), user.username.clone())
        .with_mention(format!("<@{}>", user.id))
}
