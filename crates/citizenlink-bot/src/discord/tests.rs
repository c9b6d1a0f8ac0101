//! Tests for the Discord API client and types.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;

use citizenlink_core::community::{Community, CommunityError};
use citizenlink_core::config::DiscordConfig;

use super::client::{DiscordClient, DiscordError};
use super::community::DiscordCommunity;
use super::types::{
    INTERACTION_APPLICATION_COMMAND, INTERACTION_PING, Interaction, InteractionResponse,
};

fn config(base_url: &str) -> DiscordConfig {
    DiscordConfig {
        token: "bot-token".into(),
        application_id: "4242".into(),
        api_base_url: base_url.into(),
        ..DiscordConfig::default()
    }
}

// =============================================================================
// Client construction tests
// =============================================================================

#[test]
fn empty_base_url_returns_config_error() {
    let err = DiscordClient::new(&config("")).unwrap_err();
    assert!(matches!(err, DiscordError::Config(_)));
}

#[test]
fn empty_token_returns_config_error() {
    let mut cfg = config("https://discord.com/api/v10");
    cfg.token = String::new();
    let err = DiscordClient::new(&cfg).unwrap_err();
    assert!(matches!(err, DiscordError::Config(_)));
}

#[test]
fn token_with_newline_rejected() {
    let mut cfg = config("https://discord.com/api/v10");
    cfg.token = "abc\ndef".into();
    let err = DiscordClient::new(&cfg).unwrap_err();
    assert!(matches!(err, DiscordError::Config(_)));
}

#[test]
fn trailing_slash_stripped_from_base_url() {
    let client = DiscordClient::new(&config("https://discord.com/api/v10/")).unwrap();
    assert_eq!(
        client.api_url("/guilds/1/roles"),
        "https://discord.com/api/v10/guilds/1/roles"
    );
}

// =============================================================================
// Deserialization tests (Interaction)
// =============================================================================

#[test]
fn deserialize_ping() {
    let json = r#"{"type": 1, "id": "1", "application_id": "4242", "token": "tok"}"#;
    let i: Interaction = serde_json::from_str(json).unwrap();
    assert_eq!(i.kind, INTERACTION_PING);
    assert!(i.data.is_none());
    assert!(i.member.is_none());
}

#[test]
fn deserialize_guild_command_with_handle() {
    let json = r#"{
        "type": 2,
        "id": "10",
        "application_id": "4242",
        "token": "itok",
        "guild_id": "900",
        "member": {
            "user": {"id": "77", "username": "pilot", "global_name": "Pilot"},
            "nick": null
        },
        "data": {
            "id": "555",
            "name": "verify",
            "options": [{"name": "rsi_username", "type": 3, "value": "Star_Gazer"}]
        }
    }"#;
    let i: Interaction = serde_json::from_str(json).unwrap();
    assert_eq!(i.kind, INTERACTION_APPLICATION_COMMAND);
    assert_eq!(i.guild_id.as_deref(), Some("900"));
    let member = i.member.unwrap();
    assert_eq!(member.user.id, "77");
    let data = i.data.unwrap();
    assert_eq!(data.name, "verify");
    assert_eq!(data.string_option("rsi_username"), Some("Star_Gazer"));
    assert_eq!(data.string_option("other"), None);
}

#[test]
fn deserialize_minimal_ping() {
    let i: Interaction = serde_json::from_str(r#"{"type": 1}"#).unwrap();
    assert_eq!(i.kind, INTERACTION_PING);
    assert!(i.token.is_empty());
}

#[test]
fn deserialize_dm_command_without_options() {
    let json = r#"{
        "type": 2,
        "id": "11",
        "application_id": "4242",
        "token": "itok",
        "user": {"id": "77", "username": "pilot"},
        "data": {"name": "verify"}
    }"#;
    let i: Interaction = serde_json::from_str(json).unwrap();
    assert!(i.guild_id.is_none());
    assert!(i.member.is_none());
    assert!(i.data.unwrap().options.is_empty());
}

#[test]
fn non_string_option_value_ignored() {
    let json = r#"{"name": "verify", "options": [{"name": "rsi_username", "value": 5}]}"#;
    let data: super::types::CommandData = serde_json::from_str(json).unwrap();
    assert_eq!(data.string_option("rsi_username"), None);
}

// =============================================================================
// Serialization tests (InteractionResponse)
// =============================================================================

#[test]
fn pong_has_no_data() {
    let v = serde_json::to_value(InteractionResponse::pong()).unwrap();
    assert_eq!(v, serde_json::json!({"type": 1}));
}

#[test]
fn deferred_response_is_ephemeral() {
    let v = serde_json::to_value(InteractionResponse::deferred_ephemeral()).unwrap();
    assert_eq!(v, serde_json::json!({"type": 5, "data": {"flags": 64}}));
}

#[test]
fn ephemeral_message_carries_content() {
    let v = serde_json::to_value(InteractionResponse::ephemeral_message("hi")).unwrap();
    assert_eq!(
        v,
        serde_json::json!({"type": 4, "data": {"content": "hi", "flags": 64}})
    );
}

// =============================================================================
// Follow-up delivery
// =============================================================================

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn followup_retries_until_interaction_is_known() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new().route(
        "/webhooks/4242/itok",
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    (
                        StatusCode::NOT_FOUND,
                        r#"{"message": "Unknown Webhook", "code": 10015}"#,
                    )
                } else {
                    (StatusCode::OK, "{}")
                }
            }
        }),
    );
    let base = serve(app).await;

    let client = DiscordClient::new(&config(&base)).unwrap();
    client.create_followup("itok", "hello").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_call_maps_to_community_rejection() {
    let app = Router::new().route(
        "/guilds/900/members/77/roles/5",
        axum::routing::put(|| async {
            (
                StatusCode::FORBIDDEN,
                r#"{"message": "Missing Permissions", "code": 50013}"#,
            )
        }),
    );
    let base = serve(app).await;

    let client = Arc::new(DiscordClient::new(&config(&base)).unwrap());
    let community = DiscordCommunity::new(client, "900", "itok");
    let err = community
        .add_role(
            &citizenlink_core::IdentityId::new("77"),
            &citizenlink_core::Role::new("5", "Verified"),
        )
        .await
        .unwrap_err();
    match err {
        CommunityError::Rejected { status, message } => {
            assert_eq!(status, 403);
            assert!(message.contains("Missing Permissions"));
        }
        CommunityError::Request(other) => panic!("unexpected error: {other}"),
    }
}
