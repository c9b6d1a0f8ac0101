//! Configuration resolution for CitizenLink.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`--config` or ~/.config/citizenlink/settings.json)
//! 3. Bot items directory (token.txt, channel.txt, roles.txt, cacert.pem)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete CitizenLink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub roles: RoleConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Discord application credentials and community references.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token used for REST calls.
    pub token: String,
    /// Application (client) id, needed for interaction follow-ups.
    pub application_id: String,
    /// Hex-encoded ed25519 public key used to authenticate interactions.
    pub public_key: String,
    pub api_base_url: String,
    /// Channel id mentioned in the success message.
    pub welcome_channel: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            application_id: String::new(),
            public_key: String::new(),
            api_base_url: "https://discord.com/api/v10".to_string(),
            welcome_channel: String::new(),
        }
    }
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("application_id", &self.application_id)
            .field("public_key", &self.public_key)
            .field("api_base_url", &self.api_base_url)
            .field("welcome_channel", &self.welcome_channel)
            .finish()
    }
}

/// Names of the two roles the verification flow moves members between.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Role held by members who have not verified yet.
    pub pending: String,
    /// Role granted on successful verification.
    pub verified: String,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            pending: "P-Ver".to_string(),
            verified: "Verified".to_string(),
        }
    }
}

/// External profile site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub base_url: String,
    /// CSS selector of the bio text element.
    pub bio_selector: String,
    /// Page where users edit their bio, linked from the instructions.
    pub account_url: String,
    /// Extra trusted roots (PEM bundle).
    pub ca_bundle: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            base_url: "https://robertsspaceindustries.com".to_string(),
            bio_selector: "div.bio div.value".to_string(),
            account_url: "https://robertsspaceindustries.com/en/account/profile".to_string(),
            ca_bundle: None,
            timeout_secs: 15,
        }
    }
}

/// Verification flow timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Delay between the success notice and the pending-role revocation.
    pub revoke_delay_ms: u64,
    /// Lifetime of an issued code. `None` keeps codes until restart.
    pub code_ttl_secs: Option<u64>,
    /// How long a finished verification is remembered, so a repeated
    /// submission can be told it already succeeded.
    pub verified_retention_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            revoke_delay_ms: 3000,
            code_ttl_secs: None,
            verified_retention_secs: 600,
        }
    }
}

/// Interactions server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ProfileConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VerificationConfig {
    pub const fn revoke_delay(&self) -> Duration {
        Duration::from_millis(self.revoke_delay_ms)
    }

    pub fn code_ttl(&self) -> Option<Duration> {
        self.code_ttl_secs.map(Duration::from_secs)
    }

    pub const fn verified_retention(&self) -> Duration {
        Duration::from_secs(self.verified_retention_secs)
    }
}

impl Config {
    /// Check that the resolved configuration can run the bot.
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            return Err(Error::Config("discord.token is empty".into()));
        }
        if self.discord.application_id.trim().is_empty() {
            return Err(Error::Config("discord.application_id is empty".into()));
        }
        let key = &self.discord.public_key;
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Config(
                "discord.public_key must be 64 hex characters".into(),
            ));
        }
        if self.roles.pending.trim().is_empty() || self.roles.verified.trim().is_empty() {
            return Err(Error::Config("role names must not be empty".into()));
        }
        if self.roles.pending == self.roles.verified {
            return Err(Error::Config(format!(
                "pending and verified roles are both '{}'",
                self.roles.pending
            )));
        }
        if self.profile.timeout_secs == 0 {
            return Err(Error::Config("profile.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `settings_path` must exist; the global default is optional.
/// The bot items directory defaults to the legacy `SRSBot/Bot_Items`
/// location under the local data directory.
pub fn load_config(settings_path: Option<&Path>, bot_items_dir: Option<&Path>) -> Result<Config> {
    let mut config = match settings_path {
        Some(path) => load_config_file(path)?,
        None => match global_config_path() {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => Config::default(),
        },
    };

    let items_dir = bot_items_dir
        .map(Path::to_path_buf)
        .or_else(default_bot_items_dir);
    if let Some(dir) = items_dir.filter(|d| d.is_dir()) {
        apply_bot_items(&mut config, &dir)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global settings file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("citizenlink").join("settings.json"))
}

/// Legacy bot items directory: `<local data dir>/SRSBot/Bot_Items`.
pub fn default_bot_items_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("SRSBot").join("Bot_Items"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Read a single-value file, trimmed. Missing files yield `None`.
fn read_item(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let value = content.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Config(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Apply the plain-text files of a bot items directory.
///
/// `roles.txt` holds the pending role on line 1 and the verified role on
/// line 2.
pub fn apply_bot_items(config: &mut Config, dir: &Path) -> Result<()> {
    if let Some(token) = read_item(&dir.join("token.txt"))? {
        config.discord.token = token;
    }
    if let Some(channel) = read_item(&dir.join("channel.txt"))? {
        config.discord.welcome_channel = channel;
    }
    if let Some(roles) = read_item(&dir.join("roles.txt"))? {
        let mut lines = roles.lines().map(str::trim);
        if let Some(pending) = lines.next().filter(|l| !l.is_empty()) {
            config.roles.pending = pending.to_string();
        }
        if let Some(verified) = lines.next().filter(|l| !l.is_empty()) {
            config.roles.verified = verified.to_string();
        }
    }
    let ca_bundle = dir.join("cacert.pem");
    if ca_bundle.is_file() {
        config.profile.ca_bundle = Some(ca_bundle);
    }
    tracing::debug!(dir = %dir.display(), "Applied bot items directory");
    Ok(())
}

/// Apply `CITIZENLINK_*` overrides using the given variable lookup.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("CITIZENLINK_DISCORD_TOKEN") {
        config.discord.token = val;
    }
    if let Some(val) = var("CITIZENLINK_APPLICATION_ID") {
        config.discord.application_id = val;
    }
    if let Some(val) = var("CITIZENLINK_PUBLIC_KEY") {
        config.discord.public_key = val;
    }
    if let Some(val) = var("CITIZENLINK_WELCOME_CHANNEL") {
        config.discord.welcome_channel = val;
    }
    if let Some(val) = var("CITIZENLINK_PENDING_ROLE") {
        config.roles.pending = val;
    }
    if let Some(val) = var("CITIZENLINK_VERIFIED_ROLE") {
        config.roles.verified = val;
    }
    if let Some(val) = var("CITIZENLINK_PROFILE_BASE_URL") {
        config.profile.base_url = val;
    }
    if let Some(val) = var("CITIZENLINK_CA_BUNDLE") {
        config.profile.ca_bundle = Some(PathBuf::from(val));
    }
    if let Some(n) = var("CITIZENLINK_FETCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.profile.timeout_secs = n;
    }
    if let Some(n) = var("CITIZENLINK_CODE_TTL_SECS").and_then(|v| v.parse().ok()) {
        config.verification.code_ttl_secs = Some(n);
    }
    if let Some(val) = var("CITIZENLINK_LOG_LEVEL") {
        config.server.log_level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.discord.token = "bot-token".into();
        config.discord.application_id = "1234".into();
        config.discord.public_key = "ab".repeat(32);
        config
    }

    #[test]
    fn defaults_match_legacy_bot() {
        let config = Config::default();
        assert_eq!(config.roles.pending, "P-Ver");
        assert_eq!(config.roles.verified, "Verified");
        assert_eq!(config.verification.revoke_delay(), Duration::from_secs(3));
        assert!(config.verification.code_ttl().is_none());
        assert_eq!(
            config.verification.verified_retention(),
            Duration::from_secs(600)
        );
        assert_eq!(config.profile.bio_selector, "div.bio div.value");
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"roles": {"verified": "Citizen"}}"#).unwrap();

        let config = load_config(Some(&path), Some(&dir.path().join("absent"))).unwrap();
        assert_eq!(config.roles.verified, "Citizen");
        assert_eq!(config.roles.pending, "P-Ver");
        assert_eq!(config.profile.timeout_secs, 15);
    }

    #[test]
    fn explicit_missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.json")), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn bot_items_directory_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token.txt"), "  secret-token\n").unwrap();
        std::fs::write(dir.path().join("channel.txt"), "998877\n").unwrap();
        std::fs::write(dir.path().join("roles.txt"), "Unverified\nMember\n").unwrap();
        std::fs::write(dir.path().join("cacert.pem"), "").unwrap();

        let mut config = Config::default();
        apply_bot_items(&mut config, dir.path()).unwrap();

        assert_eq!(config.discord.token, "secret-token");
        assert_eq!(config.discord.welcome_channel, "998877");
        assert_eq!(config.roles.pending, "Unverified");
        assert_eq!(config.roles.verified, "Member");
        assert_eq!(config.profile.ca_bundle, Some(dir.path().join("cacert.pem")));
    }

    #[test]
    fn roles_file_with_single_line_only_sets_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roles.txt"), "Newcomer").unwrap();

        let mut config = Config::default();
        apply_bot_items(&mut config, dir.path()).unwrap();

        assert_eq!(config.roles.pending, "Newcomer");
        assert_eq!(config.roles.verified, "Verified");
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CITIZENLINK_VERIFIED_ROLE", "Citizen"),
            ("CITIZENLINK_FETCH_TIMEOUT_SECS", "5"),
            ("CITIZENLINK_CODE_TTL_SECS", "not-a-number"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.roles.verified, "Citizen");
        assert_eq!(config.profile.timeout_secs, 5);
        assert!(config.verification.code_ttl_secs.is_none());
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_token() {
        let mut config = valid_config();
        config.discord.token = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_public_key() {
        let mut config = valid_config();
        config.discord.public_key = "zz".repeat(32);
        assert!(config.validate().is_err());
        config.discord.public_key = "abcd".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_identical_roles() {
        let mut config = valid_config();
        config.roles.verified = config.roles.pending.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", valid_config().discord);
        assert!(!rendered.contains("bot-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
