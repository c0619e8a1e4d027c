//! Configuration types for anime-relay

use crate::error::{Error, Result};
use crate::types::{ChatId, Resolution};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Chat transport settings (Telegram Bot API)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token (required)
    #[serde(default, skip_serializing)]
    pub bot_token: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-poll timeout for `getUpdates` (default: 30 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    pub poll_timeout: Duration,

    /// Chats allowed to issue commands (empty = everyone)
    #[serde(default)]
    pub allowed_chats: Vec<ChatId>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_api_url(),
            poll_timeout: default_poll_timeout(),
            allowed_chats: Vec::new(),
        }
    }
}

impl TelegramConfig {
    /// Whether commands from `chat` are accepted (an empty list admits everyone)
    pub fn is_chat_allowed(&self, chat: ChatId) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat)
    }
}

/// Fetch tool invocation and artifact policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Interpreter used to run the fetch script (default: "bash")
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,

    /// Fetch script path (default: "animepahe-dl.sh")
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// Extra directory prepended to the child's PATH (bundled helpers)
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Root under which every job gets its own isolated workspace
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Resolutions tried high to low when no single value is requested
    #[serde(default = "default_ladder")]
    pub default_ladder: Vec<Resolution>,

    /// Extension of the media file the tool produces (default: "mp4")
    #[serde(default = "default_media_extension")]
    pub media_extension: String,

    /// Largest artifact the delivery channel accepts (default: 49 MiB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,

    /// Wall-clock limit for one attempt (default: 30 minutes)
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Time between the polite terminate signal and a hard kill (default: 10 seconds)
    #[serde(default = "default_terminate_grace", with = "duration_serde")]
    pub terminate_grace: Duration,

    /// Bytes of combined tool output retained per attempt (default: 4096)
    #[serde(default = "default_diagnostic_tail_bytes")]
    pub diagnostic_tail_bytes: usize,

    /// Characters of diagnostics shown to users (default: 300)
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Pause between episodes (default: 2 seconds)
    #[serde(default = "default_episode_pause", with = "duration_serde")]
    pub episode_pause: Duration,

    /// Extra arguments appended to every invocation (anti-blocking options)
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script_path: default_script_path(),
            bin_dir: None,
            workspace_root: default_workspace_root(),
            default_ladder: default_ladder(),
            media_extension: default_media_extension(),
            max_artifact_bytes: default_max_artifact_bytes(),
            attempt_timeout: default_attempt_timeout(),
            terminate_grace: default_terminate_grace(),
            diagnostic_tail_bytes: default_diagnostic_tail_bytes(),
            excerpt_chars: default_excerpt_chars(),
            episode_pause: default_episode_pause(),
            extra_args: Vec::new(),
        }
    }
}

/// Distribution sink defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Auxiliary chat channels that receive every artifact when enabled
    #[serde(default)]
    pub channel_ids: Vec<ChatId>,

    /// Whether the channel sinks start enabled (default: true)
    #[serde(default = "default_true")]
    pub channels_enabled: bool,

    /// Whether the offsite sink starts enabled (default: false)
    #[serde(default)]
    pub offsite_enabled: bool,

    /// Deliver as streamable video rather than document by default
    #[serde(default)]
    pub as_video: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            channels_enabled: true,
            offsite_enabled: false,
            as_video: false,
        }
    }
}

/// Offsite bulk storage (mega-cmd) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OffsiteConfig {
    /// Directory containing the mega-cmd binaries (searched in PATH if None)
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Account e-mail (offsite disabled when empty)
    #[serde(default)]
    pub email: String,

    /// Account password
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Remote folder that receives one sub-folder per title
    #[serde(default = "default_offsite_root")]
    pub root: String,

    /// Time allowed for one remote command (default: 10 minutes)
    #[serde(default = "default_offsite_timeout", with = "duration_serde")]
    pub command_timeout: Duration,
}

impl Default for OffsiteConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            email: String::new(),
            password: String::new(),
            root: default_offsite_root(),
            command_timeout: default_offsite_timeout(),
        }
    }
}

impl OffsiteConfig {
    /// Credentials present
    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

/// Liveness endpoint settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Serve the endpoint at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enabled: true,
        }
    }
}

/// Retry configuration for transient chat API failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Grouped into sub-configs:
/// - [`telegram`](TelegramConfig) - chat transport
/// - [`fetch`](FetchConfig) - fetch tool, workspace and artifact policy
/// - [`sinks`](SinkConfig) - distribution defaults
/// - [`offsite`](OffsiteConfig) - bulk storage account
/// - [`health`](HealthConfig) - liveness endpoint
/// - [`retry`](RetryConfig) - chat API retries
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat transport
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Fetch tool and artifacts
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Distribution sinks
    #[serde(default)]
    pub sinks: SinkConfig,
    /// Offsite storage
    #[serde(default)]
    pub offsite: OffsiteConfig,
    /// Liveness endpoint
    #[serde(default)]
    pub health: HealthConfig,
    /// Chat API retries
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(token) = get("BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Some(url) = get("TELEGRAM_API_URL") {
            config.telegram.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(chats) = get("ALLOWED_CHAT_IDS") {
            config.telegram.allowed_chats = parse_chat_list("ALLOWED_CHAT_IDS", &chats)?;
        }

        let mut channels = Vec::new();
        if let Some(main) = get("MAIN_CHANNEL_ID") {
            channels.extend(parse_chat_list("MAIN_CHANNEL_ID", &main)?);
        }
        if let Some(extra) = get("CHANNEL_IDS") {
            for id in parse_chat_list("CHANNEL_IDS", &extra)? {
                if !channels.contains(&id) {
                    channels.push(id);
                }
            }
        }
        config.sinks.channel_ids = channels;

        if let Some(v) = get("FETCH_SCRIPT") {
            config.fetch.script_path = PathBuf::from(v);
        }
        if let Some(v) = get("FETCH_INTERPRETER") {
            config.fetch.interpreter = PathBuf::from(v);
        }
        if let Some(v) = get("BIN_DIR") {
            config.fetch.bin_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("WORKSPACE_DIR") {
            config.fetch.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_ARTIFACT_MB") {
            let mb: u64 = parse_value("MAX_ARTIFACT_MB", &v)?;
            config.fetch.max_artifact_bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| {
                Error::config("MAX_ARTIFACT_MB", format!("{mb} MiB does not fit in a byte count"))
            })?;
        }
        if let Some(v) = get("FETCH_TIMEOUT_SECS") {
            config.fetch.attempt_timeout = Duration::from_secs(parse_value("FETCH_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("FETCH_EXTRA_ARGS") {
            config.fetch.extra_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("DEFAULT_LADDER") {
            config.fetch.default_ladder = v
                .split(',')
                .map(|r| parse_value::<u16>("DEFAULT_LADDER", r.trim()).map(Resolution))
                .collect::<Result<Vec<_>>>()?;
        }

        if let Some(v) = get("MEGA_EMAIL") {
            config.offsite.email = v;
        }
        if let Some(v) = get("MEGA_PASS") {
            config.offsite.password = v;
        }
        if let Some(v) = get("MEGA_ROOT") {
            config.offsite.root = v;
        }
        if let Some(v) = get("MEGA_BIN_DIR") {
            config.offsite.bin_dir = Some(PathBuf::from(v));
        }

        if let Some(v) = get("ENABLE_CHANNEL") {
            config.sinks.channels_enabled = parse_bool("ENABLE_CHANNEL", &v)?;
        }
        config.sinks.offsite_enabled = match get("ENABLE_MEGA") {
            Some(v) => parse_bool("ENABLE_MEGA", &v)?,
            None => config.offsite.has_credentials(),
        };

        if let Some(port) = get("PORT") {
            let port: u16 = parse_value("PORT", &port)?;
            config.health.bind_address.set_port(port);
        }

        Ok(config)
    }

    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            return Err(Error::config("BOT_TOKEN", "bot token must not be empty"));
        }
        match url::Url::parse(&self.telegram.api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(Error::config(
                    "TELEGRAM_API_URL",
                    format!("unsupported scheme {:?}", url.scheme()),
                ));
            }
            Err(e) => {
                return Err(Error::config(
                    "TELEGRAM_API_URL",
                    format!("invalid URL {:?}: {e}", self.telegram.api_url),
                ));
            }
        }
        if self.fetch.default_ladder.is_empty() {
            return Err(Error::config(
                "DEFAULT_LADDER",
                "resolution ladder must contain at least one resolution",
            ));
        }
        if self.fetch.max_artifact_bytes == 0 {
            return Err(Error::config(
                "MAX_ARTIFACT_MB",
                "artifact ceiling must be greater than zero",
            ));
        }
        if self.fetch.attempt_timeout.is_zero() {
            return Err(Error::config(
                "FETCH_TIMEOUT_SECS",
                "attempt timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(key, format!("invalid value {value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(key, format!("invalid boolean {value:?}"))),
    }
}

fn parse_chat_list(key: &str, value: &str) -> Result<Vec<ChatId>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value::<ChatId>(key, s))
        .collect()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_interpreter() -> PathBuf {
    PathBuf::from("bash")
}

fn default_script_path() -> PathBuf {
    PathBuf::from("animepahe-dl.sh")
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_ladder() -> Vec<Resolution> {
    vec![Resolution(1080), Resolution(720), Resolution(360)]
}

fn default_media_extension() -> String {
    "mp4".to_string()
}

fn default_max_artifact_bytes() -> u64 {
    49 * 1024 * 1024
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_diagnostic_tail_bytes() -> usize {
    4096
}

fn default_excerpt_chars() -> usize {
    300
}

fn default_episode_pause() -> Duration {
    Duration::from_secs(2)
}

fn default_offsite_root() -> String {
    "/Root/AnimeDownloads".to_string()
}

fn default_offsite_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
