use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Apify API token; TikTok and Instagram sourcing is unavailable without it.
    pub apify_token: Option<String>,
    pub apify_tiktok_actor: String,
    pub apify_instagram_actor: String,
    /// Bright Data API key; YouTube sourcing is unavailable without it.
    pub bright_data_api_key: Option<String>,
    pub youtube_dataset_id: String,
    /// Instagram login session id, passed through to the scraper actors to
    /// improve visibility of likes/comments/followers.
    pub instagram_session_id: Option<String>,
    pub twitter_auth_token: Option<String>,
    pub twitter_ct0: Option<String>,
    pub twitter_script: PathBuf,
    pub python_bin: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub provider_request_timeout_secs: u64,
    pub provider_poll_max_attempts: u32,
    pub provider_poll_delay_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("apify_token", &self.apify_token.as_ref().map(|_| "[redacted]"))
            .field("apify_tiktok_actor", &self.apify_tiktok_actor)
            .field("apify_instagram_actor", &self.apify_instagram_actor)
            .field(
                "bright_data_api_key",
                &self.bright_data_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("youtube_dataset_id", &self.youtube_dataset_id)
            .field(
                "instagram_session_id",
                &self.instagram_session_id.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "twitter_auth_token",
                &self.twitter_auth_token.as_ref().map(|_| "[redacted]"),
            )
            .field("twitter_ct0", &self.twitter_ct0.as_ref().map(|_| "[redacted]"))
            .field("twitter_script", &self.twitter_script)
            .field("python_bin", &self.python_bin)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "provider_request_timeout_secs",
                &self.provider_request_timeout_secs,
            )
            .field("provider_poll_max_attempts", &self.provider_poll_max_attempts)
            .field("provider_poll_delay_secs", &self.provider_poll_delay_secs)
            .finish()
    }
}
