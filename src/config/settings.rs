use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted HTTP request body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Upgrade path for client connections
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Frames queued per session before senders wait
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum concurrent per-session sends across all broadcasts
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Broadcast requests buffered between the trigger and the dispatcher
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    64 * 1024
}

fn default_ws_path() -> String {
    "/messages".to_string()
}

fn default_channel_buffer() -> usize {
    32
}

fn default_max_sessions() -> usize {
    crate::session::DEFAULT_MAX_SESSIONS
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_worker_pool_size() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("websocket.path", default_ws_path())?
            .set_default("dispatcher.worker_pool_size", default_worker_pool_size() as i64)?
            .set_default("logging.level", default_log_level())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // WSB__SERVER__PORT, WSB__DISPATCHER__WORKER_POOL_SIZE, ...
            .add_source(
                Environment::with_prefix("WSB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.websocket.path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "websocket.path must start with '/', got {:?}",
                self.websocket.path
            )));
        }
        if self.websocket.channel_buffer_size == 0 {
            return Err(ConfigError::Message(
                "websocket.channel_buffer_size must be greater than 0".into(),
            ));
        }
        if self.dispatcher.worker_pool_size == 0 {
            return Err(ConfigError::Message(
                "dispatcher.worker_pool_size must be greater than 0".into(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "dispatcher.queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            channel_buffer_size: default_channel_buffer(),
            max_sessions: default_max_sessions(),
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            send_timeout_ms: default_send_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
