mod settings;

pub use settings::{
    DispatcherConfig, LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
};
