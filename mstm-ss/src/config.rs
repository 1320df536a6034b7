//! Configuration for the streaming service
//!
//! Bootstrap settings come from, in priority order:
//! 1. Command-line arguments
//! 2. Environment variables (handled by clap `env` fallbacks)
//! 3. TOML configuration file (`streaming.toml`)
//! 4. Built-in defaults
//!
//! Settings cannot change while running; restart to pick up changes.

use crate::delivery::DEFAULT_CHUNK_SIZE;
use crate::events::{DEFAULT_PUBLISH_TIMEOUT, SONG_EVENTS_EXCHANGE, SONG_EVENTS_QUEUE};
use crate::source::SourceKind;
use crate::trigger::{TriggerPolicy, DEFAULT_PLAY_THRESHOLD};
use clap::Parser;
use mstm_common::config::{load_toml_or_default, resolve_config_file};
use mstm_common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Config file name searched in the standard locations
pub const CONFIG_FILE_NAME: &str = "streaming.toml";

/// Command-line arguments for mstm-ss
#[derive(Parser, Debug, Default)]
#[command(name = "mstm-ss")]
#[command(about = "Audio streaming microservice for MSTM")]
#[command(version)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "MSTM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "MSTM_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MSTM_PORT")]
    pub port: Option<u16>,

    /// PostgreSQL URL of the song catalogue
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory that stored audio paths are relative to
    #[arg(long, env = "CONTENT_BASE_PATH")]
    pub content_base_path: Option<PathBuf>,

    /// HMAC secret for access tokens (auth disabled when unset)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// AMQP broker URL for playback events (events only logged when unset)
    #[arg(long, env = "RABBITMQ_URL", hide_env_values = true)]
    pub amqp_url: Option<String>,
}

/// Playback event publishing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub exchange: String,
    pub queue: String,
    pub publish_timeout_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            exchange: SONG_EVENTS_EXCHANGE.to_string(),
            queue: SONG_EVENTS_QUEUE.to_string(),
            publish_timeout_ms: DEFAULT_PUBLISH_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub content_base_path: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub amqp_url: Option<String>,

    /// Source backend tag
    pub source_backend: SourceKind,

    /// Bytes per delivered chunk
    pub chunk_size: usize,

    /// Fraction of a track that counts as a play
    pub play_threshold: f64,
    pub trigger_policy: TriggerPolicy,

    pub events: EventsConfig,
    pub logging: LoggingConfig,

    /// File the settings were read from, if any
    #[serde(skip)]
    pub source_file: Option<PathBuf>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5780,
            database_url: None,
            content_base_path: None,
            jwt_secret: None,
            amqp_url: None,
            source_backend: SourceKind::Local,
            chunk_size: DEFAULT_CHUNK_SIZE,
            play_threshold: DEFAULT_PLAY_THRESHOLD,
            trigger_policy: TriggerPolicy::Asymmetric,
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
            source_file: None,
        }
    }
}

impl StreamingConfig {
    /// Resolve, load, override and validate
    pub fn load(args: &Args) -> Result<Self> {
        let path = resolve_config_file(args.config.as_deref(), "MSTM_CONFIG", CONFIG_FILE_NAME);

        let mut config: StreamingConfig = load_toml_or_default(path.as_deref())?;
        config.source_file = path;
        config.apply_args(args);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Command-line / environment values win over the file
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(url) = &args.database_url {
            self.database_url = Some(url.clone());
        }
        if let Some(path) = &args.content_base_path {
            self.content_base_path = Some(path.clone());
        }
        if let Some(secret) = &args.jwt_secret {
            self.jwt_secret = Some(secret.clone());
        }
        if let Some(url) = &args.amqp_url {
            self.amqp_url = Some(url.clone());
        }
    }

    /// Empty strings mean "unset"
    fn normalize(&mut self) {
        for value in [&mut self.database_url, &mut self.jwt_secret, &mut self.amqp_url] {
            if value.as_deref().map_or(false, |v| v.trim().is_empty()) {
                *value = None;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }

        if !(self.play_threshold > 0.0 && self.play_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "play_threshold must be in (0, 1], got {}",
                self.play_threshold
            )));
        }

        // The memory backend has no way to be populated from a config file
        if self.source_backend == SourceKind::Memory {
            return Err(Error::Config(
                "source_backend \"memory\" is only available when embedding the library".to_string(),
            ));
        }

        if self.database_url.is_some() && self.content_base_path.is_none() {
            return Err(Error::Config(
                "content_base_path is required when database_url is set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.events.publish_timeout_ms)
    }
}
