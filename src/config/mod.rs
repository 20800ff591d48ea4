//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachewire";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8320;
const DEFAULT_TOKEN_TTL_SECS: u64 = 60;
const DEFAULT_ROOM_CAPACITY: usize = 256;
const DEFAULT_EMIT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_NOTIFICATION_CONCURRENCY: u32 = 2;

/// Command-line arguments for the Cachewire binary.
#[derive(Debug, Parser)]
#[command(name = "cachewire", version, about = "Cachewire invalidation relay server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHEWIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Cachewire HTTP services.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the relay ingress URL the emitter publishes to.
    #[arg(long = "relay-ingress-url", value_name = "URL")]
    pub relay_ingress_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to assemble configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl LoadError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub relay: RelaySettings,
    pub api: ApiSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, LoadError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| LoadError::invalid(format!("server address: {err}")))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Directive {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
        .into()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct StoreSettings {
    /// Retention of notification lists, in seconds. Absent means values
    /// live until explicitly cleared.
    pub retention_seconds: Option<NonZeroU64>,
}

impl StoreSettings {
    pub fn retention(&self) -> Option<Duration> {
        self.retention_seconds
            .map(|secs| Duration::from_secs(secs.get()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Ingress origin the emitter publishes to. Defaults to the server's
    /// own listener.
    pub ingress_url: Option<String>,
    /// Secret the relay credentials are signed with. Required to serve.
    pub signing_secret: Option<String>,
    pub token_ttl_seconds: NonZeroU64,
    pub room_capacity: NonZeroUsize,
    pub emit_timeout_ms: NonZeroU64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ingress_url: None,
            signing_secret: None,
            token_ttl_seconds: NonZeroU64::new(DEFAULT_TOKEN_TTL_SECS)
                .unwrap_or(NonZeroU64::MIN),
            room_capacity: NonZeroUsize::new(DEFAULT_ROOM_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            emit_timeout_ms: NonZeroU64::new(DEFAULT_EMIT_TIMEOUT_MS).unwrap_or(NonZeroU64::MIN),
        }
    }
}

impl RelaySettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds.get())
    }

    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms.get())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiSettings {
    /// Static bearer token of the console API. Required to serve.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSettings {
    pub notification_concurrency: NonZeroU32,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            notification_concurrency: NonZeroU32::new(DEFAULT_NOTIFICATION_CONCURRENCY)
                .unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl Settings {
    /// Fail fast on anything `serve` cannot run without, before any
    /// mutation is attempted.
    pub fn validate_for_serve(&self) -> Result<(), LoadError> {
        match &self.relay.signing_secret {
            Some(secret) if !secret.is_empty() => {}
            _ => {
                return Err(LoadError::invalid(
                    "relay.signing_secret is required (set CACHEWIRE__RELAY__SIGNING_SECRET)",
                ));
            }
        }
        match &self.api.token {
            Some(token) if !token.is_empty() => {}
            _ => {
                return Err(LoadError::invalid(
                    "api.token is required (set CACHEWIRE__API__TOKEN)",
                ));
            }
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = &overrides.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(url) = &overrides.relay_ingress_url {
            self.relay.ingress_url = Some(url.clone());
        }
    }
}

/// Parse CLI arguments and load settings with layered precedence.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings: defaults file, local file, explicit file, environment,
/// then CLI overrides.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = &cli.config_file {
        builder = builder.add_source(File::from(path.clone()));
    }

    let assembled = builder
        .add_source(Environment::with_prefix("CACHEWIRE").separator("__"))
        .build()?;

    let mut settings: Settings = assembled.try_deserialize()?;

    if let Some(Command::Serve(args)) = &cli.command {
        settings.apply_serve_overrides(&args.overrides);
    }

    Ok(settings)
}
