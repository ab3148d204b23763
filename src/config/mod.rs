//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use chrono_tz::Tz;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, GroupsArgs, GroupsCommand, ServeArgs, ServeOverrides,
    SessionsArgs, SessionsCommand, UsersArgs, UsersCommand,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blogroll";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPLOAD_DIR: &str = "media";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_FEED_PAGE_SIZE: u32 = 10;
const DEFAULT_PROFILE_PAGE_SIZE: u32 = 5;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_INDEX_TTL_SECS: u64 = 20;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 64;
const DEFAULT_SESSION_COOKIE: &str = "blogroll_session";
const DEFAULT_SESSION_TTL_HOURS: u64 = 24 * 14;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub uploads: UploadSettings,
    pub feed: FeedSettings,
    pub cache: CacheSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroU32,
    pub profile_page_size: NonZeroU32,
    /// Zone used when printing post and comment dates.
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub index_ttl: Duration,
    pub max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl: Duration,
    pub secure_cookie: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("BLOGROLL").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Users(args)) => raw.apply_database_override(&args.database),
        Some(Command::Groups(args)) => raw.apply_database_override(&args.database),
        Some(Command::Sessions(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    uploads: RawUploadSettings,
    feed: RawFeedSettings,
    cache: RawCacheSettings,
    session: RawSessionSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(ttl) = overrides.cache_index_ttl_seconds {
            self.cache.index_ttl_seconds = Some(ttl);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            uploads,
            feed,
            cache,
            session,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            uploads: build_upload_settings(uploads)?,
            feed: build_feed_settings(feed)?,
            cache: build_cache_settings(cache)?,
            session: build_session_settings(session)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let directory = uploads
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "uploads.directory",
            "path must not be empty",
        ));
    }

    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        directory,
        max_request_bytes,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let page_size = non_zero_u32(
        feed.page_size.unwrap_or(DEFAULT_FEED_PAGE_SIZE).into(),
        "feed.page_size",
    )?;
    let profile_page_size = non_zero_u32(
        feed.profile_page_size
            .unwrap_or(DEFAULT_PROFILE_PAGE_SIZE)
            .into(),
        "feed.profile_page_size",
    )?;

    let zone = feed
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(zone.trim())
        .map_err(|err| LoadError::invalid("feed.timezone", format!("`{zone}`: {err}")))?;

    Ok(FeedSettings {
        page_size,
        profile_page_size,
        timezone,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = cache.index_ttl_seconds.unwrap_or(DEFAULT_INDEX_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.index_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let max_entries = NonZeroUsize::new(cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES))
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        index_ttl: Duration::from_secs(ttl_seconds),
        max_entries,
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let cookie_name = session
        .cookie_name
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
    if cookie_name.is_empty()
        || !cookie_name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(LoadError::invalid(
            "session.cookie_name",
            "must be a non-empty token of letters, digits, `_` or `-`",
        ));
    }

    let ttl_hours = session.ttl_hours.unwrap_or(DEFAULT_SESSION_TTL_HOURS);
    if ttl_hours == 0 {
        return Err(LoadError::invalid(
            "session.ttl_hours",
            "must be greater than zero",
        ));
    }

    Ok(SessionSettings {
        cookie_name,
        ttl: Duration::from_secs(ttl_hours * 3600),
        secure_cookie: session.secure_cookie.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u32>,
    profile_page_size: Option<u32>,
    timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    index_ttl_seconds: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    cookie_name: Option<String>,
    ttl_hours: Option<u64>,
    secure_cookie: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
