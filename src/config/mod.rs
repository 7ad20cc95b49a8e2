//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::pagination::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PageLimit};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "postlist";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_API_ENDPOINT: &str = "http://localhost:4000/graphql";
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_SESSIONS: u64 = 1024;
const DEFAULT_SESSION_IDLE_SECS: u64 = 900;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CARD_IMAGE_SRC: &str =
    "https://tailwindui.com/img/ecommerce-images/category-page-04-image-card-03.jpg";
const DEFAULT_DATASTAR_SRC: &str =
    "https://cdn.jsdelivr.net/gh/starfederation/datastar@1.0.0-RC.6/bundles/datastar.js";

/// Command-line arguments for the postlist binary.
#[derive(Debug, Parser)]
#[command(name = "postlist", version, about = "Infinite-scrolling post list server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POSTLIST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Validate configuration and probe the GraphQL API, then exit.
    Check(CheckArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub api: ApiOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ApiOverrides {
    /// Override the GraphQL endpoint URL.
    #[arg(long = "api-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the GraphQL request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub api: ApiOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the number of posts fetched per page.
    #[arg(long = "feed-page-limit", value_name = "COUNT")]
    pub feed_page_limit: Option<u32>,

    /// Override how many feed sessions are kept at once.
    #[arg(long = "feed-max-sessions", value_name = "COUNT")]
    pub feed_max_sessions: Option<u64>,

    /// Override how long an untouched feed session survives.
    #[arg(long = "feed-session-idle-seconds", value_name = "SECONDS")]
    pub feed_session_idle_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub api: ApiSettings,
    pub feed: FeedSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct ApiSettings {
    pub endpoint: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_limit: PageLimit,
    pub max_sessions: NonZeroUsize,
    pub session_idle: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub brand_title: String,
    pub brand_href: String,
    pub header_title: String,
    pub meta_title: String,
    pub meta_description: String,
    pub navigation: Vec<NavigationLink>,
    pub post_path_prefix: String,
    pub card_image_src: String,
    pub datastar_src: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            brand_title: "Posts".to_string(),
            brand_href: "/".to_string(),
            header_title: "Post List".to_string(),
            meta_title: "Home".to_string(),
            meta_description: "Latest posts".to_string(),
            navigation: vec![NavigationLink {
                label: "Home".to_string(),
                href: "/".to_string(),
                external: false,
            }],
            post_path_prefix: "/posts/".to_string(),
            card_image_src: DEFAULT_CARD_IMAGE_SRC.to_string(),
            datastar_src: DEFAULT_DATASTAR_SRC.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationLink {
    pub label: String,
    pub href: String,
    #[serde(default)]
    pub external: bool,
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

    builder = builder.add_source(Environment::with_prefix("POSTLIST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Check(args)) => raw.apply_api_overrides(&args.api),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    api: RawApiSettings,
    feed: RawFeedSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.feed_page_limit {
            self.feed.page_limit = Some(limit);
        }
        if let Some(max) = overrides.feed_max_sessions {
            self.feed.max_sessions = Some(max);
        }
        if let Some(seconds) = overrides.feed_session_idle_seconds {
            self.feed.session_idle_seconds = Some(seconds);
        }

        self.apply_api_overrides(&overrides.api);
    }

    fn apply_api_overrides(&mut self, overrides: &ApiOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.api.endpoint = Some(endpoint.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.api.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            api,
            feed,
            site,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let api = build_api_settings(api)?;
        let feed = build_feed_settings(feed)?;
        let site = build_site_settings(site)?;

        Ok(Self {
            server,
            logging,
            api,
            feed,
            site,
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

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
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

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_endpoint = api
        .endpoint
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());

    let endpoint = Url::parse(&raw_endpoint)
        .map_err(|err| LoadError::invalid("api.endpoint", format!("`{raw_endpoint}`: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.endpoint",
            format!("unsupported scheme `{}`", endpoint.scheme()),
        ));
    }

    let timeout_secs = api.timeout_seconds.unwrap_or(DEFAULT_API_TIMEOUT_SECS);
    let timeout = non_zero_u32(timeout_secs, "api.timeout_seconds")?;

    Ok(ApiSettings {
        endpoint,
        timeout: Duration::from_secs(timeout.get().into()),
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let requested = feed.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let page_limit = PageLimit::new(requested.clamp(1, MAX_PAGE_LIMIT))
        .map_err(|err| LoadError::invalid("feed.page_limit", err.to_string()))?;

    let max_sessions_value = feed.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS);
    let max_sessions = usize::try_from(max_sessions_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("feed.max_sessions", "must be greater than zero"))?;

    let idle_secs = feed
        .session_idle_seconds
        .unwrap_or(DEFAULT_SESSION_IDLE_SECS);
    let idle = non_zero_u32(idle_secs, "feed.session_idle_seconds")?;

    let sweep_secs = feed
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let sweep = non_zero_u32(sweep_secs, "feed.sweep_interval_seconds")?;

    Ok(FeedSettings {
        page_limit,
        max_sessions,
        session_idle: Duration::from_secs(idle.get().into()),
        sweep_interval: Duration::from_secs(sweep.get().into()),
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let defaults = SiteSettings::default();

    let navigation = match site.navigation {
        Some(links) => {
            for link in &links {
                if link.label.trim().is_empty() {
                    return Err(LoadError::invalid(
                        "site.navigation",
                        "link label must not be empty",
                    ));
                }
                if link.href.trim().is_empty() {
                    return Err(LoadError::invalid(
                        "site.navigation",
                        format!("link `{}` has an empty href", link.label),
                    ));
                }
            }
            links
        }
        None => defaults.navigation,
    };

    let post_path_prefix = site
        .post_path_prefix
        .unwrap_or(defaults.post_path_prefix);
    if !post_path_prefix.starts_with('/') {
        return Err(LoadError::invalid(
            "site.post_path_prefix",
            "must start with `/`",
        ));
    }

    Ok(SiteSettings {
        brand_title: site.brand_title.unwrap_or(defaults.brand_title),
        brand_href: site.brand_href.unwrap_or(defaults.brand_href),
        header_title: site.header_title.unwrap_or(defaults.header_title),
        meta_title: site.meta_title.unwrap_or(defaults.meta_title),
        meta_description: site.meta_description.unwrap_or(defaults.meta_description),
        navigation,
        post_path_prefix,
        card_image_src: site.card_image_src.unwrap_or(defaults.card_image_src),
        datastar_src: site.datastar_src.unwrap_or(defaults.datastar_src),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    endpoint: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_limit: Option<u32>,
    max_sessions: Option<u64>,
    session_idle_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    brand_title: Option<String>,
    brand_href: Option<String>,
    header_title: Option<String>,
    meta_title: Option<String>,
    meta_description: Option<String>,
    navigation: Option<Vec<NavigationLink>>,
    post_path_prefix: Option<String>,
    card_image_src: Option<String>,
    datastar_src: Option<String>,
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
