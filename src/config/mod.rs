//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
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
use url::Url;

mod cli;

pub use cli::{
    BackendOverrides, CliArgs, Command, ExportOverrides, LoggingOverrides, RenderArgs,
    ReportArgs, ServeArgs, ServeOverrides,
};

use crate::domain::birth::DEFAULT_MIN_YEAR;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bazi-coach";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8090;
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_REPORT_PATH: &str = "/generate_report";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RASTERIZER_CLI_PATH: &str = "wkhtmltoimage";
const DEFAULT_CLIPBOARD_COMMAND: &str = "xclip -selection clipboard";
const DEFAULT_BACKGROUND: &str = "#f5f5f5";
const DEFAULT_SCALE: u64 = 2;
const MAX_SCALE: u32 = 4;
const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_SESSION_CAPACITY: u64 = 1024;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub export: ExportSettings,
    pub form: FormSettings,
    pub sessions: SessionSettings,
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
pub struct BackendSettings {
    pub base_url: Url,
    pub report_path: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub rasterizer_cli_path: PathBuf,
    /// Program followed by its arguments.
    pub clipboard_command: Vec<String>,
    pub background: String,
    pub scale: NonZeroU32,
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct FormSettings {
    pub min_year: i32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub capacity: NonZeroU32,
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

    builder = builder.add_source(Environment::with_prefix("BAZI").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_logging_overrides(&args.logging),
        Some(Command::Report(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_backend_overrides(&args.backend);
            raw.apply_export_overrides(&args.export);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    export: RawExportSettings,
    form: RawFormSettings,
    sessions: RawSessionSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(year) = overrides.form_min_year {
            self.form.min_year = Some(year);
        }
        if let Some(ttl) = overrides.sessions_ttl_seconds {
            self.sessions.ttl_seconds = Some(ttl);
        }
        if let Some(capacity) = overrides.sessions_capacity {
            self.sessions.capacity = Some(capacity);
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_backend_overrides(&overrides.backend);
        self.apply_export_overrides(&overrides.export);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_backend_overrides(&mut self, overrides: &BackendOverrides) {
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.base_url = Some(url.clone());
        }
        if let Some(path) = overrides.backend_report_path.as_ref() {
            self.backend.report_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.backend_timeout_seconds {
            self.backend.timeout_seconds = Some(seconds);
        }
    }

    fn apply_export_overrides(&mut self, overrides: &ExportOverrides) {
        if let Some(path) = overrides.rasterizer_cli_path.as_ref() {
            self.export.rasterizer_cli_path = Some(path.clone());
        }
        if let Some(command) = overrides.clipboard_command.as_ref() {
            self.export.clipboard_command = Some(command.clone());
        }
        if let Some(timezone) = overrides.timezone.as_ref() {
            self.export.timezone = Some(timezone.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            backend,
            export,
            form,
            sessions,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let backend = build_backend_settings(backend)?;
        let export = build_export_settings(export)?;
        let form = build_form_settings(form)?;
        let sessions = build_session_settings(sessions)?;

        Ok(Self {
            server,
            logging,
            backend,
            export,
            form,
            sessions,
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

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let raw_url = backend
        .base_url
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("backend.base_url", format!("invalid URL: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "backend.base_url",
            "scheme must be http or https",
        ));
    }

    let report_path = backend
        .report_path
        .unwrap_or_else(|| DEFAULT_REPORT_PATH.to_string());
    if !report_path.starts_with('/') {
        return Err(LoadError::invalid(
            "backend.report_path",
            "path must start with `/`",
        ));
    }

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackendSettings {
        base_url,
        report_path,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let rasterizer_cli_path = export
        .rasterizer_cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RASTERIZER_CLI_PATH));
    if rasterizer_cli_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "export.rasterizer_cli_path",
            "path must not be empty",
        ));
    }

    let clipboard_command: Vec<String> = export
        .clipboard_command
        .as_deref()
        .unwrap_or(DEFAULT_CLIPBOARD_COMMAND)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if clipboard_command.is_empty() {
        return Err(LoadError::invalid(
            "export.clipboard_command",
            "command must not be empty",
        ));
    }

    let background = export
        .background
        .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string());
    if !is_hex_colour(&background) {
        return Err(LoadError::invalid(
            "export.background",
            format!("`{background}` is not a #rgb or #rrggbb colour"),
        ));
    }

    let scale = non_zero_u32(export.scale.unwrap_or(DEFAULT_SCALE), "export.scale")?;
    if scale.get() > MAX_SCALE {
        return Err(LoadError::invalid(
            "export.scale",
            format!("must not exceed {MAX_SCALE}"),
        ));
    }

    let timezone_name = export
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(timezone_name.trim()).map_err(|err| {
        LoadError::invalid("export.timezone", format!("unknown timezone: {err}"))
    })?;

    Ok(ExportSettings {
        rasterizer_cli_path,
        clipboard_command,
        background,
        scale,
        timezone,
    })
}

fn build_form_settings(form: RawFormSettings) -> Result<FormSettings, LoadError> {
    let min_year = form.min_year.unwrap_or(DEFAULT_MIN_YEAR);
    if !(1..=9999).contains(&min_year) {
        return Err(LoadError::invalid(
            "form.min_year",
            "must be between 1 and 9999",
        ));
    }

    Ok(FormSettings { min_year })
}

fn build_session_settings(sessions: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let ttl_secs = sessions.ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "sessions.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let capacity = non_zero_u32(
        sessions.capacity.unwrap_or(DEFAULT_SESSION_CAPACITY),
        "sessions.capacity",
    )?;

    Ok(SessionSettings {
        ttl: Duration::from_secs(ttl_secs),
        capacity,
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
struct RawBackendSettings {
    base_url: Option<String>,
    report_path: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    rasterizer_cli_path: Option<PathBuf>,
    clipboard_command: Option<String>,
    background: Option<String>,
    scale: Option<u64>,
    timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFormSettings {
    min_year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    ttl_seconds: Option<u64>,
    capacity: Option<u64>,
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

fn is_hex_colour(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
