use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the bazi-coach binary.
#[derive(Debug, Parser)]
#[command(name = "bazi-coach", version, about = "BaZi report form server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BAZI_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Render a report markup file to HTML on stdout.
    Render(RenderArgs),
    /// Request one report from the backend and print or export it.
    Report(Box<ReportArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct BackendOverrides {
    /// Override the report backend base URL.
    #[arg(long = "backend-url", value_name = "URL")]
    pub backend_url: Option<String>,

    /// Override the path of the report endpoint.
    #[arg(long = "backend-report-path", value_name = "PATH")]
    pub backend_report_path: Option<String>,

    /// Override the report request timeout.
    #[arg(long = "backend-timeout-seconds", value_name = "SECONDS")]
    pub backend_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ExportOverrides {
    /// Override the HTML-to-image executable used for image export.
    #[arg(long = "export-rasterizer-cli-path", value_name = "PATH")]
    pub rasterizer_cli_path: Option<PathBuf>,

    /// Override the command that receives copied text on stdin.
    #[arg(long = "export-clipboard-command", value_name = "COMMAND")]
    pub clipboard_command: Option<String>,

    /// Override the timezone used for timestamps and the year range.
    #[arg(long = "export-timezone", value_name = "TZ")]
    pub timezone: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub backend: BackendOverrides,

    #[command(flatten)]
    pub export: ExportOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the earliest selectable birth year.
    #[arg(long = "form-min-year", value_name = "YEAR")]
    pub form_min_year: Option<i32>,

    /// Override how long a session keeps its last report.
    #[arg(long = "sessions-ttl-seconds", value_name = "SECONDS")]
    pub sessions_ttl_seconds: Option<u64>,

    /// Override how many sessions are kept at once.
    #[arg(long = "sessions-capacity", value_name = "COUNT")]
    pub sessions_capacity: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Markup file to render; `-` reads stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Pass the output through the HTML sanitizer.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub sanitize: bool,

    /// Print plain text instead of HTML.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "sanitize")]
    pub text: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub backend: BackendOverrides,

    #[command(flatten)]
    pub export: ExportOverrides,

    /// Birth year.
    #[arg(long, value_name = "YEAR")]
    pub year: String,

    /// Birth month (1-12).
    #[arg(long, value_name = "MONTH")]
    pub month: String,

    /// Birth day of month.
    #[arg(long, value_name = "DAY")]
    pub day: String,

    /// Time slot name, e.g. 午时.
    #[arg(long, value_name = "SHICHEN")]
    pub shichen: String,

    /// Write the report card document to this file instead of printing text.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Copy the report text to the clipboard.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub copy: bool,

    /// Export the report card as PNG into this directory.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub image: Option<PathBuf>,
}
