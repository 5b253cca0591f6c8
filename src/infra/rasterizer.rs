//! HTML-to-PNG rasterization through an external command-line tool.

use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::export::{ExportError, RasterOptions, Rasterizer};

#[derive(Debug, Error)]
pub enum RasterCliError {
    #[error("failed to write temporary file: {0}")]
    Io(io::Error),
    #[error("rasterizer CLI invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("rasterizer CLI unavailable: {0}")]
    NotFound(io::Error),
    #[error("failed to read rendered image: {0}")]
    Read(io::Error),
    #[error("rasterizer task aborted: {0}")]
    Join(String),
}

impl From<RasterCliError> for ExportError {
    fn from(err: RasterCliError) -> Self {
        ExportError::raster(err.to_string())
    }
}

/// Runs a `wkhtmltoimage`-compatible CLI: `--quiet --format png --zoom N <input> <output>`.
#[derive(Debug, Clone)]
pub struct CommandRasterizer {
    cli_path: PathBuf,
}

impl CommandRasterizer {
    pub fn new(cli_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }

    fn render_png(&self, document: &str, options: &RasterOptions) -> Result<Vec<u8>, RasterCliError> {
        let started_at = Instant::now();
        let document = with_background(document, &options.background);

        let mut input_file = tempfile::Builder::new()
            .suffix(".html")
            .tempfile()
            .map_err(RasterCliError::Io)?;
        input_file
            .write_all(document.as_bytes())
            .map_err(RasterCliError::Io)?;
        input_file.flush().map_err(RasterCliError::Io)?;

        let output_file: NamedTempFile = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(RasterCliError::Io)?;
        let output_path = output_file.path().to_path_buf();

        let cli_started_at = Instant::now();
        let output = Command::new(&self.cli_path)
            .arg("--quiet")
            .arg("--format")
            .arg("png")
            .arg("--zoom")
            .arg(options.scale.to_string())
            .arg(input_file.path())
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                warn!(
                    target = "bazi_coach::infra::rasterizer",
                    op = "rasterize",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = "spawn_cli",
                    cli = %self.cli_path.display(),
                    error = %err,
                    "Failed to spawn rasterizer CLI"
                );
                if err.kind() == ErrorKind::NotFound {
                    RasterCliError::NotFound(err)
                } else {
                    RasterCliError::Io(err)
                }
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "bazi_coach::infra::rasterizer",
                op = "rasterize",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                error_code = "raster_cli",
                stderr = %stderr,
                "Rasterizer CLI invocation failed"
            );
            return Err(RasterCliError::Cli { exit_code, stderr });
        }

        let png = fs::read(&output_path).map_err(RasterCliError::Read)?;

        info!(
            target = "bazi_coach::infra::rasterizer",
            op = "rasterize",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            cli_elapsed_ms = cli_started_at.elapsed().as_millis() as u64,
            png_bytes = png.len(),
            scale = options.scale,
            "Report card rasterized via CLI"
        );

        Ok(png)
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    async fn rasterize(
        &self,
        document: &str,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let rasterizer = self.clone();
        let document = document.to_string();
        let options = options.clone();

        tokio::task::spawn_blocking(move || rasterizer.render_png(&document, &options))
            .await
            .map_err(|err| RasterCliError::Join(err.to_string()))?
            .map_err(ExportError::from)
    }
}

/// Pin the page background so transparent regions rasterize to the requested colour.
fn with_background(document: &str, background: &str) -> String {
    let style = format!("<style>html, body {{ background: {background}; }}</style>");
    match document.find("</head>") {
        Some(index) => {
            let mut patched = String::with_capacity(document.len() + style.len());
            patched.push_str(&document[..index]);
            patched.push_str(&style);
            patched.push_str(&document[index..]);
            patched
        }
        None => format!("{style}{document}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_style_lands_in_head() {
        let patched = with_background("<html><head></head><body></body></html>", "#f5f5f5");
        assert_eq!(
            patched,
            "<html><head><style>html, body { background: #f5f5f5; }</style></head><body></body></html>"
        );

        let bare = with_background("<p>x</p>", "#fff");
        assert!(bare.starts_with("<style>"));
    }
}

#[cfg(all(test, unix))]
mod cli_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn make_executable(path: &Path) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn fake_cli(dir: &TempDir, body: &str) -> PathBuf {
        let script_path = dir.path().join("fake-wkhtmltoimage");
        fs::write(&script_path, body).expect("write script");
        make_executable(&script_path);
        script_path
    }

    #[tokio::test]
    async fn writes_png_with_valid_cli() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let copy_path = dir.path().join("input.html");
        let script = format!(
            r#"#!/bin/sh
set -eu
echo "$@" > "{args_file}"
input=""
prev=""
for arg in "$@"; do
  input="$prev"
  prev="$arg"
done
cp "$input" "{copy_file}"
printf '\211PNG\r\n\032\nfake' > "$prev"
"#,
            args_file = args_path.display(),
            copy_file = copy_path.display()
        );
        let rasterizer = CommandRasterizer::new(fake_cli(&dir, &script));

        let png = rasterizer
            .rasterize(
                "<html><head></head><body>报告</body></html>",
                &RasterOptions::default(),
            )
            .await
            .expect("png rendered");
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"), "unexpected output: {png:?}");

        let args = fs::read_to_string(&args_path).expect("read args");
        assert!(args.contains("--zoom 2"), "CLI args missing zoom: {args}");
        assert!(args.contains("--format png"), "CLI args missing format: {args}");

        let input = fs::read_to_string(&copy_path).expect("read input copy");
        assert!(input.contains("background: #f5f5f5"));
        assert!(input.contains("报告"));
    }

    #[test]
    fn surfaces_cli_errors() {
        let dir = TempDir::new().expect("temp dir");
        let rasterizer = CommandRasterizer::new(fake_cli(
            &dir,
            "#!/bin/sh\necho \"boom\" >&2\nexit 42\n",
        ));

        let err = rasterizer
            .render_png("<p>x</p>", &RasterOptions::default())
            .expect_err("expected cli failure");
        match err {
            RasterCliError::Cli { exit_code, stderr } => {
                assert_eq!(exit_code, Some(42));
                assert!(stderr.contains("boom"), "stderr did not propagate: {stderr}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_cli_maps_to_raster_error() {
        let rasterizer = CommandRasterizer::new("/nonexistent/wkhtmltoimage");
        let err = rasterizer
            .rasterize("<p>x</p>", &RasterOptions::default())
            .await
            .expect_err("missing cli");
        assert!(matches!(err, ExportError::Raster { .. }));
    }
}
