//! Export utilities: copy the report as text and save the report card as an image.
//!
//! Both operations are thin pass-throughs to platform primitives reached through
//! [`Clipboard`] and [`Rasterizer`]. Failures never touch the displayed report;
//! they only produce a notice for the user.

use std::time::Instant;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono_tz::Tz;
use metrics::counter;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};

use crate::application::report::{RenderedReport, RenderedSection};
use crate::domain::report::ReportSection;
use crate::util::timezone::format_generated_at;

pub const COPY_SUCCESS_NOTICE: &str = "报告已复制到剪贴板！";
pub const COPY_FAILURE_NOTICE: &str = "复制报告失败，请手动复制";
pub const IMAGE_FAILURE_NOTICE: &str = "保存图片时出现错误，请稍后再试";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const METRIC_EXPORTS_TOTAL: &str = "bazi_exports_total";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("clipboard write failed: {message}")]
    Clipboard { message: String },
    #[error("rasterization failed: {message}")]
    Raster { message: String },
    #[error("no report has been generated yet")]
    NoReport,
}

impl ExportError {
    pub fn clipboard(message: impl Into<String>) -> Self {
        Self::Clipboard {
            message: message.into(),
        }
    }

    pub fn raster(message: impl Into<String>) -> Self {
        Self::Raster {
            message: message.into(),
        }
    }
}

/// How a clipboard write was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardWrite {
    /// The text is on the clipboard.
    Done,
    /// The write was handed to a client that reports the result to the user itself.
    Deferred,
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<ClipboardWrite, ExportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOptions {
    pub scale: u32,
    pub background: String,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2,
            background: "#f5f5f5".to_string(),
        }
    }
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render a complete HTML document to PNG bytes.
    async fn rasterize(&self, document: &str, options: &RasterOptions)
    -> Result<Vec<u8>, ExportError>;
}

/// Plain-text rendition of a report: each section under its label, then a timestamp.
pub fn compose_copy_text(report: &RenderedReport, generated_at: OffsetDateTime, tz: Tz) -> String {
    let mut parts = Vec::with_capacity(ReportSection::ALL.len() * 2 + 1);

    for (index, section) in ReportSection::ALL.iter().enumerate() {
        let label = section.copy_label();
        parts.push(if index == 0 {
            label
        } else {
            format!("\n\n{label}")
        });
        let text = report
            .section(*section)
            .map(RenderedSection::plain_text)
            .unwrap_or_default();
        parts.push(text.trim().to_string());
    }
    parts.push(format!(
        "\n\n生成时间：{}",
        format_generated_at(generated_at, tz)
    ));

    parts.join("\n")
}

/// Hand the copy text to the clipboard. Returns the notice to show, if any is due now.
pub async fn copy_report(clipboard: &dyn Clipboard, text: &str) -> Option<&'static str> {
    match clipboard.write_text(text).await {
        Ok(ClipboardWrite::Done) => {
            counter!(METRIC_EXPORTS_TOTAL, "kind" => "copy", "outcome" => "ok").increment(1);
            info!(
                target = "bazi_coach::application::export",
                op = "copy",
                result = "ok",
                chars = text.chars().count(),
                "report copied"
            );
            Some(COPY_SUCCESS_NOTICE)
        }
        Ok(ClipboardWrite::Deferred) => {
            counter!(METRIC_EXPORTS_TOTAL, "kind" => "copy", "outcome" => "deferred").increment(1);
            None
        }
        Err(err) => {
            counter!(METRIC_EXPORTS_TOTAL, "kind" => "copy", "outcome" => "error").increment(1);
            warn!(
                target = "bazi_coach::application::export",
                op = "copy",
                result = "error",
                error = %err,
                "report copy failed"
            );
            Some(COPY_FAILURE_NOTICE)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageExport {
    pub file_name: String,
    pub png: Vec<u8>,
}

impl ImageExport {
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// `命理报告_YYYY-MM-DD.png`, dated in UTC.
pub fn image_file_name(now: OffsetDateTime) -> String {
    format!("命理报告_{}.png", now.to_offset(UtcOffset::UTC).date())
}

pub async fn export_image(
    rasterizer: &dyn Rasterizer,
    document: &str,
    options: &RasterOptions,
    now: OffsetDateTime,
) -> Result<ImageExport, ExportError> {
    let started_at = Instant::now();
    let result = rasterizer
        .rasterize(document, options)
        .await
        .and_then(|png| {
            if png.starts_with(PNG_SIGNATURE) {
                Ok(png)
            } else {
                Err(ExportError::raster("output is not a PNG image"))
            }
        });
    let elapsed_ms = started_at.elapsed().as_millis() as u64;

    match result {
        Ok(png) => {
            counter!(METRIC_EXPORTS_TOTAL, "kind" => "image", "outcome" => "ok").increment(1);
            info!(
                target = "bazi_coach::application::export",
                op = "image",
                result = "ok",
                bytes = png.len(),
                elapsed_ms,
                "report image exported"
            );
            Ok(ImageExport {
                file_name: image_file_name(now),
                png,
            })
        }
        Err(err) => {
            counter!(METRIC_EXPORTS_TOTAL, "kind" => "image", "outcome" => "error").increment(1);
            warn!(
                target = "bazi_coach::application::export",
                op = "image",
                result = "error",
                error = %err,
                elapsed_ms,
                "report image export failed"
            );
            Err(err)
        }
    }
}
