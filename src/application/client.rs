//! Report client: one backend call per submission.
//!
//! [`ReportBackend`] is the transport seam; [`HttpReportBackend`] talks to the
//! real service over HTTP. [`ReportClient`] wraps any backend, checks that the
//! payload is complete and records latency.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bazi_api_types::{ErrorBody, GenerateReportRequest, GenerateReportResponse};
use metrics::histogram;
use reqwest::{Client, Response, Url};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{birth::BirthInput, error::DomainError, report::ReportBundle};

const METRIC_BACKEND_REQUEST_MS: &str = "bazi_backend_request_ms";

/// Alert shown when the backend answers without chart facts or sections.
pub const INCOMPLETE_REPORT_MESSAGE: &str = "未能获取完整的报告数据";
/// Prefix for every other submission failure alert.
pub const REPORT_FAILURE_PREFIX: &str = "生成报告时出现错误：";

#[derive(Debug, Error)]
pub enum ReportClientError {
    #[error("{message}")]
    Transport { message: String },
    #[error("网络错误：{reason}")]
    Status {
        status: u16,
        reason: String,
        /// Message from the backend's JSON error body, kept for logs.
        detail: Option<String>,
    },
    #[error("report payload is missing `{member}`")]
    Incomplete { member: &'static str },
    #[error("invalid report body: {message}")]
    Decode { message: String },
    #[error("invalid backend endpoint: {message}")]
    Setup { message: String },
}

impl ReportClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport("请求超时")
        } else {
            Self::transport(err.to_string())
        }
    }

    /// Text for the alert the user sees.
    pub fn user_message(&self) -> String {
        match self {
            Self::Incomplete { .. } => INCOMPLETE_REPORT_MESSAGE.to_string(),
            other => format!("{REPORT_FAILURE_PREFIX}{other}"),
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Transport { .. } | Self::Setup { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Incomplete { .. } => "incomplete",
            Self::Decode { .. } => "decode",
        }
    }
}

impl From<DomainError> for ReportClientError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Incomplete { member } => Self::Incomplete { member },
            other => Self::Decode {
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait ReportBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerateReportRequest,
    ) -> Result<GenerateReportResponse, ReportClientError>;
}

/// Backend reached with a JSON POST.
#[derive(Clone, Debug)]
pub struct HttpReportBackend {
    client: Client,
    endpoint: Url,
}

impl HttpReportBackend {
    pub fn new(
        base_url: &Url,
        report_path: &str,
        timeout: Duration,
    ) -> Result<Self, ReportClientError> {
        let endpoint = base_url
            .join(report_path)
            .map_err(|err| ReportClientError::Setup {
                message: err.to_string(),
            })?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| ReportClientError::Setup {
                message: err.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }

    pub fn user_agent() -> &'static str {
        concat!("bazi-coach/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn handle(resp: Response) -> Result<GenerateReportResponse, ReportClientError> {
        let status = resp.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string());
            let detail = resp
                .bytes()
                .await
                .ok()
                .and_then(|body| serde_json::from_slice::<ErrorBody>(&body).ok())
                .map(|body| body.error);
            return Err(ReportClientError::Status {
                status: status.as_u16(),
                reason,
                detail,
            });
        }

        let bytes = resp.bytes().await.map_err(ReportClientError::from_reqwest)?;
        serde_json::from_slice(&bytes).map_err(|err| ReportClientError::Decode {
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl ReportBackend for HttpReportBackend {
    async fn generate(
        &self,
        request: &GenerateReportRequest,
    ) -> Result<GenerateReportResponse, ReportClientError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(ReportClientError::from_reqwest)?;
        Self::handle(resp).await
    }
}

/// Issues the single request of a submission and validates the payload shape.
#[derive(Clone)]
pub struct ReportClient {
    backend: Arc<dyn ReportBackend>,
}

impl ReportClient {
    pub fn new(backend: Arc<dyn ReportBackend>) -> Self {
        Self { backend }
    }

    pub async fn fetch(&self, input: &BirthInput) -> Result<ReportBundle, ReportClientError> {
        let started_at = Instant::now();
        let request = input.to_request();

        let result = match self.backend.generate(&request).await {
            Ok(response) => ReportBundle::try_from(response).map_err(ReportClientError::from),
            Err(err) => Err(err),
        };

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.outcome(),
        };
        histogram!(METRIC_BACKEND_REQUEST_MS, "outcome" => outcome).record(elapsed_ms);

        match &result {
            Ok(_) => info!(
                target = "bazi_coach::application::client",
                op = "fetch",
                result = "ok",
                year = request.year.as_str(),
                month = request.month.as_str(),
                day = request.day.as_str(),
                shichen = request.shichen.as_str(),
                elapsed_ms = elapsed_ms as u64,
                "report received"
            ),
            Err(err) => {
                let detail = match err {
                    ReportClientError::Status {
                        detail: Some(detail),
                        ..
                    } => detail.as_str(),
                    _ => "",
                };
                warn!(
                    target = "bazi_coach::application::client",
                    op = "fetch",
                    result = outcome,
                    error = %err,
                    detail,
                    elapsed_ms = elapsed_ms as u64,
                    "report request failed"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bazi_api_types::{BaziInfo, ReportSections};

    use super::*;
    use crate::domain::birth::Shichen;

    struct CannedBackend {
        response: Mutex<Option<Result<GenerateReportResponse, ReportClientError>>>,
        seen: Mutex<Vec<GenerateReportRequest>>,
    }

    impl CannedBackend {
        fn new(response: Result<GenerateReportResponse, ReportClientError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReportBackend for CannedBackend {
        async fn generate(
            &self,
            request: &GenerateReportRequest,
        ) -> Result<GenerateReportResponse, ReportClientError> {
            self.seen.lock().unwrap().push(request.clone());
            self.response
                .lock()
                .unwrap()
                .take()
                .expect("single call per submission")
        }
    }

    fn input() -> BirthInput {
        BirthInput::from_parts(1990, 5, 3, Shichen::Wu).expect("valid input")
    }

    #[tokio::test]
    async fn complete_payload_becomes_bundle() {
        let backend = CannedBackend::new(Ok(GenerateReportResponse {
            bazi_info: Some(BaziInfo {
                bazi: "庚午 庚辰 甲子 庚午".into(),
                ..BaziInfo::default()
            }),
            reports: Some(ReportSections {
                overview: Some("概览".into()),
                ..ReportSections::default()
            }),
        }));
        let client = ReportClient::new(backend.clone());

        let bundle = client.fetch(&input()).await.expect("bundle");
        assert_eq!(bundle.overview.as_deref(), Some("概览"));
        assert_eq!(bundle.ten_gods, None);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].year, "1990");
        assert_eq!(seen[0].shichen, "午时");
    }

    #[tokio::test]
    async fn incomplete_payload_is_reported_with_fixed_message() {
        let backend = CannedBackend::new(Ok(GenerateReportResponse {
            bazi_info: Some(BaziInfo::default()),
            reports: None,
        }));
        let client = ReportClient::new(backend);

        let err = client.fetch(&input()).await.expect_err("incomplete");
        assert!(matches!(err, ReportClientError::Incomplete { member: "reports" }));
        assert_eq!(err.user_message(), INCOMPLETE_REPORT_MESSAGE);
    }

    #[tokio::test]
    async fn status_failures_carry_reason_in_alert() {
        let backend = CannedBackend::new(Err(ReportClientError::Status {
            status: 502,
            reason: "Bad Gateway".into(),
            detail: None,
        }));
        let client = ReportClient::new(backend);

        let err = client.fetch(&input()).await.expect_err("status");
        assert_eq!(err.user_message(), "生成报告时出现错误：网络错误：Bad Gateway");
    }

    #[test]
    fn endpoint_joins_report_path() {
        let base = Url::parse("http://127.0.0.1:5000").expect("url");
        let backend = HttpReportBackend::new(&base, "/generate_report", Duration::from_secs(5))
            .expect("backend");
        assert_eq!(
            backend.endpoint().as_str(),
            "http://127.0.0.1:5000/generate_report"
        );
    }
}
