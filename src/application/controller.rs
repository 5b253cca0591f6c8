//! Form controller: validates a submission, drives the report client and tells
//! the view what to show.
//!
//! The controller never touches the page directly. Every visible change is a
//! [`UiEffect`] handed to a [`UiSink`]; the web surface turns those into datastar
//! patches, the command line prints them and tests record them.

use std::sync::Arc;

use chrono_tz::Tz;
use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::client::{ReportClient, ReportClientError};
use crate::application::report::RenderedReport;
use crate::domain::birth::{BirthForm, FormBounds, ValidationErrors};
use crate::util::timezone::localized_year;

const METRIC_SUBMISSIONS_TOTAL: &str = "bazi_submissions_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    ValidationFailed(ValidationErrors),
    SubmitEnabled(bool),
    LoadingVisible(bool),
    ResultVisible(bool),
    ShowReport(Arc<RenderedReport>),
    Alert(String),
}

pub trait UiSink: Send + Sync {
    fn emit(&self, effect: UiEffect);
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Invalid(ValidationErrors),
    Rendered(Arc<RenderedReport>),
    Failed(ReportClientError),
}

impl SubmissionOutcome {
    fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Invalid(_) => "invalid",
            SubmissionOutcome::Rendered(_) => "rendered",
            SubmissionOutcome::Failed(_) => "failed",
        }
    }
}

/// Holds the busy state for the duration of a request.
///
/// Dropping the guard re-enables the submit control and hides the loading
/// indicator, whether the request finished or its future was abandoned.
struct BusyGuard<'a> {
    sink: &'a dyn UiSink,
}

impl<'a> BusyGuard<'a> {
    fn engage(sink: &'a dyn UiSink) -> Self {
        sink.emit(UiEffect::SubmitEnabled(false));
        sink.emit(UiEffect::LoadingVisible(true));
        Self { sink }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.sink.emit(UiEffect::SubmitEnabled(true));
        self.sink.emit(UiEffect::LoadingVisible(false));
    }
}

#[derive(Clone)]
pub struct FormController {
    client: ReportClient,
    min_year: i32,
    timezone: Tz,
}

impl FormController {
    pub fn new(client: ReportClient, min_year: i32, timezone: Tz) -> Self {
        Self {
            client,
            min_year,
            timezone,
        }
    }

    /// Selectable years, ending at the current year in the configured timezone.
    pub fn bounds(&self) -> FormBounds {
        let max_year = localized_year(OffsetDateTime::now_utc(), self.timezone);
        FormBounds::new(self.min_year, max_year.max(self.min_year))
    }

    pub async fn submit(&self, form: &BirthForm, sink: &dyn UiSink) -> SubmissionOutcome {
        let outcome = self.run(form, sink).await;
        counter!(METRIC_SUBMISSIONS_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn run(&self, form: &BirthForm, sink: &dyn UiSink) -> SubmissionOutcome {
        let input = match form.validate(&self.bounds()) {
            Ok(input) => input,
            Err(errors) => {
                debug!(
                    target = "bazi_coach::application::controller",
                    op = "submit",
                    result = "invalid",
                    errors = %errors.summary(),
                    "submission rejected by validation"
                );
                sink.emit(UiEffect::ValidationFailed(errors.clone()));
                return SubmissionOutcome::Invalid(errors);
            }
        };

        let _busy = BusyGuard::engage(sink);
        sink.emit(UiEffect::ResultVisible(false));

        match self.client.fetch(&input).await {
            Ok(bundle) => {
                let report = Arc::new(RenderedReport::render(bundle));
                sink.emit(UiEffect::ShowReport(Arc::clone(&report)));
                sink.emit(UiEffect::ResultVisible(true));
                SubmissionOutcome::Rendered(report)
            }
            Err(err) => {
                sink.emit(UiEffect::Alert(err.user_message()));
                SubmissionOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use bazi_api_types::{BaziInfo, GenerateReportRequest, GenerateReportResponse, ReportSections};

    use super::*;
    use crate::application::client::ReportBackend;
    use crate::domain::birth::BirthField;

    #[derive(Default)]
    struct RecordingSink {
        effects: Mutex<Vec<UiEffect>>,
    }

    impl RecordingSink {
        fn effects(&self) -> Vec<UiEffect> {
            self.effects.lock().unwrap().clone()
        }
    }

    impl UiSink for RecordingSink {
        fn emit(&self, effect: UiEffect) {
            self.effects.lock().unwrap().push(effect);
        }
    }

    enum Reply {
        Complete,
        Fail,
        Hang,
    }

    struct ScriptedBackend {
        reply: Reply,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ReportBackend for ScriptedBackend {
        async fn generate(
            &self,
            _request: &GenerateReportRequest,
        ) -> Result<GenerateReportResponse, ReportClientError> {
            *self.calls.lock().unwrap() += 1;
            match self.reply {
                Reply::Complete => Ok(GenerateReportResponse {
                    bazi_info: Some(BaziInfo::default()),
                    reports: Some(ReportSections {
                        overview: Some("**甲木**".into()),
                        ten_gods: Some("十神".into()),
                        action_guide: Some("行动".into()),
                    }),
                }),
                Reply::Fail => Err(ReportClientError::transport("connection refused")),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    fn controller(reply: Reply) -> (FormController, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend {
            reply,
            calls: Mutex::new(0),
        });
        let client = ReportClient::new(backend.clone());
        (
            FormController::new(client, 1950, chrono_tz::Asia::Shanghai),
            backend,
        )
    }

    fn valid_form() -> BirthForm {
        BirthForm::new("1990", "5", "3", "午时")
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_backend() {
        let (controller, backend) = controller(Reply::Complete);
        let sink = RecordingSink::default();

        let outcome = controller
            .submit(&BirthForm::new("1990", "", "3", "午时"), &sink)
            .await;

        let SubmissionOutcome::Invalid(errors) = outcome else {
            panic!("expected validation failure");
        };
        assert!(errors.has(BirthField::Month));
        assert_eq!(*backend.calls.lock().unwrap(), 0);
        assert_eq!(sink.effects(), vec![UiEffect::ValidationFailed(errors)]);
    }

    #[tokio::test]
    async fn success_shows_report_then_clears_busy_state() {
        let (controller, backend) = controller(Reply::Complete);
        let sink = RecordingSink::default();

        let outcome = controller.submit(&valid_form(), &sink).await;
        let SubmissionOutcome::Rendered(report) = outcome else {
            panic!("expected rendered report");
        };
        assert_eq!(report.sections[0].html, "<p><strong>甲木</strong></p>");
        assert_eq!(*backend.calls.lock().unwrap(), 1);

        assert_eq!(
            sink.effects(),
            vec![
                UiEffect::SubmitEnabled(false),
                UiEffect::LoadingVisible(true),
                UiEffect::ResultVisible(false),
                UiEffect::ShowReport(report),
                UiEffect::ResultVisible(true),
                UiEffect::SubmitEnabled(true),
                UiEffect::LoadingVisible(false),
            ]
        );
    }

    #[tokio::test]
    async fn failure_alerts_and_clears_busy_state() {
        let (controller, _) = controller(Reply::Fail);
        let sink = RecordingSink::default();

        let outcome = controller.submit(&valid_form(), &sink).await;
        assert!(matches!(outcome, SubmissionOutcome::Failed(_)));

        assert_eq!(
            sink.effects(),
            vec![
                UiEffect::SubmitEnabled(false),
                UiEffect::LoadingVisible(true),
                UiEffect::ResultVisible(false),
                UiEffect::Alert("生成报告时出现错误：connection refused".into()),
                UiEffect::SubmitEnabled(true),
                UiEffect::LoadingVisible(false),
            ]
        );
    }

    #[tokio::test]
    async fn abandoned_submission_still_clears_busy_state() {
        let (controller, _) = controller(Reply::Hang);
        let sink = RecordingSink::default();

        let result =
            tokio::time::timeout(Duration::from_millis(20), controller.submit(&valid_form(), &sink))
                .await;
        assert!(result.is_err(), "backend never answers");

        let effects = sink.effects();
        assert_eq!(
            &effects[effects.len() - 2..],
            &[UiEffect::SubmitEnabled(true), UiEffect::LoadingVisible(false)]
        );
    }

    #[test]
    fn bounds_start_at_configured_year() {
        let (controller, _) = controller(Reply::Complete);
        let bounds = controller.bounds();
        assert_eq!(*bounds.years().start(), 1950);
        assert!(*bounds.years().end() >= 2024);
    }
}
