use std::sync::Arc;

use askama::Template;
use axum::{
    Form, Router,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, COOKIE, SET_COOKIE},
    },
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono_tz::Tz;
use datastar::prelude::ElementPatchMode;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::error;

use crate::{
    application::{
        client::REPORT_FAILURE_PREFIX,
        controller::{FormController, SubmissionOutcome, UiEffect, UiSink},
        error::{ErrorReport, HttpError},
        export::{
            self, ExportError, IMAGE_FAILURE_NOTICE, ImageExport, RasterOptions, Rasterizer,
            compose_copy_text,
        },
        report::RenderedReport,
        session::{SessionId, SessionStore},
        stream::{EventSender, StreamBuilder, js_string, live_stream},
    },
    domain::birth::{BirthForm, DayOptions, parse_selection},
    infra::{assets::serve_static, clipboard::ScriptClipboard},
    presentation::views::{
        DaySelectTemplate, DaySelectView, ErrorPageView, ErrorTemplate, FormFeedbackTemplate,
        FormFeedbackView, FormPageView, IndexTemplate, ReportCardTemplate, ReportContentTemplate,
        ReportView, render_not_found_response, render_template, render_template_response,
    },
};

use super::{
    health,
    middleware::{log_responses, set_request_context},
};

const SESSION_COOKIE: &str = "bazi_session";
const SCROLL_TO_REPORT: &str =
    "document.getElementById('reportSection')?.scrollIntoView({ behavior: 'smooth' })";
const RENDER_FAILURE_DETAIL: &str = "页面渲染失败";

#[derive(Clone)]
pub struct HttpState {
    pub controller: Arc<FormController>,
    pub sessions: SessionStore,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub raster: RasterOptions,
    pub timezone: Tz,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ui/days", get(day_options))
        .route("/report", post(submit_report))
        .route("/report/copy", get(copy_report))
        .route("/report/image", get(image_report))
        .route("/report/view", get(view_report))
        .route("/_health", get(health))
        .route("/static/{*path}", get(serve_static))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let (session, fresh) = resolve_session(&headers);
    let template = IndexTemplate {
        view: FormPageView::new(&state.controller.bounds()),
        days: DaySelectView::from(&DayOptions::unconstrained(None)),
    };

    let mut response = render_template_response(template, StatusCode::OK);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if fresh {
        attach_session_cookie(&mut response, session);
    }
    response
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DaySelection {
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
}

/// Rebuild the day selector after the year or month changed.
async fn day_options(Query(selection): Query<DaySelection>) -> Result<Response, HttpError> {
    let previous = parse_selection::<u8>(selection.day.as_deref());
    let days = DayOptions::for_selection(
        parse_selection(selection.year.as_deref()),
        parse_selection(selection.month.as_deref()),
        previous,
    )
    .unwrap_or_else(|| DayOptions::unconstrained(previous));

    let Html(html) = render_template(DaySelectTemplate {
        days: DaySelectView::from(&days),
    })?;

    let mut stream = StreamBuilder::new();
    stream.push_patch(html, "#day", ElementPatchMode::Outer);
    Ok(stream.into_response())
}

/// Run one submission and stream its UI effects back to the page.
async fn submit_report(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Form(form): Form<BirthForm>,
) -> Response {
    let (session, fresh) = resolve_session(&headers);
    let (sender, mut response) = live_stream();

    tokio::spawn(async move {
        let sink = DatastarSink::new(sender);
        sink.clear_feedback();
        if let SubmissionOutcome::Rendered(report) = state.controller.submit(&form, &sink).await {
            state.sessions.put(session, report);
        }
    });

    if fresh {
        attach_session_cookie(&mut response, session);
    }
    response
}

async fn copy_report(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let report = current_report(&state, &headers)?;
    let text = compose_copy_text(&report, OffsetDateTime::now_utc(), state.timezone);

    let (sender, response) = live_stream();
    let clipboard = ScriptClipboard::new(sender.clone());
    if let Some(notice) = export::copy_report(&clipboard, &text).await {
        sender.alert(notice);
    }
    Ok(response)
}

async fn image_report(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let report = current_report(&state, &headers)?;
    let Html(document) = render_template(ReportCardTemplate::new(
        ReportView::from_report(&report),
        state.raster.background.clone(),
    ))?;

    let mut stream = StreamBuilder::new();
    match export::export_image(
        state.rasterizer.as_ref(),
        &document,
        &state.raster,
        OffsetDateTime::now_utc(),
    )
    .await
    {
        Ok(image) => stream.push_script(download_script(&image)),
        Err(_) => stream.push_alert(IMAGE_FAILURE_NOTICE),
    };
    Ok(stream.into_response())
}

async fn view_report(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    match current_report(&state, &headers) {
        Ok(report) => {
            let template = ReportCardTemplate::new(
                ReportView::from_report(&report),
                state.raster.background.clone(),
            );
            let mut response = render_template_response(template, StatusCode::OK);
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(err) => {
            let mut response = render_template_response(
                ErrorTemplate {
                    view: ErrorPageView::no_report(),
                },
                StatusCode::NOT_FOUND,
            );
            ErrorReport::from_error(
                "infra::http::public::view_report",
                StatusCode::NOT_FOUND,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn fallback() -> Response {
    render_not_found_response()
}

fn current_report(
    state: &HttpState,
    headers: &HeaderMap,
) -> Result<Arc<RenderedReport>, ExportError> {
    session_from_headers(headers)
        .and_then(|session| state.sessions.get(session))
        .ok_or(ExportError::NoReport)
}

/// Script that saves the PNG under its export file name.
fn download_script(image: &ImageExport) -> String {
    format!(
        "(() => {{ const link = document.createElement('a'); link.download = {}; link.href = {}; document.body.appendChild(link); link.click(); link.remove(); }})()",
        js_string(&image.file_name),
        js_string(&image.data_url())
    )
}

fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionId::parse(value))
}

/// The caller's session, or a new one that still needs its cookie set.
fn resolve_session(headers: &HeaderMap) -> (SessionId, bool) {
    match session_from_headers(headers) {
        Some(session) => (session, false),
        None => (SessionId::generate(), true),
    }
}

fn attach_session_cookie(response: &mut Response, session: SessionId) {
    let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// Turns controller effects into datastar events on an open stream.
struct DatastarSink {
    events: EventSender,
}

impl DatastarSink {
    fn new(events: EventSender) -> Self {
        Self { events }
    }

    fn clear_feedback(&self) {
        self.events.signals(r#"{"validated": false}"#);
        self.patch(
            FormFeedbackTemplate {
                feedback: FormFeedbackView::cleared(),
            },
            "#formFeedback",
        );
    }

    fn signal(&self, name: &str, value: bool) {
        let mut payload = Map::new();
        payload.insert(name.to_string(), Value::Bool(value));
        self.events.signals(&Value::Object(payload).to_string());
    }

    fn patch<T: Template>(&self, template: T, selector: &str) {
        match template.render() {
            Ok(html) => self.events.patch(html, selector, ElementPatchMode::Outer),
            Err(err) => {
                error!(
                    target = "bazi_coach::http::public",
                    op = "patch",
                    result = "error",
                    selector,
                    error = %err,
                    "failed to render partial"
                );
                self.events
                    .alert(&format!("{REPORT_FAILURE_PREFIX}{RENDER_FAILURE_DETAIL}"));
            }
        }
    }
}

impl UiSink for DatastarSink {
    fn emit(&self, effect: UiEffect) {
        match effect {
            UiEffect::ValidationFailed(errors) => {
                self.signal("validated", true);
                self.patch(
                    FormFeedbackTemplate {
                        feedback: FormFeedbackView::from(&errors),
                    },
                    "#formFeedback",
                );
            }
            UiEffect::SubmitEnabled(enabled) => self.signal("submitting", !enabled),
            UiEffect::LoadingVisible(visible) => self.signal("loading", visible),
            UiEffect::ResultVisible(visible) => {
                self.signal("resultVisible", visible);
                if visible {
                    self.events.script(SCROLL_TO_REPORT.to_string());
                }
            }
            UiEffect::ShowReport(report) => self.patch(
                ReportContentTemplate {
                    report: ReportView::from_report(&report),
                },
                "#reportContent",
            ),
            UiEffect::Alert(message) => self.events.alert(&message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_found_among_others() {
        let session = SessionId::generate();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={session}; x=1"))
                .expect("header"),
        );

        assert_eq!(session_from_headers(&headers), Some(session));
        assert_eq!(resolve_session(&headers), (session, false));
    }

    #[test]
    fn malformed_session_cookie_starts_a_new_session() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("bazi_session=garbage"));

        assert_eq!(session_from_headers(&headers), None);
        let (_, fresh) = resolve_session(&headers);
        assert!(fresh);
    }

    #[test]
    fn download_script_names_the_file() {
        let script = download_script(&ImageExport {
            file_name: "命理报告_2026-10-19.png".to_string(),
            png: b"\x89PNG\r\n\x1a\n".to_vec(),
        });
        assert!(script.contains(r#"link.download = "命理报告_2026-10-19.png""#));
        assert!(script.contains(r#"link.href = "data:image/png;base64,iVBORw0KGgo=""#));
    }
}
