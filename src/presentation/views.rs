use crate::application::error::{ErrorReport, HttpError};
use crate::application::render::sanitize_html;
use crate::application::report::RenderedReport;
use crate::domain::birth::{BirthField, DayOptions, FormBounds, Shichen, ValidationErrors};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Stylesheet inlined into standalone report documents so they render without the server.
pub const REPORT_STYLES: &str = include_str!("../../static/app.css");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let view = ErrorPageView::not_found();
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct ShichenOptionView {
    pub value: &'static str,
    pub label: String,
}

#[derive(Clone)]
pub struct DayOptionView {
    pub value: u8,
    pub label: String,
    pub selected: bool,
}

/// The day selector: a disabled placeholder followed by the valid days.
#[derive(Clone)]
pub struct DaySelectView {
    pub placeholder_selected: bool,
    pub options: Vec<DayOptionView>,
}

impl From<&DayOptions> for DaySelectView {
    fn from(days: &DayOptions) -> Self {
        Self {
            placeholder_selected: days.placeholder_selected(),
            options: days
                .options
                .iter()
                .map(|option| DayOptionView {
                    value: option.value,
                    label: option.label(),
                    selected: option.selected,
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct FormPageView {
    pub years: Vec<i32>,
    pub months: Vec<u8>,
    pub shichen: Vec<ShichenOptionView>,
}

impl FormPageView {
    pub fn new(bounds: &FormBounds) -> Self {
        Self {
            years: bounds.years().collect(),
            months: (1..=12).collect(),
            shichen: Shichen::ALL
                .iter()
                .map(|slot| ShichenOptionView {
                    value: slot.name(),
                    label: format!("{} ({})", slot.name(), slot.range()),
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct FieldFeedbackView {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Clone, Default)]
pub struct FormFeedbackView {
    pub entries: Vec<FieldFeedbackView>,
}

impl FormFeedbackView {
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&ValidationErrors> for FormFeedbackView {
    fn from(errors: &ValidationErrors) -> Self {
        let order = [
            BirthField::Year,
            BirthField::Month,
            BirthField::Day,
            BirthField::Shichen,
        ];
        let entries = order
            .into_iter()
            .flat_map(|field| {
                errors
                    .errors()
                    .iter()
                    .filter(move |error| error.field == field)
            })
            .map(|error| FieldFeedbackView {
                field: error.field.as_str(),
                message: error.message,
            })
            .collect();
        Self { entries }
    }
}

#[derive(Clone)]
pub struct PillarView {
    pub label: &'static str,
    pub gan: String,
    pub gan_class: &'static str,
    pub zhi: String,
    pub zhi_class: &'static str,
}

#[derive(Clone)]
pub struct SectionView {
    pub element_id: &'static str,
    pub title: &'static str,
    /// Sanitized section markup.
    pub html: String,
}

/// Everything shown in the result panel.
#[derive(Clone)]
pub struct ReportView {
    pub summary: String,
    pub solar_year: String,
    pub solar_month: String,
    pub solar_day: String,
    pub solar_time: String,
    pub lunar_year: String,
    pub lunar_month: String,
    pub lunar_day: String,
    pub lunar_time: String,
    pub pillars: Vec<PillarView>,
    pub sections: Vec<SectionView>,
}

impl ReportView {
    pub fn from_report(report: &RenderedReport) -> Self {
        let bundle = &report.bundle;
        let chart = &bundle.chart;
        let (solar_year, solar_month, solar_day, solar_time) = match bundle.solar_parts() {
            Some(parts) => (parts.year, parts.month, parts.day, parts.hour),
            None => Default::default(),
        };

        Self {
            summary: bundle.summary_line(),
            solar_year,
            solar_month,
            solar_day,
            solar_time,
            lunar_year: chart.lunar_year.clone(),
            lunar_month: chart.lunar_month.clone(),
            lunar_day: chart.lunar_day.clone(),
            lunar_time: chart.time_zhi.clone(),
            pillars: bundle
                .pillars()
                .into_iter()
                .map(|pillar| PillarView {
                    label: pillar.label,
                    gan_class: pillar.gan_class(),
                    zhi_class: pillar.zhi_class(),
                    gan: pillar.gan,
                    zhi: pillar.zhi,
                })
                .collect(),
            sections: report
                .sections
                .iter()
                .map(|section| SectionView {
                    element_id: section.element_id(),
                    title: section.title(),
                    html: sanitize_html(&section.html),
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct ErrorPageView {
    pub status: u16,
    pub title: &'static str,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND.as_u16(),
            title: "页面不存在",
            message: "您访问的页面不存在。".to_string(),
        }
    }

    pub fn no_report() -> Self {
        Self {
            status: StatusCode::NOT_FOUND.as_u16(),
            title: "暂无报告",
            message: "请先填写出生信息并生成报告。".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: FormPageView,
    pub days: DaySelectView,
}

#[derive(Template)]
#[template(path = "partials/day_select.html")]
pub struct DaySelectTemplate {
    pub days: DaySelectView,
}

#[derive(Template)]
#[template(path = "partials/form_feedback.html")]
pub struct FormFeedbackTemplate {
    pub feedback: FormFeedbackView,
}

#[derive(Template)]
#[template(path = "partials/report_content.html")]
pub struct ReportContentTemplate {
    pub report: ReportView,
}

/// Standalone document of the report card, used for viewing and rasterizing.
#[derive(Template)]
#[template(path = "report_card.html")]
pub struct ReportCardTemplate {
    pub report: ReportView,
    pub styles: &'static str,
    pub background: String,
}

impl ReportCardTemplate {
    pub fn new(report: ReportView, background: impl Into<String>) -> Self {
        Self {
            report,
            styles: REPORT_STYLES,
            background: background.into(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: ErrorPageView,
}
