use std::{
    fs,
    io::{self, Read},
    path::Path,
    process,
    sync::Arc,
};

use askama::Template;
use bazi_coach::{
    application::{
        client::{HttpReportBackend, ReportClient},
        controller::{FormController, SubmissionOutcome, UiEffect, UiSink},
        error::AppError,
        export::{self, IMAGE_FAILURE_NOTICE, RasterOptions, compose_copy_text},
        render::{render_markup, sanitize_html, to_plain_text},
        session::SessionStore,
    },
    config::{self, RenderArgs, ReportArgs, Settings},
    domain::birth::BirthForm,
    infra::{
        clipboard::CommandClipboard,
        error::InfraError,
        http::{self, HttpState},
        rasterizer::CommandRasterizer,
        telemetry,
    },
    presentation::views::{ReportCardTemplate, ReportView},
};
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(&args),
        config::Command::Report(args) => run_report(settings, *args).await,
    }
}

fn build_controller(settings: &Settings) -> Result<FormController, AppError> {
    let backend = HttpReportBackend::new(
        &settings.backend.base_url,
        &settings.backend.report_path,
        settings.backend.timeout,
    )?;
    info!(
        target = "bazi_coach::main",
        endpoint = %backend.endpoint(),
        timeout_secs = settings.backend.timeout.as_secs(),
        "report backend configured"
    );

    Ok(FormController::new(
        ReportClient::new(Arc::new(backend)),
        settings.form.min_year,
        settings.export.timezone,
    ))
}

fn raster_options(settings: &Settings) -> RasterOptions {
    RasterOptions {
        scale: settings.export.scale.get(),
        background: settings.export.background.clone(),
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let controller = build_controller(&settings)?;
    let rasterizer = CommandRasterizer::new(settings.export.rasterizer_cli_path.clone());
    info!(
        target = "bazi_coach::main",
        rasterizer = %rasterizer.cli_path().display(),
        "image export configured"
    );
    let state = HttpState {
        controller: Arc::new(controller),
        sessions: SessionStore::new(
            settings.sessions.ttl,
            settings.sessions.capacity.get() as usize,
        ),
        rasterizer: Arc::new(rasterizer),
        raster: raster_options(&settings),
        timezone: settings.export.timezone,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "bazi_coach::main",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "bazi_coach::main",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "bazi_coach::main", "shutdown requested");
}

fn run_render(args: &RenderArgs) -> Result<(), AppError> {
    let source = read_source(&args.file).map_err(InfraError::from)?;
    let html = render_markup(&source);

    let output = if args.text {
        to_plain_text(&html)
    } else if args.sanitize {
        sanitize_html(&html)
    } else {
        html
    };
    println!("{output}");
    Ok(())
}

fn read_source(path: &Path) -> io::Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

/// Prints controller effects for a terminal user.
struct ConsoleSink;

impl UiSink for ConsoleSink {
    fn emit(&self, effect: UiEffect) {
        match effect {
            UiEffect::ValidationFailed(errors) => {
                for error in errors.errors() {
                    eprintln!("{}: {}", error.field.as_str(), error.message);
                }
            }
            UiEffect::LoadingVisible(true) => eprintln!("正在生成报告……"),
            UiEffect::Alert(message) => eprintln!("{message}"),
            UiEffect::SubmitEnabled(_)
            | UiEffect::LoadingVisible(false)
            | UiEffect::ResultVisible(_)
            | UiEffect::ShowReport(_) => {}
        }
    }
}

async fn run_report(settings: Settings, args: ReportArgs) -> Result<(), AppError> {
    let controller = build_controller(&settings)?;
    let form = BirthForm::new(&args.year, &args.month, &args.day, &args.shichen);

    let report = match controller.submit(&form, &ConsoleSink).await {
        SubmissionOutcome::Rendered(report) => report,
        SubmissionOutcome::Invalid(errors) => return Err(AppError::validation(errors.summary())),
        SubmissionOutcome::Failed(err) => return Err(err.into()),
    };

    let now = OffsetDateTime::now_utc();
    let text = compose_copy_text(&report, now, settings.export.timezone);
    let document = ReportCardTemplate::new(
        ReportView::from_report(&report),
        settings.export.background.clone(),
    )
    .render()
    .map_err(|err| AppError::unexpected(format!("failed to render report card: {err}")))?;

    match args.output.as_ref() {
        Some(path) => {
            tokio::fs::write(path, &document)
                .await
                .map_err(InfraError::from)?;
            eprintln!("{}", path.display());
        }
        None => println!("{text}"),
    }

    if args.copy {
        let clipboard = CommandClipboard::new(settings.export.clipboard_command.clone());
        if let Some(notice) = export::copy_report(&clipboard, &text).await {
            eprintln!("{notice}");
        }
    }

    if let Some(dir) = args.image.as_ref() {
        let rasterizer = CommandRasterizer::new(settings.export.rasterizer_cli_path.clone());
        let image =
            match export::export_image(&rasterizer, &document, &raster_options(&settings), now)
                .await
            {
                Ok(image) => image,
                Err(err) => {
                    eprintln!("{IMAGE_FAILURE_NOTICE}");
                    return Err(err.into());
                }
            };
        let path = dir.join(&image.file_name);
        tokio::fs::write(&path, &image.png)
            .await
            .map_err(InfraError::from)?;
        eprintln!("{}", path.display());
    }

    Ok(())
}
