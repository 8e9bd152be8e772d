use std::borrow::Cow;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use dremio_common::config::TelemetryConfig;
use fastrace::collector::{Config, Reporter, SpanRecord};
use fastrace_opentelemetry::OpenTelemetryReporter;
use log::{debug, Log};
use opentelemetry::InstrumentationScope;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;

use crate::error::{TelemetryError, TelemetryResult};
use crate::loggers::composite::CompositeLogger;
use crate::loggers::span::SpanEventLogger;

enum TelemetryStatus {
    Uninitialized,
    Initialized,
    Failed,
    Finalized,
}

static TELEMETRY_STATUS: Mutex<TelemetryStatus> = Mutex::new(TelemetryStatus::Uninitialized);

pub struct ResourceOptions {
    pub kind: &'static str,
}

/// Installs the global logger and span reporter.
///
/// The OTLP span exporter is built on top of `tonic`, so this function must be
/// called from within a tokio runtime when trace export is enabled.
pub fn init_telemetry(config: &TelemetryConfig, resource: ResourceOptions) -> TelemetryResult<()> {
    let mut status = TELEMETRY_STATUS
        .lock()
        .map_err(|e| TelemetryError::internal(e.to_string()))?;

    match *status {
        TelemetryStatus::Uninitialized => {
            match init_traces(config, &resource).and_then(|()| init_logs(config)) {
                Ok(()) => {
                    debug!("telemetry initialized");
                    *status = TelemetryStatus::Initialized;
                    Ok(())
                }
                Err(e) => {
                    *status = TelemetryStatus::Failed;
                    Err(e)
                }
            }
        }
        TelemetryStatus::Initialized => {
            Err(TelemetryError::internal("telemetry already initialized"))
        }
        TelemetryStatus::Failed => Err(TelemetryError::internal(
            "telemetry failed to initialize previously",
        )),
        TelemetryStatus::Finalized => Err(TelemetryError::internal(
            "telemetry has been finalized and cannot be re-initialized",
        )),
    }
}

fn init_traces(config: &TelemetryConfig, resource: &ResourceOptions) -> TelemetryResult<()> {
    if config.export_traces {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.otlp_endpoint.clone())
            .with_protocol(Protocol::Grpc)
            .with_timeout(Duration::from_secs(config.otlp_timeout_secs))
            .build()?;
        let reporter = OpenTelemetryReporter::new(
            exporter,
            Cow::Owned(get_resource(resource)),
            get_instrumentation_scope(),
        );
        let reporter_config = Config::default()
            .report_interval(Duration::from_secs(config.traces_export_interval_secs));
        fastrace::set_reporter(reporter, reporter_config)
    } else {
        let reporter_config = Config::default().report_interval(Duration::MAX);
        fastrace::set_reporter(NoOpReporter, reporter_config)
    }
    Ok(())
}

fn init_logs(config: &TelemetryConfig) -> TelemetryResult<()> {
    let primary =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(move |buf, record| {
                let level = record.level();
                let target = record.target();
                let style = buf.default_level_style(level);
                let timestamp = buf.timestamp();
                let args = record.args();
                writeln!(buf, "[{timestamp} {style}{level}{style:#} {target}] {args}")
            })
            .build();
    let primary = Box::new(primary);
    let max_level = primary.filter();

    let mut secondary: Vec<Box<dyn Log>> = vec![];
    if config.export_traces {
        secondary.push(Box::new(SpanEventLogger));
    }

    log::set_boxed_logger(Box::new(CompositeLogger::new(primary, secondary)))
        .map_err(|e| TelemetryError::internal(e.to_string()))?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn shutdown_telemetry() {
    debug!("shutting down telemetry");
    fastrace::flush();
    if let Ok(mut status) = TELEMETRY_STATUS.lock() {
        if let TelemetryStatus::Initialized = *status {
            *status = TelemetryStatus::Finalized;
        }
    }
}

/// A reporter that drops every span.
pub struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn report(&mut self, _spans: Vec<SpanRecord>) {}
}

fn get_resource(resource: &ResourceOptions) -> Resource {
    Resource::builder()
        .with_service_name(format!("dremio.{}", resource.kind))
        .build()
}

fn get_instrumentation_scope() -> InstrumentationScope {
    InstrumentationScope::builder("dremio-provider")
        .with_version(env!("CARGO_PKG_VERSION"))
        .build()
}
