/*
 *     Copyright 2026 The Tag Gateway Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use rolling_file::*;
use std::fs;
use std::path::PathBuf;
use tag_gateway_config::gateway::{Tracing, NAME};
use tag_gateway_core::error::{ErrorType, ExternalError, OrErr};
use tag_gateway_core::Result;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{time::ChronoLocal, Layer},
    prelude::*,
    EnvFilter, Registry,
};

pub mod propagator;

pub use propagator::{Carrier, Propagator};

/// init_tracing initializes the log layers of the process, an hourly rolling file
/// in the log directory and a pretty stdout layer when verbose. The returned
/// guards flush the non blocking writers and must be kept alive.
pub fn init_tracing(
    name: &str,
    log_dir: &PathBuf,
    log_level: Level,
    log_max_files: usize,
    verbose: bool,
) -> Result<Vec<WorkerGuard>> {
    let mut guards = vec![];

    // Setup stdout layer.
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // Initialize stdout layer.
    let stdout_filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::OFF
    };
    let stdout_logging_layer = Layer::new()
        .with_writer(stdout_writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_timer(ChronoLocal::rfc_3339())
        .pretty()
        .with_filter(stdout_filter);
    guards.push(stdout_guard);

    // Setup file layer.
    fs::create_dir_all(log_dir)?;
    let rolling_appender = BasicRollingFileAppender::new(
        log_dir.join(name).with_extension("log"),
        RollingConditionBasic::new().hourly(),
        log_max_files,
    )?;

    let (rolling_writer, rolling_writer_guard) = tracing_appender::non_blocking(rolling_appender);
    let file_logging_layer = Layer::new()
        .with_writer(rolling_writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_timer(ChronoLocal::rfc_3339())
        .compact();
    guards.push(rolling_writer_guard);

    // Setup env filter for log level.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(log_level.into()));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(file_logging_layer)
        .with(stdout_logging_layer);

    tracing::subscriber::set_global_default(subscriber)
        .or_context(ErrorType::TracingError, "failed to set global subscriber")?;

    LogTracer::init().or_context(ErrorType::TracingError, "failed to init LogTracer")?;

    info!(
        "tracing initialized directory: {}, level: {}",
        log_dir.as_path().display(),
        log_level
    );

    Ok(guards)
}

/// Telemetry holds the tracer provider of the process and the propagator handed to
/// the interceptors.
pub struct Telemetry {
    provider: SdkTracerProvider,
    propagator: Propagator,
}

/// Telemetry implements the telemetry lifecycle.
impl Telemetry {
    /// propagator returns the propagator over the tracer of the process.
    pub fn propagator(&self) -> Propagator {
        self.propagator.clone()
    }

    /// shutdown flushes the pending spans and shuts the provider down.
    pub fn shutdown(&self) {
        if let Err(err) = self.provider.shutdown() {
            tracing::error!("shutdown tracer provider failed: {}", err);
        }
    }
}

/// init_tracer creates the tracer of the process. Spans are exported with otlp
/// when an endpoint is configured, otherwise they are only created and propagated.
pub fn init_tracer(config: &Tracing) -> Result<Telemetry> {
    let resource = Resource::builder()
        .with_attribute(KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            config.service_name.clone(),
        ))
        .build();

    let mut builder = SdkTracerProvider::builder().with_resource(resource);
    if let Some(endpoint) = config.endpoint.as_ref() {
        let protocol = config.protocol.as_deref().unwrap_or("grpc");
        let exporter = match protocol {
            "grpc" => SpanExporter::builder()
                .with_tonic()
                .with_endpoint(format!("http://{}", endpoint))
                .build(),
            "http" | "https" => SpanExporter::builder()
                .with_http()
                .with_endpoint(format!(
                    "{}://{}{}",
                    protocol,
                    endpoint,
                    config.path.as_deref().unwrap_or_default()
                ))
                .build(),
            _ => {
                return Err(ExternalError::new(ErrorType::TracingError)
                    .with_context(format!("unsupported tracing protocol {}", protocol))
                    .into());
            }
        }
        .or_err(ErrorType::TracingError)?;

        info!("tracing exporter initialized {}://{}", protocol, endpoint);
        builder = builder.with_batch_exporter(exporter);
    }

    let provider = builder.build();
    let propagator = Propagator::new(provider.tracer(NAME));
    Ok(Telemetry {
        provider,
        propagator,
    })
}
