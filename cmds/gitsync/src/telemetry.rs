//! Tracing and OpenTelemetry setup.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Service name reported when `OTEL_SERVICE_NAME` is unset.
const SERVICE_NAME: &str = "gitsync";

/// Keeps the tracer provider alive; pending spans are flushed when dropped.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		if let Some(provider) = self.tracer_provider.take() {
			if let Err(e) = provider.shutdown() {
				eprintln!("failed to flush traces: {e}");
			}
		}
	}
}

/// Whether an OTLP endpoint is configured through the standard env vars.
fn otel_export_enabled() -> bool {
	std::env::var_os(opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT).is_some()
		|| std::env::var_os(opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT).is_some()
}

/// Build the level filter: an explicit level wins, then `RUST_LOG`, then info.
fn filter(log_level: Option<Level>) -> EnvFilter {
	match log_level {
		Some(level) => EnvFilter::new(level.as_str()),
		None => EnvFilter::builder()
			.with_default_directive(Level::INFO.into())
			.from_env_lossy(),
	}
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr, pretty-printed on a terminal and as JSON lines
/// otherwise, so stdout carries only command output. Spans are additionally
/// exported over OTLP when an endpoint is configured; the exporter is built
/// on the ambient tokio runtime.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let fmt_layer = if std::io::stderr().is_terminal() {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.pretty()
			.boxed()
	} else {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.json()
			.boxed()
	};

	let registry = tracing_subscriber::registry()
		.with(filter(log_level))
		.with(fmt_layer);

	if !otel_export_enabled() {
		registry.init();
		return Ok(TelemetryGuard {
			tracer_provider: None,
		});
	}

	let tracer_provider = otlp_tracer_provider()?;
	let otel_layer = tracing_opentelemetry::layer()
		.with_error_records_to_exceptions(true)
		.with_tracer(tracer_provider.tracer(SERVICE_NAME));
	opentelemetry::global::set_tracer_provider(tracer_provider.clone());

	registry.with(otel_layer).init();

	Ok(TelemetryGuard {
		tracer_provider: Some(tracer_provider),
	})
}

fn otlp_tracer_provider() -> Result<SdkTracerProvider> {
	// Resource::builder() already honours OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES
	let mut resource = Resource::builder();
	if std::env::var_os("OTEL_SERVICE_NAME").is_none() {
		resource = resource.with_service_name(SERVICE_NAME);
	}

	let protocol = std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL);
	let exporter = match protocol
		.as_deref()
		.unwrap_or(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT)
	{
		"grpc" => opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.build(),
		_ => opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.build(),
	}
	.context("building OTLP span exporter")?;

	Ok(SdkTracerProvider::builder()
		.with_resource(resource.build())
		.with_batch_exporter(exporter)
		.build())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_explicit_level_wins() {
		let filter = filter(Some(Level::DEBUG)).to_string();
		assert!(filter.eq_ignore_ascii_case("debug"), "unexpected filter {filter}");
	}
}
