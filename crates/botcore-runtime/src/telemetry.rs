//! Logging and span export for botcore processes.
//!
//! [`init_tracing`] reads a [`TelemetryConfig`] from the environment and
//! installs the global subscriber: a console formatter, plus an OTLP span
//! exporter when a collector is configured.  The control loop's per-tick
//! spans (`arbiter.tick`, `queue.tick`) are what ends up in the collector.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `BOTCORE_LOG_FORMAT` | `compact` (default) or `json`. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector URL; enables span export. |
//!
//! ```rust,no_run
//! let _guard = botcore_runtime::telemetry::init_tracing("botcore");
//! ```

use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected compact or json)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
            otlp_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// Read the variables listed in the module docs.  An unknown log format
    /// falls back to compact.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let format = match lookup("BOTCORE_LOG_FORMAT").map(|v| v.parse::<LogFormat>()) {
            Some(Ok(format)) => format,
            Some(Err(e)) => {
                eprintln!("[botcore] {e}");
                defaults.format
            }
            None => defaults.format,
        };
        Self {
            filter: lookup("RUST_LOG").unwrap_or(defaults.filter),
            format,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Install the global subscriber described by the environment.
///
/// Hold the returned guard until the process exits so buffered spans are
/// flushed.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(service_name, &TelemetryConfig::from_env())
}

pub fn init_with(service_name: &str, config: &TelemetryConfig) -> TracerProviderGuard {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|e| {
        eprintln!("[botcore] bad log filter '{}': {e}", config.filter);
        EnvFilter::new("info")
    });
    let console = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let provider = config
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| span_exporter(service_name, endpoint));
    let spans = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("botcore")));

    if let Err(e) = tracing_subscriber::registry()
        .with(console)
        .with(spans)
        .with(filter)
        .try_init()
    {
        eprintln!("[botcore] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts the span exporter down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[botcore] span exporter shutdown failed: {e}");
        }
    }
}

fn span_exporter(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[botcore] OTLP exporter for {endpoint} failed: {e}"))
        .ok()?;

    // Simple export: tracing starts before the CLI builds its runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> TelemetryConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        TelemetryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_is_compact_info_without_export() {
        assert_eq!(config_from(&[]), TelemetryConfig::default());
    }

    #[test]
    fn variables_are_read() {
        let config = config_from(&[
            ("RUST_LOG", "botcore_runtime=debug"),
            ("BOTCORE_LOG_FORMAT", "JSON"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4318"),
        ]);
        assert_eq!(config.filter, "botcore_runtime=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://localhost:4318"));
    }

    #[test]
    fn unknown_format_and_blank_endpoint_fall_back() {
        let config = config_from(&[("BOTCORE_LOG_FORMAT", "xml"), ("OTEL_EXPORTER_OTLP_ENDPOINT", " ")]);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.otlp_endpoint.is_none());
        assert!("xml".parse::<LogFormat>().unwrap_err().contains("xml"));
    }

    #[test]
    fn guard_without_exporter_drops_quietly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
