//! Logging, tracing and metrics setup
//!
//! Every client map log line carries the span it was emitted in, so messages
//! about one cluster can be found by its `key` field. With an OTLP endpoint
//! configured, spans and the client map metrics are exported as well; the
//! returned [`TelemetryGuard`] flushes them when the process ends. Logs go to
//! stderr so command output on stdout stays machine-readable.

use std::fmt;
use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str =
    "info,garden_clientmap=debug,kube=info,tower=warn,hyper=warn";

/// Service name reported when `OTEL_SERVICE_NAME` is unset
pub const DEFAULT_SERVICE_NAME: &str = "garden-clientmap";

/// Variable selecting the log format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "GARDEN_CLIENTMAP_LOG_FORMAT";

/// Errors raised while installing telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An OTLP exporter could not be created
    #[error("failed to create OTLP {signal} exporter: {message}")]
    Exporter {
        /// Signal the exporter was for ("trace" or "metrics")
        signal: &'static str,
        /// Underlying error
        message: String,
    },

    /// A global subscriber is already installed
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),

    /// Unknown log format name
    #[error("unknown log format {0:?}, expected json or text")]
    LogFormat(String),
}

/// Shape of emitted log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log collectors
    #[default]
    Json,
    /// Human-readable lines, for terminals
    Text,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(TelemetryError::LogFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Text => "text",
        })
    }
}

/// Telemetry settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to spans and metrics
    pub service_name: String,
    /// OTLP gRPC endpoint (e.g. "http://otel-collector:4317"); None logs only
    pub otlp_endpoint: Option<String>,
    /// Log line format
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            log_format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Read `OTEL_SERVICE_NAME`, `OTEL_EXPORTER_OTLP_ENDPOINT` and
    /// `GARDEN_CLIENTMAP_LOG_FORMAT`
    pub fn from_env() -> Result<Self, TelemetryError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Ok(Self {
            service_name: var("OTEL_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.into()),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            log_format: var(LOG_FORMAT_ENV)
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// Keeps exporters alive; flushes and shuts them down on drop
#[must_use = "dropping the guard shuts down telemetry export"]
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// True when spans and metrics are exported over OTLP
    pub fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // The subscriber may already be gone, so report on stderr
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to flush spans: {e}");
            }
        }
        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to flush metrics: {e}");
            }
        }
    }
}

/// Install the global subscriber, propagator and (optionally) OTLP exporters
///
/// Must run inside a tokio runtime when an OTLP endpoint is set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let mut guard = TelemetryGuard::default();
    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let resource = resource(&config.service_name);
            let meter_provider = meter_provider(endpoint, resource.clone())?;
            global::set_meter_provider(meter_provider.clone());
            guard.meter_provider = Some(meter_provider);

            let tracer_provider = tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(tracer_provider.clone());
            let tracer = tracer_provider.tracer(config.service_name.clone());
            guard.tracer_provider = Some(tracer_provider);

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = (config.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
    });
    let text = (config.log_format == LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    Ok(guard)
}

/// Resource describing this process, with pod details from the downward API
fn resource(service_name: &str) -> Resource {
    let mut attributes = vec![
        KeyValue::new(SERVICE_NAME, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];
    for (var, attribute) in [
        ("POD_NAME", "k8s.pod.name"),
        ("POD_NAMESPACE", "k8s.namespace.name"),
    ] {
        if let Ok(value) = std::env::var(var) {
            attributes.push(KeyValue::new(attribute, value));
        }
    }
    Resource::new(attributes)
}

fn tracer_provider(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "trace",
            message: e.to_string(),
        })?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "metrics",
            message: e.to_string(),
        })?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build())
}
