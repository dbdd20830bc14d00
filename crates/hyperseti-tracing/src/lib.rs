//! Shared tracing configuration for the hyperseti workspace.
//!
//! Binaries, integration tests and notebooks-turned-scripts all install their
//! `tracing` subscriber through this crate so the log surface (filters, output
//! format, redaction) stays the same everywhere. The kernel adapters in
//! `hyperseti-core` only ever emit events; choosing where they go happens here.

pub mod performance;

use std::collections::HashSet;
use std::env;
use std::error::Error;
use std::fmt::{self, Write as _};
use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Configuration describing how the shared tracing subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Optional tracing directives (e.g. `hyperseti_core=debug,info`). When
    /// absent the crate falls back to `RUST_LOG` and finally to
    /// [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    /// Fallback directive used when neither `directives` nor `RUST_LOG`
    /// resolve to a valid filter.
    pub default_directive: String,
    /// Controls whether event targets (module paths) appear in output.
    pub include_targets: bool,
    /// Controls ANSI formatting. Disable for CI logs that strip colour codes.
    pub ansi: bool,
    /// Span lifecycle events to emit. Defaults to [`FmtSpan::NONE`].
    pub span_events: FmtSpan,
    /// Output format for the formatter layer.
    pub output: TracingOutput,
    /// Field names whose values are replaced before formatting.
    pub redacted_fields: Vec<String>,
    /// Replacement text used when redacting field values.
    pub redaction_text: String,
    /// Emit `data_transfer` and kernel timing events. When false,
    /// [`performance`] helpers return without recording anything.
    pub enable_performance_tracing: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, ANSI-coloured output for interactive runs.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            redacted_fields: Vec::new(),
            redaction_text: "***REDACTED***".to_string(),
            enable_performance_tracing: cfg!(debug_assertions),
        }
    }

    /// JSON output without ANSI codes, for CI and log collection.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            ..Self::for_local()
        }
    }

    /// JSON output with span lifecycle events and debug-level transfer
    /// accounting for the adapter crate.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("hyperseti_core=debug,hyperseti_tracing=debug".to_string()),
            ansi: false,
            span_events: FmtSpan::ENTER | FmtSpan::EXIT | FmtSpan::CLOSE,
            output: TracingOutput::Json,
            enable_performance_tracing: true,
            ..Self::for_local()
        }
    }

    /// Build a configuration using environment hints.
    ///
    /// # Environment Variables
    ///
    /// - `HYPERSETI_TRACING_PROFILE` - `local` (default), `ci`, or `performance`
    /// - `HYPERSETI_TRACING_DIRECTIVES` - overrides tracing directives
    /// - `HYPERSETI_TRACING_FORMAT` - `pretty`, `compact`, or `json`
    /// - `HYPERSETI_TRACING_REDACT_FIELDS` - comma-separated field names to redact
    /// - `HYPERSETI_TRACING_REDACT_TOKEN` - replacement text for redacted values
    /// - `HYPERSETI_PERF_TRACING` - `true`/`1`/`yes` enables transfer accounting
    pub fn from_env() -> Self {
        let profile = env::var("HYPERSETI_TRACING_PROFILE")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Some(directives) = non_empty_var("HYPERSETI_TRACING_DIRECTIVES") {
            config.directives = Some(directives);
        }

        if let Some(parsed) = non_empty_var("HYPERSETI_TRACING_FORMAT").and_then(|v| TracingOutput::from_env_value(&v))
        {
            config.output = parsed;
            if config.output == TracingOutput::Json {
                config.ansi = false;
            }
        }

        if let Some(redacted) = non_empty_var("HYPERSETI_TRACING_REDACT_FIELDS") {
            let fields = redacted
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !fields.is_empty() {
                config.redacted_fields = fields;
            }
        }

        if let Some(token) = non_empty_var("HYPERSETI_TRACING_REDACT_TOKEN") {
            config.redaction_text = token;
        }

        if let Ok(perf) = env::var("HYPERSETI_PERF_TRACING") {
            config.enable_performance_tracing =
                perf.eq_ignore_ascii_case("true") || perf == "1" || perf.eq_ignore_ascii_case("yes");
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Output format choices for the tracing formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Errors surfaced when configuring the shared tracing subscriber fails.
#[derive(Debug)]
pub enum TracingSetupError {
    /// The provided directive string could not be parsed.
    InvalidFilter(String),
    /// Installing the global subscriber failed (usually because one is
    /// already set).
    SubscriberInit(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for TracingSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracingSetupError::InvalidFilter(msg) => write!(f, "invalid tracing directive: {msg}"),
            TracingSetupError::SubscriberInit(err) => {
                write!(f, "failed to install global tracing subscriber: {err}")
            }
        }
    }
}

impl Error for TracingSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TracingSetupError::SubscriberInit(err) => Some(err),
            TracingSetupError::InvalidFilter(_) => None,
        }
    }
}

/// Build a `tracing` subscriber using the provided configuration.
///
/// The result can be installed globally with [`init_global_tracing`] or
/// wrapped in a [`tracing::Dispatch`] and handed to a single adapter.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    performance::set_enabled(config.enable_performance_tracing);
    let (filter, fmt_layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(fmt_layer).with(filter))
}

/// Build the filter and formatting layers for external composition.
pub fn subscriber_layers(
    config: &TracingConfig,
) -> Result<(EnvFilter, Box<dyn Layer<Registry> + Send + Sync>), TracingSetupError> {
    let filter = config.resolve_filter()?;
    let redaction = (!config.redacted_fields.is_empty()).then(|| Redaction {
        fields: Arc::new(config.redacted_fields.iter().cloned().collect()),
        replacement: Arc::new(config.redaction_text.clone()),
    });

    let base = tracing_fmt::layer()
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.output, redaction) {
        (TracingOutput::Compact, None) => Box::new(base.compact().with_ansi(config.ansi)),
        (TracingOutput::Compact, Some(r)) => Box::new(base.compact().with_ansi(config.ansi).fmt_fields(TextFields(r))),
        (TracingOutput::Pretty, None) => Box::new(base.pretty().with_ansi(config.ansi)),
        (TracingOutput::Pretty, Some(r)) => Box::new(base.pretty().with_ansi(config.ansi).fmt_fields(TextFields(r))),
        (TracingOutput::Json, None) => Box::new(base.json().with_ansi(false)),
        (TracingOutput::Json, Some(r)) => Box::new(base.json().with_ansi(false).fmt_fields(JsonFields(r))),
    };

    Ok((filter, layer))
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)
}

#[derive(Clone)]
struct Redaction {
    fields: Arc<HashSet<String>>,
    replacement: Arc<String>,
}

/// `key=value` field formatter with redaction.
#[derive(Clone)]
struct TextFields(Redaction);

/// JSON object field formatter with redaction.
#[derive(Clone)]
struct JsonFields(Redaction);

impl<'writer> FormatFields<'writer> for TextFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut collector = FieldCollector::new(&self.0);
        fields.record(&mut collector);

        for (index, entry) in collector.entries.into_iter().enumerate() {
            if index > 0 {
                writer.write_char(' ')?;
            }
            write!(writer, "{}={}", entry.name, entry.text)?;
        }
        Ok(())
    }
}

impl<'writer> FormatFields<'writer> for JsonFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut collector = FieldCollector::new(&self.0);
        fields.record(&mut collector);

        let object: JsonMap<String, JsonValue> =
            collector.entries.into_iter().map(|entry| (entry.name, entry.json)).collect();
        let serialized = serde_json::to_string(&JsonValue::Object(object)).map_err(|_| fmt::Error)?;
        writer.write_str(&serialized)
    }
}

struct CollectedField {
    name: String,
    text: String,
    json: JsonValue,
}

/// Records each field once in both renderings; the formatter picks one.
struct FieldCollector<'a> {
    entries: Vec<CollectedField>,
    redaction: &'a Redaction,
}

impl<'a> FieldCollector<'a> {
    fn new(redaction: &'a Redaction) -> Self {
        Self {
            entries: Vec::new(),
            redaction,
        }
    }

    fn push(&mut self, field: &Field, text: String, json: JsonValue) {
        let name = field.name().to_string();
        let entry = if self.redaction.fields.contains(field.name()) {
            CollectedField {
                name,
                text: format!("{:?}", self.redaction.replacement.as_str()),
                json: JsonValue::String(self.redaction.replacement.to_string()),
            }
        } else {
            CollectedField { name, text, json }
        };
        self.entries.push(entry);
    }
}

impl Visit for FieldCollector<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        self.push(field, text.clone(), JsonValue::String(text));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string(), JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string(), JsonValue::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string(), JsonValue::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let json = JsonNumber::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(value.to_string()));
        self.push(field, value.to_string(), json);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, format!("{:?}", value), JsonValue::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, value.to_string(), JsonValue::String(value.to_string()));
    }
}
