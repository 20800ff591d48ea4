use std::sync::Once;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cachewire_emit_total",
            Unit::Count,
            "Total number of invalidation emissions attempted."
        );
        describe_counter!(
            "cachewire_emit_dropped_total",
            Unit::Count,
            "Total number of invalidation emissions dropped after a publish failure."
        );
        describe_histogram!(
            "cachewire_emit_ms",
            Unit::Milliseconds,
            "Publish round-trip latency in milliseconds."
        );
        describe_counter!(
            "cachewire_store_conflict_total",
            Unit::Count,
            "Total number of version conflicts observed by store updates."
        );
        describe_counter!(
            "cachewire_relay_publish_total",
            Unit::Count,
            "Total number of messages accepted by the relay ingress."
        );
        describe_counter!(
            "cachewire_relay_lagged_total",
            Unit::Count,
            "Total number of messages a slow subscriber missed."
        );
        describe_gauge!(
            "cachewire_relay_rooms",
            Unit::Count,
            "Number of rooms with at least one live subscriber."
        );
    });
}
