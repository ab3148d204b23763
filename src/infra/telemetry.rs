use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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
            "blogroll_fragment_cache_hit_total",
            Unit::Count,
            "Total number of rendered-fragment cache hits."
        );
        describe_counter!(
            "blogroll_fragment_cache_miss_total",
            Unit::Count,
            "Total number of rendered-fragment cache misses, expired entries included."
        );
        describe_counter!(
            "blogroll_fragment_cache_store_total",
            Unit::Count,
            "Total number of fragments written to the cache."
        );
        describe_counter!(
            "blogroll_fragment_cache_lock_recovered_total",
            Unit::Count,
            "Total number of fragment cache lock acquisitions that recovered from poisoning."
        );
        describe_counter!(
            "blogroll_http_panics_total",
            Unit::Count,
            "Total number of request handlers that panicked."
        );
        describe_histogram!(
            "blogroll_http_request_ms",
            Unit::Milliseconds,
            "Request latency in milliseconds."
        );
    });
}
