//! Prometheus metrics for repertoire-assistant.
//!
//! Chat turn outcomes, hosted-provider latency and errors, and live sessions.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use super::providers::ProviderError;

static INIT_LOCK: Mutex<()> = Mutex::new(());

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Chat metrics
pub static CHAT_TURNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Provider metrics
pub static PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static PROVIDER_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Session metrics
pub static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize all metrics. Call once at startup; later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    // Turn counter (outcome: ok, upstream_error, incomplete, rejected)
    let chat_turns = IntCounterVec::new(
        Opts::new("chat_turns_total", "Total chat turns handled"),
        &["mode", "outcome"],
    )?;

    // Provider latency histogram
    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "provider_latency_seconds",
            "Hosted provider API latency in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider", "operation"],
    )?;

    // Provider error counter
    let provider_errors = IntCounterVec::new(
        Opts::new("provider_errors_total", "Total hosted provider errors"),
        &["provider", "error_type"],
    )?;

    let active_sessions = IntGauge::new("active_sessions", "Conversations currently held")?;

    registry.register(Box::new(chat_turns.clone()))?;
    registry.register(Box::new(provider_latency.clone()))?;
    registry.register(Box::new(provider_errors.clone()))?;
    registry.register(Box::new(active_sessions.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = CHAT_TURNS_TOTAL.set(chat_turns);
    let _ = PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = PROVIDER_ERRORS_TOTAL.set(provider_errors);
    let _ = ACTIVE_SESSIONS.set(active_sessions);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record the outcome of one chat turn.
pub fn record_chat_turn(mode: &str, outcome: &str) {
    if let Some(counter) = CHAT_TURNS_TOTAL.get() {
        counter.with_label_values(&[mode, outcome]).inc();
    }
}

/// Record provider latency.
pub fn record_provider_latency(provider: &str, operation: &str, duration_secs: f64) {
    if let Some(histogram) = PROVIDER_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider, operation])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(counter) = PROVIDER_ERRORS_TOTAL.get() {
        counter.with_label_values(&[provider, error_type]).inc();
    }
}

pub fn set_active_sessions(count: usize) {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.set(count as i64);
    }
}

/// Await a provider call, recording its latency and any error.
pub async fn observe_provider_call<T, F>(
    provider: &str,
    operation: &str,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    let start = Instant::now();
    let result = call.await;
    record_provider_latency(provider, operation, start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!(provider, operation, error = %e, "Provider call failed");
        record_provider_error(provider, e.kind());
    }
    result
}
