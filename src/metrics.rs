//! Prometheus metrics for the search/ranking/personalization core.

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

const NAMESPACE: &str = "sonara";

/// Central metrics registry and named instruments, shared via `Arc` across handlers,
/// middleware and background tasks.
pub struct MetricsCollector {
    registry: Registry,

    http_requests_total: CounterVec,
    http_request_latency: HistogramVec,

    smart_search_cache_hits: CounterVec,
    smart_search_cache_misses: CounterVec,
    smart_search_single_flight_joins: IntGauge,
    smart_search_latency: Histogram,
    smart_search_upstream_errors: CounterVec,

    local_index_size: IntGauge,
    profile_cache_hits: IntGauge,
    profile_cache_misses: IntGauge,

    reranker_latency: Histogram,
    reranker_fallbacks: IntGauge,

    recommendation_latency: HistogramVec,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests handled")
                .namespace(NAMESPACE),
            &["method", "path", "status_code"],
        )?;

        let http_request_latency = HistogramVec::new(
            HistogramOpts::new(
                "http_request_latency_seconds",
                "HTTP request latency in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["method", "path", "status_code"],
        )?;

        let smart_search_cache_hits = CounterVec::new(
            Opts::new("smart_search_cache_hits_total", "Smart search cache hits by freshness")
                .namespace(NAMESPACE)
                .subsystem("smart_search"),
            &["freshness"],
        )?;

        let smart_search_cache_misses = CounterVec::new(
            Opts::new("smart_search_cache_misses_total", "Smart search cache misses")
                .namespace(NAMESPACE)
                .subsystem("smart_search"),
            &["reason"],
        )?;

        let smart_search_single_flight_joins = IntGauge::with_opts(
            Opts::new(
                "smart_search_inflight_keys",
                "Number of cache keys currently being refreshed",
            )
            .namespace(NAMESPACE)
            .subsystem("smart_search"),
        )?;

        let smart_search_latency = Histogram::with_opts(
            HistogramOpts::new(
                "smart_search_compute_latency_seconds",
                "Latency of a synchronous smartSearch computation",
            )
            .namespace(NAMESPACE)
            .subsystem("smart_search")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.2, 5.0]),
        )?;

        let smart_search_upstream_errors = CounterVec::new(
            Opts::new("smart_search_upstream_errors_total", "Upstream catalog errors by provider/kind")
                .namespace(NAMESPACE)
                .subsystem("smart_search"),
            &["provider", "kind"],
        )?;

        let local_index_size = IntGauge::with_opts(
            Opts::new("local_index_size", "Number of songs held in the local song index")
                .namespace(NAMESPACE),
        )?;

        let profile_cache_hits = IntGauge::with_opts(
            Opts::new("profile_cache_hits_total", "Reranker profile cache hits")
                .namespace(NAMESPACE)
                .subsystem("reranker"),
        )?;

        let profile_cache_misses = IntGauge::with_opts(
            Opts::new("profile_cache_misses_total", "Reranker profile cache misses")
                .namespace(NAMESPACE)
                .subsystem("reranker"),
        )?;

        let reranker_latency = Histogram::with_opts(
            HistogramOpts::new("rerank_latency_seconds", "Latency of a rerank() call")
                .namespace(NAMESPACE)
                .subsystem("reranker")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25]),
        )?;

        let reranker_fallbacks = IntGauge::with_opts(
            Opts::new("rerank_fallbacks_total", "Times the rule-scored fallback was used instead of a full rerank")
                .namespace(NAMESPACE)
                .subsystem("reranker"),
        )?;

        let recommendation_latency = HistogramVec::new(
            HistogramOpts::new("recommendation_latency_seconds", "Latency of recommendation generation")
                .namespace(NAMESPACE)
                .subsystem("recommendations")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
            &["mode"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_latency.clone()))?;
        registry.register(Box::new(smart_search_cache_hits.clone()))?;
        registry.register(Box::new(smart_search_cache_misses.clone()))?;
        registry.register(Box::new(smart_search_single_flight_joins.clone()))?;
        registry.register(Box::new(smart_search_latency.clone()))?;
        registry.register(Box::new(smart_search_upstream_errors.clone()))?;
        registry.register(Box::new(local_index_size.clone()))?;
        registry.register(Box::new(profile_cache_hits.clone()))?;
        registry.register(Box::new(profile_cache_misses.clone()))?;
        registry.register(Box::new(reranker_latency.clone()))?;
        registry.register(Box::new(reranker_fallbacks.clone()))?;
        registry.register(Box::new(recommendation_latency.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_latency,
            smart_search_cache_hits,
            smart_search_cache_misses,
            smart_search_single_flight_joins,
            smart_search_latency,
            smart_search_upstream_errors,
            local_index_size,
            profile_cache_hits,
            profile_cache_misses,
            reranker_latency,
            reranker_fallbacks,
            recommendation_latency,
        })
    }

    pub fn record_request_latency(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.http_request_latency
            .with_label_values(&[method, path, &status])
            .observe(duration.as_secs_f64());
    }

    pub fn record_cache_hit(&self, freshness: &str) {
        self.smart_search_cache_hits.with_label_values(&[freshness]).inc();
    }

    pub fn record_cache_miss(&self, reason: &str) {
        self.smart_search_cache_misses.with_label_values(&[reason]).inc();
    }

    pub fn set_inflight_keys(&self, count: i64) {
        self.smart_search_single_flight_joins.set(count);
    }

    pub fn record_search_latency(&self, duration: Duration) {
        self.smart_search_latency.observe(duration.as_secs_f64());
    }

    pub fn record_upstream_error(&self, provider: &str, kind: &str) {
        self.smart_search_upstream_errors.with_label_values(&[provider, kind]).inc();
    }

    pub fn set_local_index_size(&self, size: i64) {
        self.local_index_size.set(size);
    }

    pub fn record_profile_cache_hit(&self) {
        self.profile_cache_hits.inc();
    }

    pub fn record_profile_cache_miss(&self) {
        self.profile_cache_misses.inc();
    }

    pub fn record_rerank_latency(&self, duration: Duration) {
        self.reranker_latency.observe(duration.as_secs_f64());
    }

    pub fn record_rerank_fallback(&self) {
        self.reranker_fallbacks.inc();
    }

    pub fn record_recommendation_latency(&self, mode: &str, duration: Duration) {
        self.recommendation_latency.with_label_values(&[mode]).observe(duration.as_secs_f64());
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn get_metrics(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_collector_renders_registered_instruments() {
        let metrics = MetricsCollector::new().expect("collector");
        metrics.record_request_latency("GET", "/healthz", 200, Duration::from_millis(5));
        metrics.record_cache_hit("fresh");
        let text = metrics.get_metrics().expect("render");
        assert!(text.contains("sonara_http_requests_total"));
        assert!(text.contains("sonara_smart_search_cache_hits_total"));
    }
}
