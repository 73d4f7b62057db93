use crate::io::{FeedOption, Feeder};
use crate::{DatakitError, Result};
use datakit_common::{Category, Record};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;

const COST_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Counters describing what the agent has fed, kept in a private registry
#[derive(Clone)]
pub struct FeedMetrics {
    registry: Registry,
    records_total: IntCounterVec,
    last_errors_total: IntCounterVec,
    collect_cost_seconds: HistogramVec,
}

impl FeedMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let records_total = IntCounterVec::new(
            Opts::new("datakit_feed_records_total", "Records handed to the output feed"),
            &["source", "category"],
        )
        .map_err(metrics_error)?;

        let last_errors_total = IntCounterVec::new(
            Opts::new(
                "datakit_feed_last_errors_total",
                "Collection errors reported without records",
            ),
            &["source"],
        )
        .map_err(metrics_error)?;

        let collect_cost_seconds = HistogramVec::new(
            HistogramOpts::new(
                "datakit_feed_collect_cost_seconds",
                "Time spent collecting one fed batch",
            )
            .buckets(COST_BUCKETS.to_vec()),
            &["source"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(records_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(last_errors_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(collect_cost_seconds.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            records_total,
            last_errors_total,
            collect_cost_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn records_fed(&self, source: &str, category: Category) -> u64 {
        self.records_total
            .with_label_values(&[source, category.as_str()])
            .get()
    }

    pub fn errors_reported(&self, source: &str) -> u64 {
        self.last_errors_total.with_label_values(&[source]).get()
    }

    fn observe_feed(&self, source: &str, category: Category, count: usize, option: &FeedOption) {
        self.records_total
            .with_label_values(&[source, category.as_str()])
            .inc_by(count as u64);
        self.collect_cost_seconds
            .with_label_values(&[source])
            .observe(option.collect_cost.as_secs_f64());
    }

    fn observe_error(&self, source: &str) {
        self.last_errors_total.with_label_values(&[source]).inc();
    }
}

fn metrics_error(e: prometheus::Error) -> DatakitError {
    DatakitError::MetricsError(e.to_string())
}

/// Feeder wrapper that records [`FeedMetrics`] before delegating
pub struct MeteredFeeder {
    inner: Arc<dyn Feeder>,
    metrics: FeedMetrics,
}

impl MeteredFeeder {
    pub fn new(inner: Arc<dyn Feeder>, metrics: FeedMetrics) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &FeedMetrics {
        &self.metrics
    }
}

impl Feeder for MeteredFeeder {
    fn feed(
        &self,
        source: &str,
        category: Category,
        records: Vec<Record>,
        option: &FeedOption,
    ) -> Result<()> {
        self.metrics
            .observe_feed(source, category, records.len(), option);
        self.inner.feed(source, category, records, option)
    }

    fn feed_last_error(&self, source: &str, error: &str) {
        self.metrics.observe_error(source);
        self.inner.feed_last_error(source, error);
    }
}
