//! Tick scheduler driving the collectors

use super::collector::{CollectContext, Collector};
use crate::io::{FeedOption, Feeder};
use crate::k8s::api::KubeApi;
use datakit_common::{Category, Record};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SOURCE_NAME: &str = "kubernetes";

/// Lowest accepted collection interval
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one collection pass
#[derive(Debug, Default)]
pub struct TickReport {
    pub records: BTreeMap<Category, Vec<Record>>,
    pub collect_cost: Duration,
    /// Last collector failure of the tick, if any
    pub last_error: Option<String>,
}

impl TickReport {
    pub fn total(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn named(&self, name: &str) -> Vec<&Record> {
        self.records
            .values()
            .flatten()
            .filter(|r| r.name == name)
            .collect()
    }
}

pub struct Runner {
    api: Arc<dyn KubeApi>,
    feeder: Arc<dyn Feeder>,
    collectors: Vec<Box<dyn Collector>>,
    interval: Duration,
    extra_tags: BTreeMap<String, String>,
}

impl Runner {
    pub fn new(
        api: Arc<dyn KubeApi>,
        feeder: Arc<dyn Feeder>,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Self {
        Self {
            api,
            feeder,
            collectors,
            interval: DEFAULT_INTERVAL,
            extra_tags: BTreeMap::new(),
        }
    }

    /// Set the tick interval, raised to [`MIN_INTERVAL`] if lower
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.extra_tags = tags;
        self
    }

    /// Keep only collectors whose kind is listed
    pub fn only_kinds(mut self, kinds: &[String]) -> Self {
        self.collectors
            .retain(|c| kinds.iter().any(|k| k == c.kind()));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.kind()).collect()
    }

    /// Run every collector once without feeding
    ///
    /// A failing collector only loses its own records; its error is logged
    /// and kept as the tick's last error.
    pub async fn collect_once(&self) -> TickReport {
        let start = Instant::now();
        let ctx = CollectContext::new(self.extra_tags.clone());
        let api = self.api.as_ref();

        let results = join_all(self.collectors.iter().map(|c| c.collect(api, &ctx))).await;

        let mut report = TickReport::default();
        for (collector, result) in self.collectors.iter().zip(results) {
            match result {
                Ok(records) => {
                    debug!(kind = collector.kind(), count = records.len(), "Collected");
                    report
                        .records
                        .entry(collector.category())
                        .or_default()
                        .extend(records);
                }
                Err(e) => {
                    warn!(kind = collector.kind(), error = %e, "Collection failed");
                    report.last_error = Some(format!("{}: {}", collector.kind(), e));
                }
            }
        }
        report.collect_cost = start.elapsed();
        report
    }

    /// Collect once and hand the records to the feeder
    pub async fn tick(&self) -> TickReport {
        let mut report = self.collect_once().await;
        let option = FeedOption::with_cost(report.collect_cost);

        for (category, records) in &report.records {
            if records.is_empty() {
                continue;
            }
            if let Err(e) = self
                .feeder
                .feed(SOURCE_NAME, *category, records.clone(), &option)
            {
                warn!(%category, error = %e, "Failed to feed records");
                report.last_error = Some(e.to_string());
            }
        }

        if let Some(error) = &report.last_error {
            self.feeder.feed_last_error(SOURCE_NAME, error);
        }
        report
    }

    /// Tick until `cancel` fires; a tick in progress always completes
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval = ?self.interval,
            collectors = self.collectors.len(),
            "Starting collection loop"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.tick().await;
            debug!(
                records = report.total(),
                cost = ?report.collect_cost,
                "Tick complete"
            );
        }

        info!("Collection loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFeeder;
    use crate::k8s::InMemoryCluster;
    use crate::kubernetes::default_collectors;
    use serde_json::json;

    fn runner(cluster: Arc<InMemoryCluster>, feeder: Arc<MemoryFeeder>) -> Runner {
        Runner::new(cluster, feeder, default_collectors())
    }

    #[test]
    fn test_interval_floor() {
        let r = runner(Arc::new(InMemoryCluster::new()), Arc::new(MemoryFeeder::new()))
            .with_interval(Duration::from_secs(1));
        assert_eq!(r.interval(), MIN_INTERVAL);

        let r = runner(Arc::new(InMemoryCluster::new()), Arc::new(MemoryFeeder::new()))
            .with_interval(Duration::from_secs(300));
        assert_eq!(r.interval(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_empty_cluster_feeds_nothing() {
        let feeder = Arc::new(MemoryFeeder::new());
        let report = runner(Arc::new(InMemoryCluster::new()), feeder.clone())
            .tick()
            .await;

        assert_eq!(report.total(), 0);
        assert!(report.last_error.is_none());
        assert!(feeder.batches().is_empty());
        assert!(feeder.last_errors().is_empty());
    }

    #[tokio::test]
    async fn test_failed_kind_does_not_affect_others() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.add_node(serde_json::from_value(json!({"metadata": {"name": "n1"}})).unwrap());
        cluster.add_service(
            serde_json::from_value(json!({"metadata": {"name": "s", "namespace": "a"}})).unwrap(),
        );
        cluster.fail_listing("nodes", None);

        let feeder = Arc::new(MemoryFeeder::new());
        let report = runner(cluster, feeder.clone())
            .only_kinds(&["node".to_string(), "service".to_string()])
            .tick()
            .await;

        assert_eq!(report.total(), 1);
        assert_eq!(feeder.records_named("kubernetes_services").len(), 1);
        let errors = feeder.last_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, SOURCE_NAME);
        assert!(errors[0].1.starts_with("node:"));
    }

    #[tokio::test]
    async fn test_feed_carries_collect_cost() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.add_namespace(serde_json::from_value(json!({"metadata": {"name": "a"}})).unwrap());

        let feeder = Arc::new(MemoryFeeder::new());
        let report = runner(cluster, feeder.clone()).tick().await;

        let batches = feeder.batches();
        // namespace objects plus the per-namespace summary metric
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.source, SOURCE_NAME);
            assert_eq!(batch.option.collect_cost, report.collect_cost);
        }
        assert_eq!(feeder.records_in(Category::Metric).len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let feeder = Arc::new(MemoryFeeder::new());
        let runner = Arc::new(runner(Arc::new(InMemoryCluster::new()), feeder));
        let cancel = CancellationToken::new();

        let handle = {
            let runner = runner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner did not stop")
            .unwrap();
    }
}
