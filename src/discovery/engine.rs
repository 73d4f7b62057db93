//! Annotation-driven input spawning

use super::annotations::{self, DiscoveredConfig};
use super::registry::{DiscoveryEntry, DiscoveryRegistry};
use crate::inputs::{load_inputs, Input, InputContext, InputRegistry};
use crate::io::Feeder;
use crate::k8s::api::KubeApi;
use crate::k8s::types::PodInfo;
use crate::{DatakitError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Upper bound of the start delay given to each spawned input
pub const MAX_JITTER: Duration = Duration::from_secs(10);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(180);
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Counts from one pass over the pod list
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub pods: usize,
    pub configs: usize,
    pub spawned: usize,
    pub failed: usize,
}

pub struct Autodiscovery {
    api: Arc<dyn KubeApi>,
    registry: DiscoveryRegistry,
    inputs: InputRegistry,
    feeder: Arc<dyn Feeder>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    tags: BTreeMap<String, String>,
    node_name: Option<String>,
    max_jitter: Duration,
    interval: Duration,
}

impl Autodiscovery {
    pub fn new(
        api: Arc<dyn KubeApi>,
        registry: DiscoveryRegistry,
        inputs: InputRegistry,
        feeder: Arc<dyn Feeder>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            registry,
            inputs,
            feeder,
            tracker,
            cancel,
            tags: BTreeMap::new(),
            node_name: None,
            max_jitter: MAX_JITTER,
            interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    /// Only scan pods scheduled on this node
    pub fn with_node_name(mut self, node_name: Option<String>) -> Self {
        self.node_name = node_name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SCAN_INTERVAL);
        self
    }

    pub fn registry(&self) -> &DiscoveryRegistry {
        &self.registry
    }

    /// List pods once and start inputs for configurations not seen before
    pub async fn scan(&self) -> Result<ScanReport> {
        let pods = self.api.list_pods(None).await?;
        let mut report = ScanReport::default();

        for pod in pods.iter().map(PodInfo::from_k8s_pod) {
            if let Some(node) = &self.node_name {
                if &pod.node_name != node {
                    continue;
                }
            }
            report.pods += 1;

            for config in annotations::discover(&pod) {
                report.configs += 1;
                match self.register_config(&config, &pod) {
                    Ok(spawned) => report.spawned += spawned,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            pod = %pod.name,
                            namespace = %pod.namespace,
                            annotation = %config.annotation,
                            error = %e,
                            "Invalid autodiscovery config, skipping"
                        );
                    }
                }
            }
        }

        debug!(?report, "Autodiscovery scan complete");
        Ok(report)
    }

    /// Register one configuration and spawn its inputs; returns how many
    /// were spawned (0 when the configuration is already registered)
    ///
    /// The configuration is parsed before registering, so a malformed one
    /// never takes a slot in the registry.
    pub fn register_config(&self, config: &DiscoveredConfig, pod: &PodInfo) -> Result<usize> {
        if self.registry.contains(&config.hash) {
            return Ok(0);
        }

        let loaded = load_inputs(&self.inputs, &config.text).map_err(|e| {
            DatakitError::DiscoveryError(format!(
                "{}/{} {}: {}",
                pod.namespace, pod.name, config.annotation, e
            ))
        })?;
        for name in &loaded.unknown {
            warn!(input = %name, pod = %pod.name, "Discovered input is not registered, skipping");
        }

        let entry = DiscoveryEntry {
            hash: config.hash.clone(),
            input: config.input.clone(),
            namespace: pod.namespace.clone(),
            pod_name: pod.name.clone(),
            instances: loaded.instances.len(),
            registered_at: Utc::now(),
        };
        if !self.registry.try_register(entry) {
            debug!(hash = %config.hash, "Config registered concurrently, skipping");
            return Ok(0);
        }

        info!(
            input = %config.input,
            pod = %pod.name,
            namespace = %pod.namespace,
            hash = %config.hash,
            instances = loaded.instances.len(),
            "Discovered new input config"
        );

        let spawned = loaded.instances.len();
        for instance in loaded.instances {
            self.spawn(instance, pod);
        }
        Ok(spawned)
    }

    fn spawn(&self, input: Box<dyn Input>, pod: &PodInfo) {
        let delay = jitter(self.max_jitter);
        let mut tags = self.tags.clone();
        tags.entry("namespace".to_string())
            .or_insert_with(|| pod.namespace.clone());
        tags.entry("pod_name".to_string())
            .or_insert_with(|| pod.name.clone());

        let ctx = InputContext {
            feeder: self.feeder.clone(),
            cancel: self.cancel.child_token(),
            tags,
        };

        self.tracker.spawn(async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            debug!(input = input.name(), ?delay, "Starting discovered input");
            input.run(ctx).await;
        });
    }

    /// Scan every interval until cancelled
    pub async fn run(&self) {
        info!(
            interval = ?self.interval,
            node = self.node_name.as_deref().unwrap_or("*"),
            "Starting autodiscovery"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.scan().await {
                warn!(error = %e, "Autodiscovery scan failed");
                self.feeder.feed_last_error("autodiscovery", &e.to_string());
            }
        }
        info!(registered = self.registry.len(), "Autodiscovery stopped");
    }
}

static JITTER_CALLS: AtomicU64 = AtomicU64::new(0);

/// Pseudo-random delay in `[0, max)` taken from the clock
///
/// A per-call counter is mixed in so inputs spawned in the same scan spread
/// out even on clocks with coarse resolution.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let call = JITTER_CALLS.fetch_add(1, Ordering::Relaxed);
    let mixed = (nanos / 1_000).wrapping_add(call.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_millis(mixed % max_ms)
}
