pub mod batch;
pub mod collector;
pub mod events;
pub mod input;
pub mod namespace;
pub mod network;
pub mod node;
pub mod pod;
pub mod runner;
pub mod storage;
pub mod summary;
pub mod workload;

pub use collector::{CollectContext, Collector};
pub use events::{Backoff, EventWatcher, FixedBackoff, WatchState};
pub use input::KubernetesInput;
pub use runner::{Runner, TickReport, SOURCE_NAME};

/// Every collector, in the order they are reported
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(pod::PodCollector),
        Box::new(node::NodeCollector),
        Box::new(workload::DeploymentCollector),
        Box::new(workload::DaemonSetCollector),
        Box::new(workload::ReplicaSetCollector),
        Box::new(workload::StatefulSetCollector),
        Box::new(network::ServiceCollector),
        Box::new(network::EndpointsCollector),
        Box::new(batch::JobCollector),
        Box::new(batch::CronJobCollector),
        Box::new(storage::PersistentVolumeCollector),
        Box::new(storage::PersistentVolumeClaimCollector),
        Box::new(namespace::NamespaceCollector),
        Box::new(summary::NamespaceSummaryCollector),
    ]
}

pub fn collector_kinds() -> Vec<&'static str> {
    default_collectors().iter().map(|c| c.kind()).collect()
}
