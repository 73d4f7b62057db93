use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::quantity;
use crate::k8s::types;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};

pub const POD_MEASUREMENT: &str = "kubelet_pod";

pub struct PodCollector;

#[async_trait]
impl Collector for PodCollector {
    fn kind(&self) -> &'static str {
        "pod"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let pods = api.list_pods(ctx.namespace()).await?;
        Ok(pods.iter().map(|pod| pod_record(pod, ctx)).collect())
    }
}

fn pod_record(pod: &Pod, ctx: &CollectContext) -> Record {
    let mut record = object_record(POD_MEASUREMENT, "pod_name", &pod.metadata, ctx);
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();

    let phase = status
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown");
    let node_name = spec.and_then(|s| s.node_name.as_deref()).unwrap_or("");

    record.set_tag("phase", phase);
    record.set_tag("status", pod_status(pod));
    record.set_tag("node_name", node_name);
    record.set_tag("host", node_name);
    record.set_tag(
        "pod_ip",
        status.and_then(|s| s.pod_ip.as_deref()).unwrap_or(""),
    );
    record.set_tag(
        "qos_class",
        status.and_then(|s| s.qos_class.as_deref()).unwrap_or(""),
    );
    if let Some((key, owner)) = types::owner(&pod.metadata) {
        record.set_tag(key, owner);
    }

    let statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or(&[]);
    let running = statuses
        .iter()
        .filter(|cs| cs.state.as_ref().is_some_and(|st| st.running.is_some()))
        .count();
    let total = spec
        .map(|s| s.containers.len())
        .filter(|n| *n > 0)
        .unwrap_or(statuses.len());
    let ratio = if total == 0 {
        0.0
    } else {
        running as f64 / total as f64
    };

    record.set_field("ready", running);
    record.set_field("available", total);
    record.set_field("ready_ratio", ratio);
    record.set_field("restarts", restarts(pod));

    let containers: &[Container] = spec.map(|s| s.containers.as_slice()).unwrap_or(&[]);
    let (cpu_limit, cpu_request, mem_limit, mem_request) = resources(containers);
    record.set_field("cpu_limit", cpu_limit);
    record.set_field("cpu_request", cpu_request);
    record.set_field("mem_limit", mem_limit);
    record.set_field("mem_request", mem_request);

    finish(record, ctx)
}

/// Pod phase, or the reason the first waiting container is stuck
pub fn pod_status(pod: &Pod) -> String {
    let status = pod.status.as_ref();
    let waiting = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| {
            statuses.iter().find_map(|cs| {
                cs.state
                    .as_ref()
                    .and_then(|st| st.waiting.as_ref())
                    .and_then(|w| w.reason.clone())
            })
        });

    waiting.unwrap_or_else(|| {
        status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    })
}

/// Restart count summed over init, main and ephemeral containers
pub fn restarts(pod: &Pod) -> i64 {
    let Some(status) = pod.status.as_ref() else {
        return 0;
    };
    let sum = |list: Option<&Vec<ContainerStatus>>| -> i64 {
        list.map(|l| l.iter().map(|cs| i64::from(cs.restart_count)).sum())
            .unwrap_or(0)
    };
    sum(status.init_container_statuses.as_ref())
        + sum(status.container_statuses.as_ref())
        + sum(status.ephemeral_container_statuses.as_ref())
}

/// Summed (cpu_limit, cpu_request) in cores and (mem_limit, mem_request) in bytes
fn resources(containers: &[Container]) -> (f64, f64, i64, i64) {
    let mut totals = (0.0, 0.0, 0, 0);
    for container in containers {
        let Some(res) = container.resources.as_ref() else {
            continue;
        };
        let limits = res.limits.as_ref();
        let requests = res.requests.as_ref();
        totals.0 += quantity::cpu_cores(limits.and_then(|l| l.get("cpu")));
        totals.1 += quantity::cpu_cores(requests.and_then(|r| r.get("cpu")));
        totals.2 += quantity::bytes(limits.and_then(|l| l.get("memory")));
        totals.3 += quantity::bytes(requests.and_then(|r| r.get("memory")));
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;
    use datakit_common::FieldValue;
    use serde_json::json;

    fn crashing_pod() -> Pod {
        serde_json::from_value(json!({
            "metadata": {
                "name": "api-5f7c9-abcde",
                "namespace": "prod",
                "uid": "pod-uid-1",
                "labels": {"pod-template-hash": "5f7c9"},
                "ownerReferences": [{
                    "apiVersion": "apps/v1",
                    "kind": "ReplicaSet",
                    "name": "api-5f7c9",
                    "uid": "rs-1"
                }]
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [
                    {
                        "name": "api",
                        "resources": {
                            "limits": {"cpu": "500m", "memory": "256Mi"},
                            "requests": {"cpu": "250m", "memory": "garbage"}
                        }
                    },
                    {"name": "sidecar"}
                ]
            },
            "status": {
                "phase": "Running",
                "podIP": "10.1.0.7",
                "qosClass": "Burstable",
                "initContainerStatuses": [
                    {"name": "init", "image": "i", "imageID": "", "ready": true, "restartCount": 1}
                ],
                "containerStatuses": [
                    {"name": "api", "image": "a", "imageID": "", "ready": true, "restartCount": 3,
                     "state": {"running": {}}},
                    {"name": "sidecar", "image": "s", "imageID": "", "ready": false, "restartCount": 4,
                     "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
                ],
                "ephemeralContainerStatuses": [
                    {"name": "debug", "image": "d", "imageID": "", "ready": false, "restartCount": 2}
                ]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_listing_yields_no_records() {
        let cluster = InMemoryCluster::new();
        let records = PodCollector
            .collect(&cluster, &CollectContext::default())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_pod_record_fields() {
        let cluster = InMemoryCluster::new();
        cluster.add_pod(crashing_pod());

        let records = PodCollector
            .collect(&cluster, &CollectContext::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];

        assert_eq!(record.name, POD_MEASUREMENT);
        assert_eq!(record.tag("name"), Some("pod-uid-1"));
        assert_eq!(record.tag("pod_name"), Some("api-5f7c9-abcde"));
        assert_eq!(record.tag("phase"), Some("Running"));
        assert_eq!(record.tag("status"), Some("CrashLoopBackOff"));
        assert_eq!(record.tag("deployment"), Some("api"));
        assert_eq!(record.tag("node_name"), Some("node-a"));
        assert_eq!(record.field("ready"), Some(&FieldValue::Int(1)));
        assert_eq!(record.field("available"), Some(&FieldValue::Int(2)));
        assert_eq!(record.field("ready_ratio"), Some(&FieldValue::Float(0.5)));
        assert_eq!(record.field("restarts"), Some(&FieldValue::Int(10)));
        let cpu_limit = record.field("cpu_limit").and_then(|f| f.as_f64()).unwrap();
        assert!((cpu_limit - 0.5).abs() < 1e-9);
        assert_eq!(record.field("mem_limit"), Some(&FieldValue::Int(268_435_456)));
        // unparsable memory request degrades to zero
        assert_eq!(record.field("mem_request"), Some(&FieldValue::Int(0)));
        assert!(record.field("message").is_some());
    }

    #[tokio::test]
    async fn test_namespace_scoping() {
        let cluster = InMemoryCluster::new();
        cluster.add_pod(crashing_pod());

        let ctx = CollectContext::default().with_namespace("other");
        let records = PodCollector.collect(&cluster, &ctx).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_status_falls_back_to_phase() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "p"},
            "status": {"phase": "Pending"}
        }))
        .unwrap();
        assert_eq!(pod_status(&pod), "Pending");
        assert_eq!(restarts(&pod), 0);
    }
}
