use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;

/// The parts of a pod autodiscovery needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub node_name: String,
    pub pod_ip: String,
    pub pod_ips: Vec<String>,
    pub phase: String,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl PodInfo {
    pub fn from_k8s_pod(pod: &Pod) -> Self {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            uid: metadata.uid.clone().unwrap_or_default(),
            node_name: spec.and_then(|s| s.node_name.clone()).unwrap_or_default(),
            pod_ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
            pod_ips: status
                .and_then(|s| s.pod_ips.as_ref())
                .map(|ips| ips.iter().map(|ip| ip.ip.clone()).collect())
                .unwrap_or_default(),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            annotations: metadata.annotations.clone().unwrap_or_default(),
            labels: metadata.labels.clone().unwrap_or_default(),
        }
    }
}

pub fn uid(meta: &ObjectMeta) -> &str {
    meta.uid.as_deref().unwrap_or("")
}

pub fn name(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or("")
}

pub fn namespace(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or("")
}

/// Seconds between `creationTimestamp` and `now`; 0 when unknown
pub fn age_seconds(meta: &ObjectMeta, now: DateTime<Utc>) -> i64 {
    since_seconds(meta.creation_timestamp.as_ref(), now)
}

pub fn since_seconds(time: Option<&Time>, now: DateTime<Utc>) -> i64 {
    time.map(|t| (now - t.0).num_seconds().max(0)).unwrap_or(0)
}

pub fn labels_json(meta: &ObjectMeta) -> String {
    map_json(meta.labels.as_ref())
}

pub fn annotations_json(meta: &ObjectMeta) -> String {
    map_json(meta.annotations.as_ref())
}

fn map_json(map: Option<&BTreeMap<String, String>>) -> String {
    match map {
        Some(m) => serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string()),
        None => "{}".to_string(),
    }
}

/// Workload that owns an object, as `(tag key, owner name)`
///
/// ReplicaSet owners are folded into their deployment by stripping the
/// `pod-template-hash` suffix.
pub fn owner(meta: &ObjectMeta) -> Option<(&'static str, String)> {
    let first = meta.owner_references.as_ref()?.first()?;
    match first.kind.as_str() {
        "ReplicaSet" => {
            let hash = meta
                .labels
                .as_ref()
                .and_then(|l| l.get("pod-template-hash"))
                .map(|h| format!("-{}", h));
            let name = match hash {
                Some(suffix) => first
                    .name
                    .strip_suffix(&suffix)
                    .unwrap_or(&first.name)
                    .to_string(),
                None => first.name.clone(),
            };
            Some(("deployment", name))
        }
        "DaemonSet" => Some(("daemonset", first.name.clone())),
        "StatefulSet" => Some(("statefulset", first.name.clone())),
        "Job" => Some(("job", first.name.clone())),
        "CronJob" => Some(("cronjob", first.name.clone())),
        "Deployment" => Some(("deployment", first.name.clone())),
        _ => None,
    }
}
