#![allow(dead_code)]

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Namespace, Pod};
use serde_json::json;

pub fn namespace(name: &str) -> Namespace {
    serde_json::from_value(json!({
        "metadata": {"name": name, "uid": format!("ns-{}", name)},
        "status": {"phase": "Active"}
    }))
    .unwrap()
}

pub fn deployment(namespace: &str, name: &str) -> Deployment {
    serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": namespace, "uid": format!("{}-{}", namespace, name)},
        "spec": {"selector": {"matchLabels": {"app": name}}, "template": {}, "replicas": 3},
        "status": {"replicas": 3, "readyReplicas": 2, "availableReplicas": 2, "unavailableReplicas": 1}
    }))
    .unwrap()
}

/// Pod owned by `deployment`; running pods have one running container,
/// pending pods have none started yet
pub fn pod(namespace: &str, name: &str, deployment: &str, phase: &str) -> Pod {
    let state = if phase == "Running" {
        json!({"running": {"startedAt": "2024-03-01T10:00:00Z"}})
    } else {
        json!({"waiting": {}})
    };
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-{}", namespace, name),
            "labels": {"app": deployment, "pod-template-hash": "5d9f"},
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "name": format!("{}-5d9f", deployment),
                "uid": "rs"
            }]
        },
        "spec": {"nodeName": "node-a", "containers": [{"name": "app"}]},
        "status": {
            "phase": phase,
            "podIP": "10.1.0.1",
            "containerStatuses": [{
                "name": "app", "image": "app:1", "imageID": "", "ready": phase == "Running",
                "restartCount": 0, "state": state
            }]
        }
    }))
    .unwrap()
}

pub fn annotated_pod(namespace: &str, name: &str, annotations: serde_json::Value) -> Pod {
    serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": namespace, "uid": name, "annotations": annotations},
        "spec": {"nodeName": "node-a", "containers": [{"name": "app"}]},
        "status": {"phase": "Running", "podIP": "10.1.0.9"}
    }))
    .unwrap()
}

pub fn event(resource_version: &str, reason: &str) -> Box<Event> {
    Box::new(
        serde_json::from_value(json!({
            "metadata": {
                "name": format!("web-0.{}", resource_version),
                "namespace": "default",
                "resourceVersion": resource_version,
                "uid": format!("ev-{}", resource_version)
            },
            "involvedObject": {"kind": "Pod", "name": "web-0", "namespace": "default"},
            "reason": reason,
            "type": "Normal",
            "message": format!("{} at {}", reason, resource_version),
            "source": {"host": "node-a"}
        }))
        .unwrap(),
    )
}
