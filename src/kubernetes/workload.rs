//! Deployments, daemonsets, replicasets and statefulsets

use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::types;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub const DEPLOYMENT_MEASUREMENT: &str = "kubernetes_deployments";

pub struct DeploymentCollector;

#[async_trait]
impl Collector for DeploymentCollector {
    fn kind(&self) -> &'static str {
        "deployment"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let items = api.list_deployments(ctx.namespace()).await?;
        Ok(items.iter().map(|d| deployment_record(d, ctx)).collect())
    }
}

fn deployment_record(deployment: &Deployment, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        DEPLOYMENT_MEASUREMENT,
        "deployment_name",
        &deployment.metadata,
        ctx,
    );
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();
    let strategy = spec.and_then(|s| s.strategy.as_ref());
    let rolling = strategy.and_then(|s| s.rolling_update.as_ref());

    record.set_field("replicas", status.and_then(|s| s.replicas).unwrap_or(0));
    record.set_field(
        "up_dated",
        status.and_then(|s| s.updated_replicas).unwrap_or(0),
    );
    record.set_field("ready", status.and_then(|s| s.ready_replicas).unwrap_or(0));
    record.set_field(
        "available",
        status.and_then(|s| s.available_replicas).unwrap_or(0),
    );
    record.set_field(
        "unavailable",
        status.and_then(|s| s.unavailable_replicas).unwrap_or(0),
    );
    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    record.set_field(
        "max_surge",
        scaled_value(rolling.and_then(|r| r.max_surge.as_ref()), desired, true),
    );
    record.set_field(
        "max_unavailable",
        scaled_value(rolling.and_then(|r| r.max_unavailable.as_ref()), desired, false),
    );
    record.set_field(
        "strategy",
        strategy
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| "RollingUpdate".to_string()),
    );

    finish(record, ctx)
}

/// Resolve an int-or-percent rollout bound to a replica count
///
/// Percentages scale against `desired`; surge rounds up and unavailable rounds
/// down, as the deployment controller does. Unparsable text counts as 0.
fn scaled_value(value: Option<&IntOrString>, desired: i32, round_up: bool) -> i64 {
    match value {
        Some(IntOrString::Int(n)) => i64::from(*n),
        Some(IntOrString::String(s)) => match s.strip_suffix('%') {
            Some(percent) => {
                let Ok(percent) = percent.trim().parse::<i64>() else {
                    return 0;
                };
                let scaled = percent * i64::from(desired);
                if round_up {
                    (scaled + 99).div_euclid(100)
                } else {
                    scaled.div_euclid(100)
                }
            }
            None => s.trim().parse().unwrap_or(0),
        },
        None => 0,
    }
}

pub struct DaemonSetCollector;

#[async_trait]
impl Collector for DaemonSetCollector {
    fn kind(&self) -> &'static str {
        "daemonset"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let items = api.list_daemonsets(ctx.namespace()).await?;
        Ok(items.iter().map(|d| daemonset_record(d, ctx)).collect())
    }
}

fn daemonset_record(daemonset: &DaemonSet, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_daemonset",
        "daemonset_name",
        &daemonset.metadata,
        ctx,
    );

    if let Some(status) = daemonset.status.as_ref() {
        record.set_field("desired", status.desired_number_scheduled);
        record.set_field("scheduled", status.current_number_scheduled);
        record.set_field("ready", status.number_ready);
        record.set_field("available", status.number_available.unwrap_or(0));
        record.set_field("unavailable", status.number_unavailable.unwrap_or(0));
        record.set_field("updated", status.updated_number_scheduled.unwrap_or(0));
        record.set_field("misscheduled", status.number_misscheduled);
    } else {
        for key in [
            "desired",
            "scheduled",
            "ready",
            "available",
            "unavailable",
            "updated",
            "misscheduled",
        ] {
            record.set_field(key, 0);
        }
    }

    finish(record, ctx)
}

pub struct ReplicaSetCollector;

#[async_trait]
impl Collector for ReplicaSetCollector {
    fn kind(&self) -> &'static str {
        "replicaset"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let items = api.list_replicasets(ctx.namespace()).await?;
        Ok(items.iter().map(|r| replicaset_record(r, ctx)).collect())
    }
}

fn replicaset_record(replicaset: &ReplicaSet, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_replica_sets",
        "replica_set_name",
        &replicaset.metadata,
        ctx,
    );
    if let Some((key, owner)) = types::owner(&replicaset.metadata) {
        record.set_tag(key, owner);
    }

    let status = replicaset.status.as_ref();
    record.set_field("replicas", status.map(|s| s.replicas).unwrap_or(0));
    record.set_field("ready", status.and_then(|s| s.ready_replicas).unwrap_or(0));
    record.set_field(
        "available",
        status.and_then(|s| s.available_replicas).unwrap_or(0),
    );

    finish(record, ctx)
}

pub struct StatefulSetCollector;

#[async_trait]
impl Collector for StatefulSetCollector {
    fn kind(&self) -> &'static str {
        "statefulset"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let items = api.list_statefulsets(ctx.namespace()).await?;
        Ok(items.iter().map(|s| statefulset_record(s, ctx)).collect())
    }
}

fn statefulset_record(statefulset: &StatefulSet, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_statefulsets",
        "statefulset_name",
        &statefulset.metadata,
        ctx,
    );

    let status = statefulset.status.as_ref();
    record.set_field("replicas", status.map(|s| s.replicas).unwrap_or(0));
    record.set_field("ready", status.and_then(|s| s.ready_replicas).unwrap_or(0));
    record.set_field(
        "current",
        status.and_then(|s| s.current_replicas).unwrap_or(0),
    );
    record.set_field(
        "updated",
        status.and_then(|s| s.updated_replicas).unwrap_or(0),
    );

    finish(record, ctx)
}
