use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::quantity;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};

pub struct PersistentVolumeCollector;

#[async_trait]
impl Collector for PersistentVolumeCollector {
    fn kind(&self) -> &'static str {
        "persistentvolume"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let volumes = api.list_persistent_volumes().await?;
        Ok(volumes.iter().map(|pv| volume_record(pv, ctx)).collect())
    }
}

fn volume_record(volume: &PersistentVolume, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_persistentvolumes",
        "persistentvolume_name",
        &volume.metadata,
        ctx,
    );
    let spec = volume.spec.as_ref();

    record.set_tag(
        "phase",
        volume
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown"),
    );
    record.set_tag(
        "storage_class",
        spec.and_then(|s| s.storage_class_name.as_deref())
            .unwrap_or(""),
    );

    record.set_field(
        "capacity",
        quantity::bytes(
            spec.and_then(|s| s.capacity.as_ref())
                .and_then(|c| c.get("storage")),
        ),
    );
    record.set_field(
        "access_modes",
        spec.and_then(|s| s.access_modes.as_ref())
            .map(|m| m.join(","))
            .unwrap_or_default(),
    );
    record.set_field(
        "reclaim_policy",
        spec.and_then(|s| s.persistent_volume_reclaim_policy.clone())
            .unwrap_or_default(),
    );
    let claim = spec
        .and_then(|s| s.claim_ref.as_ref())
        .map(|c| {
            format!(
                "{}/{}",
                c.namespace.as_deref().unwrap_or(""),
                c.name.as_deref().unwrap_or("")
            )
        })
        .unwrap_or_default();
    record.set_field("claim", claim);

    finish(record, ctx)
}

pub struct PersistentVolumeClaimCollector;

#[async_trait]
impl Collector for PersistentVolumeClaimCollector {
    fn kind(&self) -> &'static str {
        "persistentvolumeclaim"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let claims = api.list_persistent_volume_claims(ctx.namespace()).await?;
        Ok(claims.iter().map(|pvc| claim_record(pvc, ctx)).collect())
    }
}

fn claim_record(claim: &PersistentVolumeClaim, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_persistentvolumeclaims",
        "persistentvolumeclaim_name",
        &claim.metadata,
        ctx,
    );
    let spec = claim.spec.as_ref();
    let status = claim.status.as_ref();

    record.set_tag(
        "phase",
        status.and_then(|s| s.phase.as_deref()).unwrap_or("Unknown"),
    );
    record.set_tag(
        "storage_class",
        spec.and_then(|s| s.storage_class_name.as_deref())
            .unwrap_or(""),
    );
    record.set_tag(
        "volume_name",
        spec.and_then(|s| s.volume_name.as_deref()).unwrap_or(""),
    );

    record.set_field(
        "requested",
        quantity::bytes(
            spec.and_then(|s| s.resources.as_ref())
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("storage")),
        ),
    );
    record.set_field(
        "capacity",
        quantity::bytes(
            status
                .and_then(|s| s.capacity.as_ref())
                .and_then(|c| c.get("storage")),
        ),
    );
    record.set_field(
        "access_modes",
        spec.and_then(|s| s.access_modes.as_ref())
            .map(|m| m.join(","))
            .unwrap_or_default(),
    );

    finish(record, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;
    use datakit_common::FieldValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_volume_and_claim() {
        let cluster = InMemoryCluster::new();
        cluster.add_persistent_volume(
            serde_json::from_value(json!({
                "metadata": {"name": "pv-1", "uid": "pv-uid"},
                "spec": {
                    "capacity": {"storage": "10Gi"},
                    "accessModes": ["ReadWriteOnce"],
                    "persistentVolumeReclaimPolicy": "Retain",
                    "storageClassName": "standard",
                    "claimRef": {"namespace": "db", "name": "data"}
                },
                "status": {"phase": "Bound"}
            }))
            .unwrap(),
        );
        cluster.add_persistent_volume_claim(
            serde_json::from_value(json!({
                "metadata": {"name": "data", "namespace": "db"},
                "spec": {
                    "accessModes": ["ReadWriteOnce"],
                    "resources": {"requests": {"storage": "not-a-size"}},
                    "volumeName": "pv-1"
                },
                "status": {"phase": "Bound", "capacity": {"storage": "10Gi"}}
            }))
            .unwrap(),
        );

        let ctx = CollectContext::default();
        let volumes = PersistentVolumeCollector.collect(&cluster, &ctx).await.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].tag("phase"), Some("Bound"));
        assert_eq!(volumes[0].field("capacity"), Some(&FieldValue::Int(10 * 1024 * 1024 * 1024)));
        assert_eq!(volumes[0].field("claim"), Some(&FieldValue::Str("db/data".to_string())));

        let claims = PersistentVolumeClaimCollector.collect(&cluster, &ctx).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].tag("volume_name"), Some("pv-1"));
        assert_eq!(claims[0].field("requested"), Some(&FieldValue::Int(0)));
        assert_eq!(claims[0].field("capacity"), Some(&FieldValue::Int(10 * 1024 * 1024 * 1024)));
    }
}
