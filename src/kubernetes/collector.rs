//! Per-kind collection contract and the shared object record builder

use crate::k8s::api::KubeApi;
use crate::k8s::types;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datakit_common::{Category, Record};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Inputs shared by every collector during one tick
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub now: DateTime<Utc>,
    pub extra_tags: BTreeMap<String, String>,
    /// Restrict namespaced listings to one namespace; `None` means all
    pub namespace: Option<String>,
}

impl CollectContext {
    pub fn new(extra_tags: BTreeMap<String, String>) -> Self {
        Self {
            now: Utc::now(),
            extra_tags,
            namespace: None,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl Default for CollectContext {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    /// Short kind name, e.g. `pod` or `deployment`
    fn kind(&self) -> &'static str;

    fn category(&self) -> Category {
        Category::Object
    }

    /// One listing call; one record per returned object
    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>>;
}

/// Base record for one cluster object
///
/// `name` is the object UID so records can be joined across kinds; the
/// human name goes into `name_tag`.
pub(crate) fn object_record(
    measurement: &str,
    name_tag: &str,
    meta: &ObjectMeta,
    ctx: &CollectContext,
) -> Record {
    let mut record = Record::new(measurement, ctx.now)
        .with_tag("name", types::uid(meta))
        .with_tag("uid", types::uid(meta))
        .with_tag(name_tag, types::name(meta))
        .with_field("age", types::age_seconds(meta, ctx.now))
        .with_field("labels", types::labels_json(meta))
        .with_field("annotations", types::annotations_json(meta));

    if let Some(ns) = meta.namespace.as_deref() {
        record.set_tag("namespace", ns);
    }
    record
}

/// Merge operator tags and attach the `message` snapshot
pub(crate) fn finish(mut record: Record, ctx: &CollectContext) -> Record {
    record.merge_tags(&ctx.extra_tags);
    record.with_message()
}
