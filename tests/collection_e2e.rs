mod common;

use datakit::io::MemoryFeeder;
use datakit::k8s::InMemoryCluster;
use datakit::kubernetes::pod::POD_MEASUREMENT;
use datakit::kubernetes::summary::SUMMARY_MEASUREMENT;
use datakit::kubernetes::workload::DEPLOYMENT_MEASUREMENT;
use datakit::kubernetes::{default_collectors, Runner, SOURCE_NAME};
use datakit::{Category, FieldValue};
use std::collections::BTreeMap;
use std::sync::Arc;

fn two_namespace_cluster() -> Arc<InMemoryCluster> {
    let cluster = Arc::new(InMemoryCluster::new());
    for ns in ["shop", "billing"] {
        cluster.add_namespace(common::namespace(ns));
        cluster.add_deployment(common::deployment(ns, "web"));
        cluster.add_pod(common::pod(ns, "web-5d9f-a", "web", "Running"));
        cluster.add_pod(common::pod(ns, "web-5d9f-b", "web", "Running"));
        cluster.add_pod(common::pod(ns, "web-5d9f-c", "web", "Pending"));
    }
    cluster
}

#[tokio::test]
async fn test_one_tick_over_two_namespaces() {
    let cluster = two_namespace_cluster();
    let feeder = Arc::new(MemoryFeeder::new());
    let mut tags = BTreeMap::new();
    tags.insert("cluster".to_string(), "test".to_string());

    let runner = Runner::new(cluster, feeder.clone(), default_collectors()).with_tags(tags);
    let report = runner.tick().await;
    assert!(report.last_error.is_none());

    let deployments = feeder.records_named(DEPLOYMENT_MEASUREMENT);
    assert_eq!(deployments.len(), 2);

    let pods = feeder.records_named(POD_MEASUREMENT);
    assert_eq!(pods.len(), 6);
    let running = pods
        .iter()
        .filter(|p| p.tag("status") == Some("Running"))
        .count();
    let pending = pods
        .iter()
        .filter(|p| p.tag("status") == Some("Pending"))
        .count();
    assert_eq!((running, pending), (4, 2));
    for pod in &pods {
        assert_eq!(pod.tag("deployment"), Some("web"));
        assert_eq!(pod.tag("cluster"), Some("test"));
        assert_eq!(pod.tag("name"), pod.tag("uid"));
    }

    let summaries = feeder.records_named(SUMMARY_MEASUREMENT);
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.field("pod"), Some(&FieldValue::Int(3)));
        assert_eq!(summary.field("deployment"), Some(&FieldValue::Int(1)));
        assert_eq!(summary.field("container"), Some(&FieldValue::Int(3)));
    }

    // objects and summaries go out as separate batches with one shared cost
    let batches = feeder.batches();
    assert!(batches.iter().all(|b| b.source == SOURCE_NAME));
    assert_eq!(feeder.records_in(Category::Metric).len(), 2);
    assert_eq!(
        feeder.records_in(Category::Object).len(),
        // 2 namespaces + 2 deployments + 6 pods
        10
    );
}

#[tokio::test]
async fn test_records_map_one_to_one_with_objects() {
    let cluster = two_namespace_cluster();
    let feeder = Arc::new(MemoryFeeder::new());
    let runner = Runner::new(cluster, feeder.clone(), default_collectors())
        .only_kinds(&["pod".to_string()]);

    let report = runner.collect_once().await;
    let uids: std::collections::BTreeSet<&str> = report
        .named(POD_MEASUREMENT)
        .iter()
        .filter_map(|r| r.tag("uid"))
        .collect();
    assert_eq!(uids.len(), 6);
    // collect_once does not feed
    assert!(feeder.batches().is_empty());
}

#[tokio::test]
async fn test_partial_namespace_failure_omits_only_endpoints() {
    let cluster = two_namespace_cluster();
    cluster.fail_listing("endpoints", Some("shop"));

    let feeder = Arc::new(MemoryFeeder::new());
    let runner = Runner::new(cluster, feeder.clone(), default_collectors())
        .only_kinds(&["namespace_summary".to_string()]);
    let report = runner.tick().await;
    assert!(report.last_error.is_none());

    let summaries = feeder.records_named(SUMMARY_MEASUREMENT);
    let shop = summaries
        .iter()
        .find(|r| r.tag("namespace") == Some("shop"))
        .unwrap();
    let billing = summaries
        .iter()
        .find(|r| r.tag("namespace") == Some("billing"))
        .unwrap();

    assert_eq!(shop.field("endpoints"), None);
    assert_eq!(shop.field("pod"), Some(&FieldValue::Int(3)));
    assert_eq!(shop.field("deployment"), Some(&FieldValue::Int(1)));
    assert_eq!(billing.field("endpoints"), Some(&FieldValue::Int(0)));
}

#[tokio::test]
async fn test_failed_kind_reported_as_last_error() {
    let cluster = two_namespace_cluster();
    cluster.fail_listing("deployments", None);

    let feeder = Arc::new(MemoryFeeder::new());
    let runner = Runner::new(cluster, feeder.clone(), default_collectors());
    let report = runner.tick().await;

    assert!(feeder.records_named(DEPLOYMENT_MEASUREMENT).is_empty());
    assert_eq!(feeder.records_named(POD_MEASUREMENT).len(), 6);
    // summaries still come out, just without the deployment count
    let summaries = feeder.records_named(SUMMARY_MEASUREMENT);
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.field("deployment").is_none()));

    assert!(report.last_error.unwrap().starts_with("deployment:"));
    assert_eq!(feeder.last_errors().len(), 1);
}
