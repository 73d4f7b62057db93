//! Cluster event watcher
//!
//! Runs the list-then-watch cycle as an explicit state machine:
//! `Disconnected -> Listing -> Watching -> Disconnected`. Listing only fixes
//! the resource-version cursor; existing events are never emitted. Each
//! `Added`/`Modified` event read from the watch becomes one Logging record.

use crate::io::{FeedOption, Feeder};
use crate::k8s::api::{EventApi, StreamEvent};
use crate::k8s::types;
use chrono::{DateTime, Utc};
use datakit_common::{Category, Record};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const EVENT_MEASUREMENT: &str = "kubernetes_events";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Disconnected,
    Listing,
    Watching { resource_version: String },
}

/// Delay before the next reconnect attempt
pub trait Backoff: Send + Sync {
    fn next_delay(&mut self) -> Duration;
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Default for FixedBackoff {
    fn default() -> Self {
        Self(Duration::from_secs(1))
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.0
    }

    fn reset(&mut self) {}
}

pub struct EventWatcher {
    api: Arc<dyn EventApi>,
    feeder: Arc<dyn Feeder>,
    source: String,
    extra_tags: BTreeMap<String, String>,
    backoff: Box<dyn Backoff>,
    state: WatchState,
    /// Newest resource version emitted so far, when versions are numeric
    high_water: Option<u64>,
    emitted: u64,
}

impl EventWatcher {
    pub fn new(api: Arc<dyn EventApi>, feeder: Arc<dyn Feeder>, source: &str) -> Self {
        Self {
            api,
            feeder,
            source: source.to_string(),
            extra_tags: BTreeMap::new(),
            backoff: Box::new(FixedBackoff::default()),
            state: WatchState::Disconnected,
            high_water: None,
            emitted: 0,
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.extra_tags = tags;
        self
    }

    pub fn with_backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Records fed since the watcher was created
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Loop until `cancel` fires; retries forever
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(source = %self.source, "Starting event watcher");
        let mut first_attempt = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.state.clone() {
                WatchState::Disconnected => {
                    if !first_attempt {
                        let delay = self.backoff.next_delay();
                        debug!(?delay, "Event watch disconnected, retrying");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    first_attempt = false;
                    self.state = WatchState::Listing;
                }
                WatchState::Listing => match self.api.list_events().await {
                    Ok(snapshot) => {
                        debug!(
                            resource_version = %snapshot.resource_version,
                            existing = snapshot.count,
                            "Event baseline established"
                        );
                        self.state = WatchState::Watching {
                            resource_version: snapshot.resource_version,
                        };
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to list events");
                        self.feeder.feed_last_error(&self.source, &e.to_string());
                        self.state = WatchState::Disconnected;
                    }
                },
                WatchState::Watching { resource_version } => {
                    self.watch(&resource_version, &cancel).await;
                    self.state = WatchState::Disconnected;
                }
            }
        }

        info!(source = %self.source, emitted = self.emitted, "Event watcher stopped");
    }

    async fn watch(&mut self, resource_version: &str, cancel: &CancellationToken) {
        let mut stream = match self.api.watch_events(resource_version).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, resource_version, "Failed to open event watch");
                self.feeder.feed_last_error(&self.source, &e.to_string());
                return;
            }
        };
        self.backoff.reset();

        let baseline = resource_version.parse::<u64>().ok();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return,
                item = stream.next() => item,
            };

            match item {
                None => {
                    debug!("Event watch stream closed");
                    return;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Event watch stream failed");
                    return;
                }
                Some(Ok(StreamEvent::Error(message))) => {
                    warn!(%message, "Event watch returned an error");
                    return;
                }
                Some(Ok(StreamEvent::Added(event))) | Some(Ok(StreamEvent::Modified(event))) => {
                    self.emit(&event, baseline);
                }
                Some(Ok(StreamEvent::Deleted(_))) | Some(Ok(StreamEvent::Bookmark(_))) => {}
            }
        }
    }

    fn emit(&mut self, event: &Event, baseline: Option<u64>) {
        let version = event
            .metadata
            .resource_version
            .as_deref()
            .and_then(|rv| rv.parse::<u64>().ok());

        if let Some(rv) = version {
            if baseline.is_some_and(|b| rv < b) || self.high_water.is_some_and(|h| rv <= h) {
                debug!(resource_version = rv, "Skipping already seen event");
                return;
            }
            self.high_water = Some(rv);
        }

        let record = event_record(event, &self.extra_tags);
        match self.feeder.feed(
            &self.source,
            Category::Logging,
            vec![record],
            &FeedOption::default(),
        ) {
            Ok(()) => self.emitted += 1,
            Err(e) => warn!(error = %e, "Failed to feed event record"),
        }
    }
}

/// Logging record for one event; `message` holds the full event body
pub fn event_record(event: &Event, extra_tags: &BTreeMap<String, String>) -> Record {
    let involved = &event.involved_object;
    let namespace = involved
        .namespace
        .as_deref()
        .unwrap_or_else(|| types::namespace(&event.metadata));

    let mut record = Record::new(EVENT_MEASUREMENT, event_time(event))
        .with_tag("kind", involved.kind.as_deref().unwrap_or(""))
        .with_tag("name", involved.name.as_deref().unwrap_or(""))
        .with_tag("namespace", namespace)
        .with_tag("uid", types::uid(&event.metadata))
        .with_tag(
            "node_name",
            event
                .source
                .as_ref()
                .and_then(|s| s.host.as_deref())
                .unwrap_or(""),
        )
        .with_tag("type", event.type_.as_deref().unwrap_or(""))
        .with_tag("reason", event.reason.as_deref().unwrap_or(""))
        .with_field("count", event.count.unwrap_or(1))
        .with_field(
            "event_message",
            event.message.clone().unwrap_or_default(),
        );
    record.merge_tags(extra_tags);

    record.set_message_body(serde_json::to_string(event).unwrap_or_default());
    record
}

fn event_time(event: &Event) -> DateTime<Utc> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFeeder;
    use crate::k8s::InMemoryCluster;
    use datakit_common::{MAX_MESSAGE_LEN, MESSAGE_FIELD};
    use serde_json::json;

    fn event(rv: &str, reason: &str) -> Box<Event> {
        Box::new(
            serde_json::from_value(json!({
                "metadata": {"name": format!("ev-{}", rv), "namespace": "default", "resourceVersion": rv, "uid": format!("e-{}", rv)},
                "involvedObject": {"kind": "Pod", "name": "web-0", "namespace": "default"},
                "reason": reason,
                "type": "Warning",
                "message": "Back-off restarting failed container",
                "count": 3,
                "source": {"host": "node-a"},
                "lastTimestamp": "2024-03-01T10:00:00Z"
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_event_record_tags() {
        let record = event_record(&event("7", "BackOff"), &BTreeMap::new());
        assert_eq!(record.name, EVENT_MEASUREMENT);
        assert_eq!(record.tag("kind"), Some("Pod"));
        assert_eq!(record.tag("name"), Some("web-0"));
        assert_eq!(record.tag("node_name"), Some("node-a"));
        assert_eq!(record.tag("reason"), Some("BackOff"));
        assert_eq!(record.tag("type"), Some("Warning"));
        assert_eq!(record.timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");

        let body = record.field(MESSAGE_FIELD).and_then(|m| m.as_str()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["involvedObject"]["name"], "web-0");
    }

    #[test]
    fn test_oversized_event_body_is_capped() {
        let mut big = event("8", "BackOff");
        big.message = Some("x".repeat(400 * 1024));

        let record = event_record(&big, &BTreeMap::new());
        let body = record.field(MESSAGE_FIELD).and_then(|m| m.as_str()).unwrap();
        assert_eq!(body.len(), MAX_MESSAGE_LEN);
        // the readable message field keeps the full text
        assert_eq!(
            record.field("event_message").and_then(|m| m.as_str()).map(str::len),
            Some(400 * 1024)
        );
    }

    #[tokio::test]
    async fn test_ignores_deleted_and_bookmarks() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.push_event_session(
            "10",
            vec![
                Ok(StreamEvent::Added(event("11", "Scheduled"))),
                Ok(StreamEvent::Deleted(event("12", "Killing"))),
                Ok(StreamEvent::Bookmark("13".to_string())),
                Ok(StreamEvent::Modified(event("14", "BackOff"))),
            ],
        );
        let feeder = Arc::new(MemoryFeeder::new());
        let mut watcher = EventWatcher::new(cluster.clone(), feeder.clone(), "kubernetes")
            .with_backoff(Box::new(FixedBackoff(Duration::from_millis(5))));

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(async move {
            watcher.run(stop).await;
            watcher
        });

        for _ in 0..200 {
            if feeder.records().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        let watcher = handle.await.unwrap();

        let reasons: Vec<String> = feeder
            .records_in(Category::Logging)
            .iter()
            .filter_map(|r| r.tag("reason").map(str::to_string))
            .collect();
        assert_eq!(reasons, vec!["Scheduled", "BackOff"]);
        assert_eq!(watcher.emitted(), 2);
    }

    #[tokio::test]
    async fn test_cancel_while_disconnected() {
        let cluster = Arc::new(InMemoryCluster::new());
        let feeder = Arc::new(MemoryFeeder::new());
        let mut watcher = EventWatcher::new(cluster, feeder.clone(), "kubernetes")
            .with_backoff(Box::new(FixedBackoff(Duration::from_secs(3600))));

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let handle = tokio::spawn(async move { watcher.run(stop).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();

        // listing failed once with no session scripted
        assert_eq!(feeder.last_errors().len(), 1);
    }
}
