//! In-memory feeder that keeps every batch it receives

use super::{FeedOption, Feeder};
use crate::Result;
use datakit_common::{Category, Record};
use std::sync::Mutex;

/// One captured `feed` call
#[derive(Debug, Clone)]
pub struct FedBatch {
    pub source: String,
    pub category: Category,
    pub records: Vec<Record>,
    pub option: FeedOption,
}

#[derive(Default)]
pub struct MemoryFeeder {
    batches: Mutex<Vec<FedBatch>>,
    errors: Mutex<Vec<(String, String)>>,
}

impl MemoryFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<FedBatch> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// All records fed so far, across batches, in feed order
    pub fn records(&self) -> Vec<Record> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.records)
            .collect()
    }

    pub fn records_named(&self, name: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }

    pub fn records_in(&self, category: Category) -> Vec<Record> {
        self.batches()
            .into_iter()
            .filter(|b| b.category == category)
            .flat_map(|b| b.records)
            .collect()
    }

    /// `(source, error)` pairs reported through `feed_last_error`
    pub fn last_errors(&self) -> Vec<(String, String)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut b) = self.batches.lock() {
            b.clear();
        }
        if let Ok(mut e) = self.errors.lock() {
            e.clear();
        }
    }
}

impl Feeder for MemoryFeeder {
    fn feed(
        &self,
        source: &str,
        category: Category,
        records: Vec<Record>,
        option: &FeedOption,
    ) -> Result<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| crate::DatakitError::FeedError("memory feeder poisoned".to_string()))?;

        batches.push(FedBatch {
            source: source.to_string(),
            category,
            records,
            option: option.clone(),
        });
        Ok(())
    }

    fn feed_last_error(&self, source: &str, error: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((source.to_string(), error.to_string()));
        }
    }
}
