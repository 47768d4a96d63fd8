//! In-process event store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use pipeline_core::{Event, EventFilter, NaturalKey};

use crate::error::{StoreError, StoreResult};
use crate::{EventStore, PathCount};

#[derive(Debug, Default)]
struct Inner {
    keys: HashSet<NaturalKey>,
    events: Vec<Event>,
}

/// Events held in memory, deduplicated on their natural key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored event in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.inner.read().events.clone()
    }

    fn matching<'a>(events: &'a [Event], filter: &'a EventFilter) -> impl Iterator<Item = &'a Event> {
        events
            .iter()
            .filter(move |e| filter.matches(&e.site_id, &e.event_type, e.timestamp))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if !inner.keys.insert(event.natural_key()) {
            return Err(StoreError::Duplicate);
        }
        inner.events.push(event.clone());
        Ok(())
    }

    async fn count(&self, filter: &EventFilter) -> StoreResult<u64> {
        let inner = self.inner.read();
        Ok(Self::matching(&inner.events, filter).count() as u64)
    }

    async fn distinct_users(&self, filter: &EventFilter) -> StoreResult<Vec<Option<String>>> {
        let inner = self.inner.read();
        let mut seen = HashSet::new();
        Ok(Self::matching(&inner.events, filter)
            .filter(|e| seen.insert(e.user_id.clone()))
            .map(|e| e.user_id.clone())
            .collect())
    }

    async fn top_paths(&self, filter: &EventFilter, limit: usize) -> StoreResult<Vec<PathCount>> {
        let inner = self.inner.read();
        let mut counts: HashMap<Option<String>, u64> = HashMap::new();
        for event in Self::matching(&inner.events, filter) {
            *counts.entry(event.path.clone()).or_default() += 1;
        }

        let mut paths: Vec<PathCount> = counts
            .into_iter()
            .map(|(path, count)| PathCount { path, count })
            .collect();
        // Count descending, then path ascending with missing paths last
        paths.sort_by(|a, b| {
            b.count.cmp(&a.count).then_with(|| match (&a.path, &b.path) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
        });
        paths.truncate(limit);
        Ok(paths)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
