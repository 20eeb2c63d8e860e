//! Reverse tag index: (metric, tag key, tag value) -> set of row keys.
//!
//! Built incrementally on write, never rebuilt wholesale. The index is a
//! derived structure and is never authoritative: it may reference rows that
//! have since been emptied (those resolve to empty results), but it must never
//! omit a row that still holds matching columns.

use crate::error::EngineError;
use crate::rowkey::RowKey;
use crate::types::TagSet;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// One index entry address. `tag: None` is the per-metric wildcard entry that
/// tracks every row key ever indexed for the metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    metric: String,
    tag: Option<(String, String)>,
}

/// In-memory reverse index guarded by an `RwLock` so the engine API can stay
/// `&self` while writes and deletes mutate entries concurrently.
#[derive(Debug, Default)]
pub struct TagIndex {
    entries: RwLock<HashMap<IndexKey, BTreeSet<RowKey>>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` under its metric's wildcard entry and under every tag
    /// pair of the row. Idempotent: repeated insertion is observably a no-op.
    pub fn index_row(&self, key: &RowKey) -> Result<(), EngineError> {
        let mut guard = self.entries.write()?;
        guard
            .entry(IndexKey {
                metric: key.metric().to_string(),
                tag: None,
            })
            .or_default()
            .insert(key.clone());
        for (tag_key, tag_value) in key.tags() {
            guard
                .entry(IndexKey {
                    metric: key.metric().to_string(),
                    tag: Some((tag_key.clone(), tag_value.clone())),
                })
                .or_default()
                .insert(key.clone());
        }
        Ok(())
    }

    /// Resolves a metric plus tag filter to the candidate row-key set.
    ///
    /// An empty filter returns the wildcard entry. Otherwise the result is the
    /// intersection over all (key, value) pairs in the filter (AND semantics);
    /// a pair unknown to the index empties the whole result. Each filter key
    /// carries exactly one required value.
    pub fn resolve(&self, metric: &str, tag_filter: &TagSet) -> Result<BTreeSet<RowKey>, EngineError> {
        let guard = self.entries.read()?;

        if tag_filter.is_empty() {
            let wildcard = IndexKey {
                metric: metric.to_string(),
                tag: None,
            };
            return Ok(guard.get(&wildcard).cloned().unwrap_or_default());
        }

        let mut resolved: Option<BTreeSet<RowKey>> = None;
        for (tag_key, tag_value) in tag_filter {
            let entry = guard.get(&IndexKey {
                metric: metric.to_string(),
                tag: Some((tag_key.clone(), tag_value.clone())),
            });
            let rows = match entry {
                Some(rows) => rows,
                None => return Ok(BTreeSet::new()),
            };
            resolved = Some(match resolved {
                None => rows.clone(),
                Some(acc) => acc.intersection(rows).cloned().collect(),
            });
        }
        Ok(resolved.unwrap_or_default())
    }

    /// Removes `key` from every entry it appears in. Called by the delete path
    /// once a row has been fully removed from the store.
    pub fn prune(&self, key: &RowKey) -> Result<(), EngineError> {
        let mut guard = self.entries.write()?;
        guard.retain(|_, rows| {
            rows.remove(key);
            !rows.is_empty()
        });
        Ok(())
    }
}
