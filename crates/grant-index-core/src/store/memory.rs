//! In-memory [`VectorStore`] implementation for tests and local runs.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over the records matching the filter,
//! ties broken by id so results are deterministic.
//!
//! The store counts upstream calls and can be told to fail specific calls,
//! which is how batching and partial-failure behaviour is tested. Per-call
//! batch sizes are kept only by a store built with
//! [`InMemoryVectorStore::recording`], so a long-running `memory` provider
//! does not accumulate a log.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{VectorMatch, VectorRecord};

use super::{QueryRequest, VectorStore};

#[derive(Default)]
struct CallLog {
    upsert_count: usize,
    delete_count: usize,
    queries: usize,
    /// Batch sizes, filled only when recording.
    upserts: Vec<usize>,
    deletes: Vec<usize>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
    calls: Mutex<CallLog>,
    failing_upserts: Mutex<HashSet<usize>>,
    failing_deletes: Mutex<HashSet<usize>>,
    record_batches: bool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also keeps the batch size of every write and delete
    /// call, for [`upsert_calls`](Self::upsert_calls) and
    /// [`delete_calls`](Self::delete_calls).
    pub fn recording() -> Self {
        Self {
            record_batches: true,
            ..Self::default()
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().unwrap().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// All stored ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.records.read().unwrap().keys().cloned().collect()
    }

    /// Batch sizes of every upsert call so far, in call order. Always
    /// empty unless the store is [`recording`](Self::recording).
    pub fn upsert_calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().upserts.clone()
    }

    /// Batch sizes of every delete call so far, in call order; see
    /// [`upsert_calls`](Self::upsert_calls).
    pub fn delete_calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().deletes.clone()
    }

    pub fn query_calls(&self) -> usize {
        self.calls.lock().unwrap().queries
    }

    /// Make the `n`-th upsert call (0-based, counted over the store's
    /// lifetime) fail without writing anything.
    pub fn fail_upsert_call(&self, n: usize) {
        self.failing_upserts.lock().unwrap().insert(n);
    }

    /// Make the `n`-th delete call (0-based) fail without deleting.
    pub fn fail_delete_call(&self, n: usize) {
        self.failing_deletes.lock().unwrap().insert(n);
    }

    /// Write records directly, bypassing call accounting.
    pub fn seed(&self, records: impl IntoIterator<Item = VectorRecord>) {
        let mut map = self.records.write().unwrap();
        for r in records {
            map.insert(r.id.clone(), r);
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            if self.record_batches {
                calls.upserts.push(records.len());
            }
            calls.upsert_count += 1;
            calls.upsert_count - 1
        };
        if self.failing_upserts.lock().unwrap().contains(&call) {
            bail!("injected upsert failure on call {}", call);
        }
        let mut map = self.records.write().unwrap();
        for r in records {
            map.insert(r.id.clone(), r.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<VectorMatch>> {
        self.calls.lock().unwrap().queries += 1;
        let map = self.records.read().unwrap();
        let mut matches: Vec<VectorMatch> = map
            .values()
            .filter(|r| request.filter.matches(&r.metadata))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(&request.vector, &r.embedding),
                metadata: request.include_metadata.then(|| r.metadata.clone()),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            if self.record_batches {
                calls.deletes.push(ids.len());
            }
            calls.delete_count += 1;
            calls.delete_count - 1
        };
        if self.failing_deletes.lock().unwrap().contains(&call) {
            bail!("injected delete failure on call {}", call);
        }
        let mut map = self.records.write().unwrap();
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }
}
