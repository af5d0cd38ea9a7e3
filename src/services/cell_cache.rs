// Cell-Result Cache
// Purpose: persistent per-cell store of scored results, dual schema
// Design: v1 and v2 live in separate stores with separate files; no in-place
// schema migration. A background flusher persists dirty state on an interval.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{CellRecordV1, CellRecordV2};
use crate::utils::ScheduledTask;

pub const V1_FILE: &str = "h3_cache.json";
pub const V2_FILE: &str = "h3_cache_v2.json";

/// Record types that know their own cell key
pub trait CellKeyed {
    fn cell_key(&self) -> &str;
}

impl CellKeyed for CellRecordV1 {
    fn cell_key(&self) -> &str {
        &self.h3_index
    }
}

impl CellKeyed for CellRecordV2 {
    fn cell_key(&self) -> &str {
        &self.h3_index
    }
}

/// One schema's persistent store.
///
/// The concurrent map mediates per-key access: a reader sees either the old
/// or the new record for a cell, never a torn one. At most one record per
/// cell; `set` replaces.
pub struct CellStore<R> {
    path: PathBuf,
    map: DashMap<String, R>,
    dirty: AtomicBool,
}

impl<R> CellStore<R>
where
    R: CellKeyed + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load the store from disk. A missing file starts empty; a malformed
    /// file warns and starts empty.
    pub fn load(path: PathBuf) -> Self {
        let map = DashMap::new();

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<R>>(&content) {
                Ok(records) => {
                    for record in records {
                        map.insert(record.cell_key().to_string(), record);
                    }
                    tracing::info!("Loaded {} cell records from {:?}", map.len(), path);
                },
                Err(e) => {
                    tracing::warn!("Cell cache {:?} is malformed, starting empty: {}", path, e);
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No cell cache at {:?}, starting empty", path);
            },
            Err(e) => {
                tracing::warn!("Cell cache {:?} unreadable, starting empty: {}", path, e);
            },
        }

        Self { path, map, dirty: AtomicBool::new(false) }
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.map.get(id).map(|entry| entry.value().clone())
    }

    pub fn set(&self, record: R) {
        self.map.insert(record.cell_key().to_string(), record);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// One option per input id, in input order
    pub fn get_multi(&self, ids: &[String]) -> Vec<Option<R>> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Serialize the full map to disk when dirty. Write errors leave the
    /// dirty flag set so the next flush retries.
    pub fn flush(&self) -> anyhow::Result<()> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        let records: Vec<R> = self.map.iter().map(|entry| entry.value().clone()).collect();
        let serialized = serde_json::to_string(&records)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // write-then-rename so a crashed flush never truncates the live file
        let tmp_path = self.path.with_extension("json.tmp");
        let result = std::fs::write(&tmp_path, serialized)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));

        if let Err(e) = result {
            self.dirty.store(true, Ordering::Relaxed);
            return Err(e.into());
        }

        tracing::debug!("Flushed {} cell records to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// Both schema stores behind the handles the orchestrator and handlers use
pub struct CellCache {
    v1: CellStore<CellRecordV1>,
    v2: CellStore<CellRecordV2>,
}

impl CellCache {
    pub fn open(data_dir: &str) -> Self {
        let dir = Path::new(data_dir);
        Self {
            v1: CellStore::load(dir.join(V1_FILE)),
            v2: CellStore::load(dir.join(V2_FILE)),
        }
    }

    /// v1 lookups key on the cell id alone
    pub fn get_v1(&self, id: &str) -> Option<CellRecordV1> {
        self.v1.get(id)
    }

    pub fn get_multi_v1(&self, ids: &[String]) -> Vec<Option<CellRecordV1>> {
        self.v1.get_multi(ids)
    }

    /// v2 lookups additionally require an exact data-timestamp match; a
    /// record computed for a different timestamp is a miss
    pub fn get_v2(&self, id: &str, timestamp: &str) -> Option<CellRecordV2> {
        self.v2.get(id).filter(|record| record.timestamp == timestamp)
    }

    pub fn get_multi_v2(&self, ids: &[String], timestamp: &str) -> Vec<Option<CellRecordV2>> {
        ids.iter().map(|id| self.get_v2(id, timestamp)).collect()
    }

    /// Store a freshly computed record in both schemas: the v2 store keeps
    /// the full distributions, the v1 store the flattened legacy view
    pub fn put(&self, record: CellRecordV2) {
        self.v1.set(record.to_v1());
        self.v2.set(record);
    }

    pub fn len_v1(&self) -> usize {
        self.v1.len()
    }

    pub fn len_v2(&self) -> usize {
        self.v2.len()
    }

    pub fn flush_all(&self) -> anyhow::Result<()> {
        self.v1.flush()?;
        self.v2.flush()?;
        Ok(())
    }
}

/// The background flusher drives both stores through one executor
impl ScheduledTask for CellCache {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.flush_all() })
    }
}
