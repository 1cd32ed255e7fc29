//! Exhaustive-search engine that stands in for an ANN index.
//!
//! Handles start at 1 and freed handles are reused, so callers see the same
//! allocation behaviour a graph index gives them. Search is exact, which makes
//! `epsilon` irrelevant; it is accepted and ignored.

use crate::domain::error::DomainError;
use crate::domain::ports::vector_engine::VectorEngine;
use crate::domain::values::handle::Handle;
use crate::domain::values::vector::{check_dimension, euclidean};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

const INDEX_FILE: &str = "flat-index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlatState {
    dimension: Option<usize>,
    /// Slot `i` holds the vector for handle `i + 1`.
    slots: Vec<Option<Vec<f64>>>,
    #[serde(skip)]
    free: Vec<Handle>,
}

impl FlatState {
    fn slot(&self, handle: Handle) -> Option<&Vec<f64>> {
        let idx = (handle as usize).checked_sub(1)?;
        self.slots.get(idx)?.as_ref()
    }

    fn rebuild_free_list(&mut self) {
        self.free = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| (i + 1) as Handle)
            .rev()
            .collect();
    }
}

pub struct FlatIndex {
    state: RwLock<FlatState>,
    path: Option<PathBuf>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> DomainError {
    DomainError::BackendUnavailable(format!("index lock poisoned: {e}"))
}

impl FlatIndex {
    /// Volatile index; `save_index` is a no-op.
    pub fn in_memory(dimension: Option<usize>) -> Self {
        Self {
            state: RwLock::new(FlatState {
                dimension,
                ..FlatState::default()
            }),
            path: None,
        }
    }

    /// Opens the index stored under `dir`, or starts an empty one there.
    /// A configured `dimension` must agree with a stored one.
    pub fn open(dir: &Path, dimension: Option<usize>) -> Result<Self, DomainError> {
        let file = dir.join(INDEX_FILE);
        let mut state = if file.exists() {
            let raw = std::fs::read(&file)
                .map_err(|e| DomainError::BackendUnavailable(format!("{}: {e}", file.display())))?;
            let state: FlatState = serde_json::from_slice(&raw)
                .map_err(|e| DomainError::Decode(format!("{}: {e}", file.display())))?;
            info!(path = %file.display(), vectors = state.slots.iter().filter(|s| s.is_some()).count(), "index loaded");
            state
        } else {
            FlatState::default()
        };

        match (state.dimension, dimension) {
            (Some(stored), Some(wanted)) if stored != wanted => {
                return Err(DomainError::DimensionMismatch {
                    expected: stored,
                    actual: wanted,
                })
            }
            (None, Some(wanted)) => state.dimension = Some(wanted),
            _ => {}
        }
        state.rebuild_free_list();

        Ok(Self {
            state: RwLock::new(state),
            path: Some(dir.to_path_buf()),
        })
    }

    /// Number of live vectors.
    pub fn len(&self) -> Result<usize, DomainError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.slots.iter().filter(|v| v.is_some()).count())
    }

    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len()? == 0)
    }
}

impl VectorEngine for FlatIndex {
    fn insert(&self, vector: &[f64]) -> Result<Handle, DomainError> {
        let mut state = self.state.write().map_err(poisoned)?;
        match state.dimension {
            Some(d) => check_dimension(d, vector)?,
            None if vector.is_empty() => {
                return Err(DomainError::InvalidInput("vector must not be empty".into()))
            }
            None => state.dimension = Some(vector.len()),
        }

        let handle = match state.free.pop() {
            Some(h) => {
                state.slots[(h - 1) as usize] = Some(vector.to_vec());
                h
            }
            None => {
                let next = state.slots.len() + 1;
                let handle = Handle::try_from(next)
                    .map_err(|_| DomainError::InvalidInput("index is full".into()))?;
                state.slots.push(Some(vector.to_vec()));
                handle
            }
        };
        debug!(handle, "vector inserted");
        Ok(handle)
    }

    fn remove(&self, handle: Handle) -> Result<(), DomainError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let slot = (handle as usize)
            .checked_sub(1)
            .and_then(|idx| state.slots.get_mut(idx))
            .filter(|s| s.is_some())
            .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))?;
        *slot = None;
        state.free.push(handle);
        Ok(())
    }

    fn search(
        &self,
        vector: &[f64],
        k: usize,
        _epsilon: f32,
    ) -> Result<Vec<(Handle, f32)>, DomainError> {
        let state = self.state.read().map_err(poisoned)?;
        if let Some(d) = state.dimension {
            check_dimension(d, vector)?;
        }
        let mut hits: Vec<(Handle, f32)> = state
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .map(|stored| ((i + 1) as Handle, euclidean(vector, stored)))
            })
            .collect();
        // NaN distances rank after every real one and tie among themselves.
        hits.sort_by(|a, b| {
            let by_distance = match (a.1.is_nan(), b.1.is_nan()) {
                (false, false) => a.1.total_cmp(&b.1),
                (a_nan, b_nan) => a_nan.cmp(&b_nan),
            };
            by_distance.then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn get_vector(&self, handle: Handle) -> Result<Vec<f64>, DomainError> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .slot(handle)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
    }

    fn dimension(&self) -> Option<usize> {
        self.state.read().ok().and_then(|s| s.dimension)
    }

    fn create_index(&self, pool_size: usize) -> Result<(), DomainError> {
        // Exhaustive search has no structure to build.
        debug!(pool_size, vectors = self.len()?, "create_index");
        Ok(())
    }

    fn save_index(&self) -> Result<(), DomainError> {
        let Some(dir) = &self.path else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| DomainError::BackendUnavailable(format!("{}: {e}", dir.display())))?;
        let state = self.state.read().map_err(poisoned)?;
        let raw = serde_json::to_vec(&*state)
            .map_err(|e| DomainError::BackendUnavailable(format!("index encode: {e}")))?;
        let file = dir.join(INDEX_FILE);
        std::fs::write(&file, raw)
            .map_err(|e| DomainError::BackendUnavailable(format!("{}: {e}", file.display())))?;
        info!(path = %file.display(), "index saved");
        Ok(())
    }
}
