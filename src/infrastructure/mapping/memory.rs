use crate::domain::error::DomainError;
use crate::domain::ports::mapping_store::MappingStore;
use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::Handle;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    forward: HashMap<Vec<u8>, Handle>,
    inverse: HashMap<Handle, Vec<u8>>,
}

/// Process-local mapping store. Both tables sit behind one lock so a `set`
/// or `delete` is never half-visible to readers.
#[derive(Default)]
pub struct MemoryMappingStore {
    tables: RwLock<Tables>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.tables.read().map_err(poisoned)?.forward.len())
    }

    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> DomainError {
    DomainError::BackendUnavailable(format!("memory store lock poisoned: {e}"))
}

impl MappingStore for MemoryMappingStore {
    fn name(&self) -> &str {
        "inmem"
    }

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .forward
            .get(id)
            .copied()
            .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))
    }

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .inverse
            .get(&handle)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("handle {handle}")))
    }

    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        // One read guard for the whole batch so it sees a single snapshot.
        let tables = self.tables.read().map_err(poisoned)?;
        handles
            .iter()
            .map(|h| {
                tables
                    .inverse
                    .get(h)
                    .cloned()
                    .ok_or_else(|| DomainError::NotFound(format!("handle {h}")))
            })
            .collect()
    }

    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if let Some(owner) = tables.inverse.get(&handle) {
            if owner.as_slice() != id {
                return Err(DomainError::Conflict(format!(
                    "handle {handle} already bound to {}",
                    display_id(owner)
                )));
            }
        }
        if let Some(previous) = tables.forward.insert(id.to_vec(), handle) {
            if previous != handle {
                tables.inverse.remove(&previous);
            }
        }
        tables.inverse.insert(handle, id.to_vec());
        Ok(())
    }

    fn delete(&self, id: &[u8]) -> Result<(), DomainError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let handle = tables
            .forward
            .remove(id)
            .ok_or_else(|| DomainError::NotFound(format!("id {}", display_id(id))))?;
        tables.inverse.remove(&handle);
        Ok(())
    }

    fn close(&self) -> Result<(), DomainError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.forward.clear();
        tables.inverse.clear();
        Ok(())
    }
}
