use crate::domain::error::DomainError;
use crate::domain::values::handle::Handle;

/// Bidirectional mapping between external ids and engine handles.
///
/// Implementations keep a forward table (id -> handle) and an inverse table
/// (handle -> id) that change together: after `set` returns `Ok`, both
/// lookups agree; after it returns `Err`, the caller must not assume either
/// table was touched without re-checking.
pub trait MappingStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    fn get_handle(&self, id: &[u8]) -> Result<Handle, DomainError>;

    fn get_id(&self, handle: Handle) -> Result<Vec<u8>, DomainError>;

    /// Batch form of [`get_id`](Self::get_id). Output is positionally aligned
    /// with `handles`; any missing handle fails the whole batch with `NotFound`.
    fn get_ids(&self, handles: &[Handle]) -> Result<Vec<Vec<u8>>, DomainError> {
        handles.iter().map(|h| self.get_id(*h)).collect()
    }

    /// Binds `id` to `handle`. Rebinding an id to a new handle replaces its old
    /// inverse entry; binding a handle already owned by another id is a `Conflict`.
    fn set(&self, id: &[u8], handle: Handle) -> Result<(), DomainError>;

    /// Removes both directions of the mapping for `id`.
    fn delete(&self, id: &[u8]) -> Result<(), DomainError>;

    /// Releases backend resources. Calls after `close` are unspecified.
    fn close(&self) -> Result<(), DomainError>;
}
