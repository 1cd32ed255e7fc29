use crate::domain::error::DomainError;
use crate::domain::values::handle::Handle;

/// The similarity-search engine that owns vectors and allocates handles.
///
/// Engines are not expected to tolerate concurrent mutation; callers funnel
/// `insert`/`remove` through a single lane (see `VectorService`).
pub trait VectorEngine: Send + Sync {
    /// Stores `vector` and returns a handle that is not currently live.
    fn insert(&self, vector: &[f64]) -> Result<Handle, DomainError>;

    fn remove(&self, handle: Handle) -> Result<(), DomainError>;

    /// Up to `k` `(handle, distance)` pairs, ascending by distance.
    /// `epsilon` is the engine's approximate-search slack.
    fn search(&self, vector: &[f64], k: usize, epsilon: f32)
        -> Result<Vec<(Handle, f32)>, DomainError>;

    fn get_vector(&self, handle: Handle) -> Result<Vec<f64>, DomainError>;

    /// Fixed dimensionality, or `None` until the first insert fixes it.
    fn dimension(&self) -> Option<usize>;

    /// Builds the search structure using `pool_size` workers.
    fn create_index(&self, pool_size: usize) -> Result<(), DomainError>;

    /// Persists the index wherever the engine was configured to keep it.
    fn save_index(&self) -> Result<(), DomainError>;
}
