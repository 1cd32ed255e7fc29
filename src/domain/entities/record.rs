use crate::domain::values::external_id::display_id;
use crate::domain::values::handle::Handle;
use serde::{Serialize, Serializer};

/// One side of the id/handle bijection as it exists in the mapping store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub external_id: Vec<u8>,
    pub handle: Handle,
}

/// A search result resolved back to its external id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(serialize_with = "serialize_id")]
    pub id: Vec<u8>,
    pub distance: f32,
}

/// A parsed ingestion record: external id plus its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IdVector {
    pub id: Vec<u8>,
    pub vector: Vec<f64>,
}

fn serialize_id<S: Serializer>(id: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&display_id(id))
}
