use crate::domain::entities::record::IdVector;
use crate::domain::error::DomainError;

/// Lazy, finite stream of raw ingestion records.
///
/// `Ok(None)` signals end of input. An `Err` is a record-level failure; the
/// reader stays usable and the next call moves past the faulty record.
pub trait RecordReader: Send {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, DomainError>;
}

/// Decodes one raw record into an id and a vector.
pub trait RecordParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<IdVector, DomainError>;
}
