use crate::domain::error::DomainError;
use crate::domain::ports::record_source::RecordReader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One raw record per line. Line terminators (`\n`, `\r\n`) are stripped and
/// blank lines are skipped.
pub struct TextReader {
    inner: Box<dyn BufRead + Send>,
    buf: Vec<u8>,
}

impl TextReader {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        let file = File::open(path)
            .map_err(|e| DomainError::InvalidInput(format!("{}: {e}", path.display())))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            inner: Box::new(reader),
            buf: Vec::new(),
        }
    }
}

impl RecordReader for TextReader {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, DomainError> {
        loop {
            self.buf.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut self.buf)
                .map_err(|e| DomainError::BackendUnavailable(format!("read error: {e}")))?;
            if n == 0 {
                return Ok(None);
            }
            while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                self.buf.pop();
            }
            if !self.buf.is_empty() {
                return Ok(Some(self.buf.clone()));
            }
        }
    }
}
