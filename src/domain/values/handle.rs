//! Engine-assigned handles and their byte encoding.
//!
//! Every byte-backed mapping store writes handles as a fixed-width 4-byte
//! little-endian integer, so a record written by one backend reads back
//! identically through any other.

use crate::domain::error::DomainError;

/// Dense integer the vector engine assigns to a stored vector.
pub type Handle = u32;

pub const HANDLE_WIDTH: usize = 4;

pub fn encode_handle(handle: Handle) -> [u8; HANDLE_WIDTH] {
    handle.to_le_bytes()
}

pub fn decode_handle(bytes: &[u8]) -> Result<Handle, DomainError> {
    let raw: [u8; HANDLE_WIDTH] = bytes.try_into().map_err(|_| {
        DomainError::Decode(format!(
            "handle must be {HANDLE_WIDTH} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(Handle::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_little_endian() {
        assert_eq!(encode_handle(1), [1, 0, 0, 0]);
        assert_eq!(encode_handle(0x0102_0304), [4, 3, 2, 1]);
    }

    #[test]
    fn test_decode_powers_of_two_and_neighbours() {
        let mut i: u64 = 1;
        while i <= u32::MAX as u64 {
            for h in [i - 1, i, (i + 1).min(u32::MAX as u64)] {
                let h = h as Handle;
                assert_eq!(decode_handle(&encode_handle(h)).unwrap(), h);
            }
            i <<= 1;
        }
        assert_eq!(decode_handle(&encode_handle(u32::MAX)).unwrap(), u32::MAX);
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        assert!(matches!(decode_handle(&[1, 2, 3]), Err(DomainError::Decode(_))));
        assert!(matches!(decode_handle(&[0; 8]), Err(DomainError::Decode(_))));
    }
}
