//! Blob encodings for strings and record arrays
//!
//! These byte layouts are shared with previously persisted data and must not
//! change:
//!
//! - string: UTF-8 bytes followed by one `0x00` terminator
//! - record array: raw concatenation of `count * size_of::<T>()` bytes in
//!   native layout, with no stored count or element size

use bytemuck::Pod;

/// Terminator appended to every stored string
pub const STRING_TERMINATOR: u8 = 0;

/// Stored length of `value` (content plus terminator)
pub fn string_blob_len(value: &str) -> usize {
    value.len() + 1
}

/// Write `value` and its terminator into `out`
///
/// Returns the number of bytes written, or `None` if `out` is too short.
pub fn encode_string(value: &str, out: &mut [u8]) -> Option<usize> {
    let len = string_blob_len(value);
    if out.len() < len {
        return None;
    }
    out[..value.len()].copy_from_slice(value.as_bytes());
    out[value.len()] = STRING_TERMINATOR;
    Some(len)
}

/// Strip the terminator from a stored string blob
///
/// Only the final byte is removed, so NUL bytes inside the content survive.
/// Returns `None` if the blob is empty, lacks the terminator or is not UTF-8.
pub fn decode_string(blob: &[u8]) -> Option<&str> {
    let (&last, content) = blob.split_last()?;
    if last != STRING_TERMINATOR {
        return None;
    }
    core::str::from_utf8(content).ok()
}

/// View a record slice as its stored bytes
pub fn records_as_bytes<T: Pod>(records: &[T]) -> &[u8] {
    bytemuck::cast_slice(records)
}

/// View a record slice as a mutable byte buffer to load into
pub fn records_as_bytes_mut<T: Pod>(records: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(records)
}
