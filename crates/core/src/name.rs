//! Namespace and key names
//!
//! Names follow NVS rules: 1 to 15 bytes, no NUL byte.

use crate::error::{Result, StorageError};

/// Maximum namespace / key length in bytes
pub const MAX_NAME_LEN: usize = 15;

/// Fixed-capacity namespace or key name
pub type Name = heapless::String<MAX_NAME_LEN>;

/// Check that `name` is usable as a namespace or key
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.bytes().any(|b| b == 0) {
        return Err(StorageError::InvalidName);
    }
    Ok(())
}

/// Validate and copy `name` into a [`Name`]
pub fn to_name(name: &str) -> Result<Name> {
    validate_name(name)?;
    let mut out = Name::new();
    out.push_str(name).map_err(|_| StorageError::InvalidName)?;
    Ok(out)
}
