//! Flash interface trait
//!
//! This module defines the Flash storage interface that platform implementations must provide.
//! The flash-backed key-value engine persists committed settings through it.

use crate::platform::Result;

/// Flash interface trait
///
/// Platform implementations must provide this interface for Flash read/write/erase operations.
///
/// # Flash Characteristics
///
/// - Flash is organized in blocks (typically 4 KB)
/// - Erase operations set all bytes to 0xFF
/// - Write operations can only change bits from 1→0 (must erase first to reset to 1)
/// - Flash operations are blocking and can take 100ms+
///
/// # Safety Invariants
///
/// - Flash peripheral must be initialized before use
/// - Only one owner per Flash instance (the engine serializes access behind its lock)
/// - Must not erase/write firmware region (implementations must validate addresses)
pub trait FlashInterface: Send {
    /// Read `buf.len()` bytes starting at `address`
    ///
    /// # Errors
    ///
    /// Returns `FlashError::InvalidAddress` if the range is out of bounds.
    /// Returns `FlashError::ReadFailed` if the read operation fails.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `address`
    ///
    /// The target region must have been erased first.
    ///
    /// # Errors
    ///
    /// Returns `FlashError::InvalidAddress` if the range is in the firmware region or out of bounds.
    /// Returns `FlashError::WriteFailed` if the write operation fails.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<()>;

    /// Erase `size` bytes starting at `address` (sets them to 0xFF)
    ///
    /// # Errors
    ///
    /// Returns `FlashError::InvalidAddress` if the address or size is not block-aligned
    /// or touches the firmware region.
    /// Returns `FlashError::EraseFailed` if the erase operation fails.
    fn erase(&mut self, address: u32, size: u32) -> Result<()>;

    /// Minimum erasable unit size
    fn block_size(&self) -> u32;

    /// Total Flash capacity in bytes
    fn capacity(&self) -> u32;
}
