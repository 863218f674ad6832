//! Mock Flash implementation for testing
//!
//! Provides in-memory Flash simulation for unit tests.

use crate::platform::{FlashError, FlashInterface, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Flash block size (4 KB)
pub const BLOCK_SIZE: u32 = 4096;

/// Flash capacity (1 MB)
pub const FLASH_CAPACITY: u32 = 1024 * 1024;

/// Protected firmware region (first 256 KB)
pub const FIRMWARE_SIZE: u32 = 0x40000;

#[derive(Debug)]
struct FlashState {
    /// Flash storage (initialized to 0xFF - erased state)
    storage: Vec<u8>,
    /// Erase count per block (for wear validation)
    erase_counts: Vec<u32>,
    /// Number of successful write calls
    write_count: u32,
    /// Next write only half-completes
    power_loss: bool,
    /// Next write fails outright
    fail_write: bool,
    /// Next erase fails outright
    fail_erase: bool,
}

/// Mock Flash implementation
///
/// Simulates Flash storage in memory. Clones share the same chip, so a test
/// can drop a storage engine and mount a fresh one on the same contents to
/// simulate a reboot. Supports:
/// - Read/write/erase operations with 1→0 write semantics
/// - Corruption injection for testing error handling
/// - Erase count tracking
/// - Power-loss and hard-failure simulation
///
/// # Example
///
/// ```
/// use nvs_settings::platform::mock::MockFlash;
/// use nvs_settings::platform::traits::FlashInterface;
///
/// let mut flash = MockFlash::new();
///
/// // Erase a block
/// flash.erase(0x040000, 4096).unwrap();
///
/// // Write data
/// let data = [0x4E, 0x56, 0x53, 0x53]; // "NVSS" magic
/// flash.write(0x040000, &data).unwrap();
///
/// // Read back
/// let mut buf = [0u8; 4];
/// flash.read(0x040000, &mut buf).unwrap();
/// assert_eq!(buf, data);
///
/// // Check erase count
/// assert_eq!(flash.get_erase_count(0x040000), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockFlash {
    state: Arc<Mutex<FlashState>>,
}

impl MockFlash {
    /// Create a new mock Flash instance
    pub fn new() -> Self {
        let block_count = (FLASH_CAPACITY / BLOCK_SIZE) as usize;
        Self {
            state: Arc::new(Mutex::new(FlashState {
                storage: vec![0xFF; FLASH_CAPACITY as usize],
                erase_counts: vec![0; block_count],
                write_count: 0,
                power_loss: false,
                fail_write: false,
                fail_erase: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlashState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get Flash contents (for test verification)
    pub fn get_contents(&self, address: u32, len: usize) -> Vec<u8> {
        let state = self.lock();
        state.storage[address as usize..(address as usize + len)].to_vec()
    }

    /// Inject corruption at address (for testing error recovery)
    pub fn inject_corruption(&self, address: u32, len: usize) {
        let mut state = self.lock();
        for byte in &mut state.storage[address as usize..address as usize + len] {
            *byte = 0xAA; // Corrupt pattern
        }
    }

    /// Overwrite raw bytes, bypassing 1→0 write semantics
    pub fn poke(&self, address: u32, data: &[u8]) {
        let mut state = self.lock();
        state.storage[address as usize..address as usize + data.len()].copy_from_slice(data);
    }

    /// Number of times the block containing `address` was erased
    pub fn get_erase_count(&self, address: u32) -> u32 {
        let block_id = (address / BLOCK_SIZE) as usize;
        self.lock().erase_counts[block_id]
    }

    /// Total erase count across all blocks
    pub fn get_total_erase_count(&self) -> u32 {
        self.lock().erase_counts.iter().sum()
    }

    /// Number of write calls that reached the array
    pub fn get_write_count(&self) -> u32 {
        self.lock().write_count
    }

    /// The next write will only partially complete
    pub fn simulate_power_loss(&self) {
        self.lock().power_loss = true;
    }

    /// The next write will fail with `WriteFailed`
    pub fn fail_next_write(&self) {
        self.lock().fail_write = true;
    }

    /// The next erase will fail with `EraseFailed`
    pub fn fail_next_erase(&self) {
        self.lock().fail_erase = true;
    }

    /// Check if address is in writable region
    fn is_writable(address: u32) -> bool {
        (FIRMWARE_SIZE..FLASH_CAPACITY).contains(&address)
    }
}

impl Default for MockFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashInterface for MockFlash {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        if address as usize + buf.len() > FLASH_CAPACITY as usize {
            return Err(FlashError::InvalidAddress.into());
        }

        let state = self.lock();
        buf.copy_from_slice(&state.storage[address as usize..(address as usize + buf.len())]);

        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if !Self::is_writable(address) {
            return Err(FlashError::InvalidAddress.into());
        }

        if address as usize + data.len() > FLASH_CAPACITY as usize {
            return Err(FlashError::InvalidAddress.into());
        }

        let mut state = self.lock();

        if state.fail_write {
            state.fail_write = false;
            return Err(FlashError::WriteFailed.into());
        }

        // Simulate power loss (partial write)
        let write_len = if state.power_loss {
            state.power_loss = false;
            data.len() / 2
        } else {
            data.len()
        };

        // Flash can only change bits from 1→0
        let start = address as usize;
        for (cell, byte) in state.storage[start..start + write_len]
            .iter_mut()
            .zip(data)
        {
            *cell &= *byte;
        }
        state.write_count += 1;

        Ok(())
    }

    fn erase(&mut self, address: u32, size: u32) -> Result<()> {
        if !Self::is_writable(address) {
            return Err(FlashError::InvalidAddress.into());
        }

        if !address.is_multiple_of(BLOCK_SIZE) || !size.is_multiple_of(BLOCK_SIZE) {
            return Err(FlashError::InvalidAddress.into());
        }

        if address as u64 + size as u64 > FLASH_CAPACITY as u64 {
            return Err(FlashError::InvalidAddress.into());
        }

        let mut state = self.lock();

        if state.fail_erase {
            state.fail_erase = false;
            return Err(FlashError::EraseFailed.into());
        }

        let start = address as usize;
        state.storage[start..start + size as usize].fill(0xFF);

        let start_block = (address / BLOCK_SIZE) as usize;
        for count in &mut state.erase_counts[start_block..start_block + (size / BLOCK_SIZE) as usize] {
            *count += 1;
        }

        Ok(())
    }

    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn capacity(&self) -> u32 {
        FLASH_CAPACITY
    }
}
