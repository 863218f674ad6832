//! Flash image format
//!
//! A committed store is written as one image into a single flash block:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Magic: u32 = "NVSS"                           │  Offset: 0
//! │ Version: u16                                  │  Offset: 4
//! │ Reserved: u16                                 │  Offset: 6
//! │ Sequence: u32 (newest image wins)             │  Offset: 8
//! │ Payload length: u32                           │  Offset: 12
//! ├───────────────────────────────────────────────┤
//! │ Entries                                       │  Offset: 16
//! │   ns_len: u8, namespace bytes                 │
//! │   key_len: u8, key bytes                      │
//! │   kind: u8 (EntryKind tag)                    │
//! │   data_len: u16, data bytes                   │
//! ├───────────────────────────────────────────────┤
//! │ CRC32 (ISO-HDLC) over header + entries        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{Result, StorageError};
use crate::name::validate_name;
use crate::value::EntryKind;

/// Image magic number (ASCII "NVSS")
pub const IMAGE_MAGIC: u32 = 0x5353_564E;

/// Image format version
pub const FORMAT_VERSION: u16 = 1;

/// Size of the CRC32 trailer
pub const CRC_SIZE: usize = 4;

/// Largest blob a single entry can carry
pub const MAX_ENTRY_DATA: usize = u16::MAX as usize;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u32,
    pub version: u16,
    pub reserved: u16,
    pub sequence: u32,
    pub payload_len: u32,
}

impl ImageHeader {
    /// Size of header in bytes
    pub const SIZE: usize = 16;

    /// Header for a current-version image
    pub fn new(sequence: u32, payload_len: u32) -> Self {
        Self {
            magic: IMAGE_MAGIC,
            version: FORMAT_VERSION,
            reserved: 0,
            sequence,
            payload_len,
        }
    }

    /// Serialize header to bytes (little-endian)
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.reserved.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Deserialize header bytes without validating them
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            magic: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            version: u16::from_le_bytes([buf[4], buf[5]]),
            reserved: u16::from_le_bytes([buf[6], buf[7]]),
            sequence: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload_len: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// True if the header area is still in the erased (all `0xFF`) state
pub fn is_erased(buf: &[u8]) -> bool {
    buf.iter().take(ImageHeader::SIZE).all(|&b| b == 0xFF)
}

/// Serializes entries into a caller-provided block buffer
pub struct ImageWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> ImageWriter<'a> {
    /// Start an image in `buf`
    ///
    /// Fails with `NotEnoughSpace` if `buf` cannot hold an empty image.
    pub fn new(buf: &'a mut [u8]) -> Result<Self> {
        if buf.len() < ImageHeader::SIZE + CRC_SIZE {
            return Err(StorageError::NotEnoughSpace);
        }
        Ok(Self {
            buf,
            offset: ImageHeader::SIZE,
        })
    }

    /// Append one entry
    pub fn push(&mut self, namespace: &str, key: &str, kind: EntryKind, data: &[u8]) -> Result<()> {
        validate_name(namespace)?;
        validate_name(key)?;
        if data.len() > MAX_ENTRY_DATA {
            return Err(StorageError::NotEnoughSpace);
        }

        let needed = 1 + namespace.len() + 1 + key.len() + 1 + 2 + data.len();
        if self.offset + needed + CRC_SIZE > self.buf.len() {
            return Err(StorageError::NotEnoughSpace);
        }

        let mut at = self.offset;
        self.buf[at] = namespace.len() as u8;
        at += 1;
        self.buf[at..at + namespace.len()].copy_from_slice(namespace.as_bytes());
        at += namespace.len();
        self.buf[at] = key.len() as u8;
        at += 1;
        self.buf[at..at + key.len()].copy_from_slice(key.as_bytes());
        at += key.len();
        self.buf[at] = kind as u8;
        at += 1;
        self.buf[at..at + 2].copy_from_slice(&(data.len() as u16).to_le_bytes());
        at += 2;
        self.buf[at..at + data.len()].copy_from_slice(data);
        at += data.len();

        self.offset = at;
        Ok(())
    }

    /// Write header and CRC, returning the total image length
    pub fn finish(self, sequence: u32) -> usize {
        let payload_len = (self.offset - ImageHeader::SIZE) as u32;
        let header = ImageHeader::new(sequence, payload_len);
        self.buf[..ImageHeader::SIZE].copy_from_slice(&header.to_bytes());

        let crc = CRC32.checksum(&self.buf[..self.offset]);
        self.buf[self.offset..self.offset + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        self.offset + CRC_SIZE
    }
}

/// One entry borrowed from an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub namespace: &'a str,
    pub key: &'a str,
    pub kind: EntryKind,
    pub data: &'a [u8],
}

/// A validated image
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    pub header: ImageHeader,
    payload: &'a [u8],
}

impl<'a> Image<'a> {
    /// Validate magic, version, bounds and CRC of the image at the start of `buf`
    ///
    /// A foreign magic or a bad CRC yields `Corrupted`; the right magic with
    /// another format version yields `NewVersionFound`.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let header = ImageHeader::from_bytes(buf).ok_or(StorageError::Corrupted)?;
        if header.magic != IMAGE_MAGIC {
            return Err(StorageError::Corrupted);
        }
        if header.version != FORMAT_VERSION {
            return Err(StorageError::NewVersionFound);
        }

        let payload_len = header.payload_len as usize;
        let end = ImageHeader::SIZE
            .checked_add(payload_len)
            .ok_or(StorageError::Corrupted)?;
        if end + CRC_SIZE > buf.len() {
            return Err(StorageError::Corrupted);
        }

        let stored_crc = u32::from_le_bytes([buf[end], buf[end + 1], buf[end + 2], buf[end + 3]]);
        if CRC32.checksum(&buf[..end]) != stored_crc {
            return Err(StorageError::Corrupted);
        }

        Ok(Self {
            header,
            payload: &buf[ImageHeader::SIZE..end],
        })
    }

    /// Iterate entries in write order
    pub fn entries(&self) -> Entries<'a> {
        Entries {
            payload: self.payload,
            offset: 0,
        }
    }
}

/// Entry iterator; yields `Err(Corrupted)` once and stops on malformed data
pub struct Entries<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> Entries<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let bytes = self.payload.get(self.offset..end)?;
        self.offset = end;
        Some(bytes)
    }

    fn take_str(&mut self) -> Option<&'a str> {
        let len = *self.take(1)?.first()? as usize;
        let bytes = self.take(len)?;
        let s = core::str::from_utf8(bytes).ok()?;
        validate_name(s).ok()?;
        Some(s)
    }

    fn next_entry(&mut self) -> Option<EntryRef<'a>> {
        let namespace = self.take_str()?;
        let key = self.take_str()?;
        let kind = EntryKind::from_u8(*self.take(1)?.first()?)?;
        let len_bytes = self.take(2)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let data = self.take(len)?;
        if let Some(size) = kind.fixed_size() {
            if size != data.len() {
                return None;
            }
        }
        Some(EntryRef {
            namespace,
            key,
            kind,
            data,
        })
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<EntryRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            return None;
        }
        match self.next_entry() {
            Some(entry) => Some(Ok(entry)),
            None => {
                self.offset = self.payload.len();
                Some(Err(StorageError::Corrupted))
            }
        }
    }
}
