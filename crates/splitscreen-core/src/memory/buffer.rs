//! In-memory accessor backed by a byte buffer.
//!
//! Used for offline scans of memory-image dumps and as the accessor in tests.
//! Ranges can be marked unreadable (holes) or write-protected to exercise the
//! fault paths of callers.

use std::ops::Range;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Address, MemoryAccess};
use crate::error::{Error, Result};

pub struct BufferMemory {
    base: Address,
    bytes: Mutex<Vec<u8>>,
    holes: Vec<Range<Address>>,
    protected: Vec<Range<Address>>,
    writes: AtomicUsize,
}

impl BufferMemory {
    pub fn new(base: Address, bytes: Vec<u8>) -> Self {
        Self::builder(base).bytes(bytes).build()
    }

    pub fn builder(base: Address) -> BufferMemoryBuilder {
        BufferMemoryBuilder {
            base,
            bytes: Vec::new(),
            holes: Vec::new(),
            protected: Vec::new(),
        }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful writes performed through this accessor.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrite bytes directly, bypassing holes and protection.
    pub fn poke(&self, address: Address, data: &[u8]) -> Result<()> {
        let mut bytes = self.lock();
        let start = self.index_of(address, data.len(), bytes.len())?;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index_of(&self, address: Address, size: usize, available: usize) -> Result<usize> {
        let start = address.checked_sub(self.base);
        let end = start.and_then(|start| start.checked_add(size as u64));
        match (start, end) {
            (Some(start), Some(end)) if end <= available as u64 => Ok(start as usize),
            _ => Err(Error::InvalidAddress { address }),
        }
    }

    fn overlaps(ranges: &[Range<Address>], address: Address, size: usize) -> bool {
        let end = address.saturating_add(size as u64);
        ranges.iter().any(|r| address < r.end && r.start < end)
    }
}

impl MemoryAccess for BufferMemory {
    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        if Self::overlaps(&self.holes, address, buf.len()) {
            return Err(Error::InvalidAddress { address });
        }
        let bytes = self.lock();
        let start = self.index_of(address, buf.len(), bytes.len())?;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, address: Address, data: &[u8]) -> Result<()> {
        if Self::overlaps(&self.holes, address, data.len()) {
            return Err(Error::InvalidAddress { address });
        }
        if Self::overlaps(&self.protected, address, data.len()) {
            return Err(Error::ProtectionChangeFailed {
                address,
                message: "range is write-protected".to_string(),
            });
        }
        self.poke(address, data)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct BufferMemoryBuilder {
    base: Address,
    bytes: Vec<u8>,
    holes: Vec<Range<Address>>,
    protected: Vec<Range<Address>>,
}

impl BufferMemoryBuilder {
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = bytes;
        self
    }

    /// Zero-filled image of `size` bytes.
    pub fn zeroed(mut self, size: usize) -> Self {
        self.bytes = vec![0; size];
        self
    }

    /// Place `data` at `address`, growing the image if needed.
    pub fn write_at(mut self, address: Address, data: &[u8]) -> Self {
        let start = address.saturating_sub(self.base) as usize;
        let end = start + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        self
    }

    pub fn write_i32(self, address: Address, value: i32) -> Self {
        self.write_at(address, &value.to_le_bytes())
    }

    pub fn write_u64(self, address: Address, value: u64) -> Self {
        self.write_at(address, &value.to_le_bytes())
    }

    /// Make `range` unreadable and unwritable.
    pub fn hole(mut self, range: Range<Address>) -> Self {
        self.holes.push(range);
        self
    }

    /// Make `range` readable but reject writes as a protection failure.
    pub fn protected(mut self, range: Range<Address>) -> Self {
        self.protected.push(range);
        self
    }

    pub fn build(self) -> BufferMemory {
        BufferMemory {
            base: self.base,
            bytes: Mutex::new(self.bytes),
            holes: self.holes,
            protected: self.protected,
            writes: AtomicUsize::new(0),
        }
    }
}
