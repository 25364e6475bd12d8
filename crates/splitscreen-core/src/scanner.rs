//! Masked signature scanning over a loaded module.
//!
//! The region is read in chunks that overlap by `pattern.len() - 1` bytes so
//! a match straddling a chunk boundary is still seen. A chunk that cannot be
//! read as a whole is rescanned position by position through
//! [`MemoryAccess::compare_masked`], which never faults. Positions are always
//! visited from low to high and the first match wins.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::{Address, MemoryAccess, ModuleRegion};
use crate::signature::{Displacement, SignaturePattern};

/// Bytes of match positions covered by one chunk read.
pub const SCAN_CHUNK_SIZE: u64 = 0x10000;

pub struct ModuleScanner<'a, M: MemoryAccess + ?Sized> {
    memory: &'a M,
    region: &'a ModuleRegion,
    chunk_size: u64,
}

impl<'a, M: MemoryAccess + ?Sized> ModuleScanner<'a, M> {
    pub fn new(memory: &'a M, region: &'a ModuleRegion) -> Self {
        Self {
            memory,
            region,
            chunk_size: SCAN_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn region(&self) -> &ModuleRegion {
        self.region
    }

    /// Offset from the region base of the lowest matching position.
    pub fn find_match(&self, pattern: &SignaturePattern) -> Option<u64> {
        let len = pattern.len() as u64;
        if len > self.region.size {
            return None;
        }
        let last = self.region.size - len;

        let mut buffer = Vec::new();
        let mut start = 0u64;
        while start <= last {
            let chunk_last = (start + self.chunk_size - 1).min(last);
            let positions = (chunk_last - start) as usize + 1;
            buffer.resize(positions + pattern.len() - 1, 0);

            let address = self.region.base + start;
            match self.memory.read_into(address, &mut buffer) {
                Ok(()) => {
                    if let Some(i) = search_buffer(&buffer, pattern, positions) {
                        return Some(start + i as u64);
                    }
                }
                Err(_) => {
                    debug!(
                        "Chunk at 0x{:X} unreadable, comparing {} positions individually",
                        address, positions
                    );
                    if let Some(i) = (start..=chunk_last)
                        .find(|&i| self.memory.compare_masked(self.region.base + i, pattern))
                    {
                        return Some(i);
                    }
                }
            }

            start = chunk_last + 1;
        }
        None
    }

    /// Find `pattern` and return the match address, or the decoded
    /// displacement target when the pattern carries one.
    pub fn find_pattern(&self, pattern: &SignaturePattern) -> Result<Address> {
        let offset = self
            .find_match(pattern)
            .ok_or_else(|| Error::PatternNotFound(pattern.to_string()))?;
        let match_address = self.region.base + offset;
        debug!("  Pattern matched at 0x{:X}", match_address);

        match pattern.displacement() {
            Some(displacement) => self.decode(match_address, displacement),
            None => Ok(match_address),
        }
    }

    fn decode(&self, match_address: Address, displacement: Displacement) -> Result<Address> {
        let disp_address = match_address + displacement.offset as u64;
        let disp = self.memory.read_i32(disp_address).inspect_err(|e| {
            warn!("Failed to read displacement at 0x{:X}: {}", disp_address, e);
        })?;
        Ok(resolve_relative(
            match_address,
            displacement.instruction_length,
            disp,
        ))
    }
}

/// Absolute target of a RIP-relative operand: the address after the
/// instruction plus the signed displacement.
pub fn resolve_relative(match_address: Address, instruction_length: usize, disp: i32) -> Address {
    (match_address + instruction_length as u64).wrapping_add_signed(disp as i64)
}

fn search_buffer(buffer: &[u8], pattern: &SignaturePattern, positions: usize) -> Option<usize> {
    let Some((anchor, byte)) = pattern.anchor() else {
        return (positions > 0).then_some(0);
    };

    memchr::memchr_iter(byte, &buffer[anchor..])
        .take_while(|&p| p < positions)
        .find(|&p| pattern.matches(&buffer[p..]))
}
