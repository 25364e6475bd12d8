use std::fmt;

use crate::error::{Error, Result};

/// Location of a RIP-relative displacement inside a matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Displacement {
    /// Byte offset of the 32-bit displacement from the pattern start.
    pub offset: usize,
    /// Bytes from the pattern start to the end of the encoding instruction.
    pub instruction_length: usize,
}

/// A masked byte signature.
///
/// `bytes` and `significant` always have the same non-zero length. When a
/// displacement is attached it lies entirely inside the pattern and inside
/// the instruction that encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePattern {
    bytes: Vec<u8>,
    significant: Vec<bool>,
    displacement: Option<Displacement>,
}

impl SignaturePattern {
    pub fn new(bytes: Vec<u8>, significant: Vec<bool>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("Signature pattern is empty".to_string()));
        }
        if bytes.len() != significant.len() {
            return Err(Error::InvalidPattern(format!(
                "Mask length {} does not match pattern length {}",
                significant.len(),
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            significant,
            displacement: None,
        })
    }

    /// Build from `Some(byte)` / `None` (wildcard) entries.
    pub fn from_masked(masked: &[Option<u8>]) -> Result<Self> {
        let bytes = masked.iter().map(|b| b.unwrap_or(0)).collect();
        let significant = masked.iter().map(Option::is_some).collect();
        Self::new(bytes, significant)
    }

    /// Parse IDA-style text such as `"8B 05 ?? ?? ?? ?? 83 F8 01"`.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_masked(&super::parse_pattern(text)?)
    }

    pub fn with_displacement(mut self, offset: usize, instruction_length: usize) -> Result<Self> {
        if offset + 4 > self.bytes.len() {
            return Err(Error::InvalidPattern(format!(
                "Displacement at {} does not fit in a {}-byte pattern",
                offset,
                self.bytes.len()
            )));
        }
        if instruction_length < offset + 4 {
            return Err(Error::InvalidPattern(format!(
                "Instruction length {} ends before the displacement at {}",
                instruction_length, offset
            )));
        }
        self.displacement = Some(Displacement {
            offset,
            instruction_length,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn significant(&self) -> &[bool] {
        &self.significant
    }

    pub fn displacement(&self) -> Option<Displacement> {
        self.displacement
    }

    /// Whether `window` (at least `len()` bytes) matches every significant byte.
    pub fn matches(&self, window: &[u8]) -> bool {
        window.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&self.significant)
                .zip(window)
                .all(|((&expected, &significant), &actual)| !significant || expected == actual)
    }

    /// First significant byte and its index, used to skip ahead with `memchr`.
    pub fn anchor(&self) -> Option<(usize, u8)> {
        self.significant
            .iter()
            .position(|&s| s)
            .map(|i| (i, self.bytes[i]))
    }
}

impl fmt::Display for SignaturePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<Option<u8>> = self
            .bytes
            .iter()
            .zip(&self.significant)
            .map(|(&b, &s)| s.then_some(b))
            .collect();
        f.write_str(&super::format_pattern(&masked))
    }
}
