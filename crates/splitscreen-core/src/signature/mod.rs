//! Code signatures for the offsets the mod depends on.
//!
//! Signatures are data: a named entry holds an ordered list of candidate
//! patterns, and the first one that resolves wins.

mod pattern;

pub use pattern::{Displacement, SignaturePattern};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSignature {
    pub pattern: String,
    pub instr_offset: usize,
    pub disp_offset: usize,
    pub instr_len: usize,
}

impl CodeSignature {
    pub fn new(pattern: &str, disp_offset: usize, instr_len: usize) -> Self {
        Self {
            pattern: pattern.to_string(),
            instr_offset: 0,
            disp_offset,
            instr_len,
        }
    }

    pub fn pattern_bytes(&self) -> Result<Vec<Option<u8>>> {
        parse_pattern(&self.pattern)
    }

    /// Compile into a masked pattern with its displacement measured from the pattern start.
    pub fn compile(&self) -> Result<SignaturePattern> {
        SignaturePattern::from_masked(&self.pattern_bytes()?).and_then(|pattern| {
            pattern.with_displacement(
                self.instr_offset + self.disp_offset,
                self.instr_offset + self.instr_len,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSignatureEntry {
    pub name: String,
    pub signatures: Vec<CodeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSignatureSet {
    pub version: String,
    pub entries: Vec<OffsetSignatureEntry>,
}

impl OffsetSignatureSet {
    pub fn entry(&self, name: &str) -> Option<&OffsetSignatureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

/// Signatures for the MCC shipping executables.
pub fn builtin_signatures() -> OffsetSignatureSet {
    let entry = |name: &str, signatures: Vec<CodeSignature>| OffsetSignatureEntry {
        name: name.to_string(),
        signatures,
    };

    OffsetSignatureSet {
        version: "mcc-1.3385".to_string(),
        entries: vec![
            // cmp dword ptr [rip+disp32], 1 ; je rel32
            entry(
                "splitScreenFlag",
                vec![CodeSignature::new(
                    "83 3D ?? ?? ?? ?? 01 0F 84 ?? ?? ?? ??",
                    2,
                    7,
                )],
            ),
            // mov eax, [rip+disp32] ; cmp eax, 1 ; jle rel8
            entry(
                "playerCount",
                vec![CodeSignature::new("8B 05 ?? ?? ?? ?? 83 F8 01 7E ??", 2, 6)],
            ),
            // movups xmm0, [rip+disp32] ; movups [rcx], xmm0 ; movups xmm1, [rip+disp32]
            entry(
                "cameraBase",
                vec![CodeSignature::new(
                    "0F 10 05 ?? ?? ?? ?? 0F 11 01 0F 10 0D ?? ?? ?? ??",
                    3,
                    7,
                )],
            ),
        ],
    }
}

/// Read a signature set written by [`save_signatures`] or edited by hand.
pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<OffsetSignatureSet> {
    let file = fs::File::open(path.as_ref())?;
    let signatures: OffsetSignatureSet = serde_json::from_reader(std::io::BufReader::new(file))?;
    debug!(
        "Loaded signature set {} ({} entries) from {}",
        signatures.version,
        signatures.entries.len(),
        path.as_ref().display()
    );
    Ok(signatures)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, signatures: &OffsetSignatureSet) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(signatures)?)?;
    Ok(())
}

/// Parse IDA-style pattern text; `?` and `??` are wildcards.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let bytes = pattern
        .split_whitespace()
        .map(parse_token)
        .collect::<Result<Vec<_>>>()?;

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("Signature pattern is empty".to_string()));
    }
    Ok(bytes)
}

fn parse_token(token: &str) -> Result<Option<u8>> {
    match token {
        "?" | "??" => Ok(None),
        _ if token.len() == 2 => u8::from_str_radix(token, 16).map(Some).map_err(|e| {
            Error::InvalidPattern(format!("Invalid signature token '{}': {}", token, e))
        }),
        _ => Err(Error::InvalidPattern(format!(
            "Signature token '{}' is not one byte",
            token
        ))),
    }
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match byte {
            Some(value) => out.push_str(&format!("{:02X}", value)),
            None => out.push_str("??"),
        }
    }
    out
}
