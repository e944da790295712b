//! Source text to address-space encoder.
//!
//! A program is a whitespace-separated list of tokens. Each token becomes one
//! cell whose value is the sum of the token's decimal digits, modulo 256:
//!
//! ```text
//! 1 19 4x4 hello 99
//! ```
//!
//! encodes to `[1, 10, 8, 0, 18]`. Characters other than `0`-`9` carry no
//! value, so any text can be used to dress up a program.
//!
//! - Runs of whitespace collapse to a single separator before scanning
//! - Leading whitespace yields one empty token, which encodes as `0`
//! - Trailing whitespace ends the last token without adding another
//! - Cells are written from address 0 upward; the tape pointer starts one cell
//!   past the end of the program

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::memory::{MEMORY_SIZE, Memory};
use crate::{debug, warn};
use std::fmt::Write;
use std::fs;
use std::path::Path;

const SEPARATOR: u8 = b' ';

/// An encoded program: the initial address space plus where the tape starts.
#[derive(Clone, Debug)]
pub struct Image {
    memory: Memory,
    emitted: usize,
    tape_start: u16,
}

impl Image {
    /// Builds an image from raw cell values, as if each byte were one token.
    ///
    /// Bytes past the end of the address space wrap to address 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut memory = Memory::new();
        for (i, b) in bytes.iter().enumerate() {
            memory.set(i as u16, *b);
        }
        Self::new(memory, bytes.len())
    }

    fn new(memory: Memory, emitted: usize) -> Self {
        Self {
            memory,
            emitted,
            tape_start: (emitted as u16).wrapping_add(1),
        }
    }

    /// Returns the initial address space.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Consumes the image and returns its address space.
    pub fn into_memory(self) -> Memory {
        self.memory
    }

    /// Number of cells emitted, one per token.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Initial tape pointer (`emitted + 1`, wrapping).
    pub fn tape_start(&self) -> u16 {
        self.tape_start
    }

    /// Returns the encoded program cells in address order.
    pub fn code(&self) -> &[u8] {
        &self.memory.as_slice()[..self.emitted.min(MEMORY_SIZE)]
    }

    /// Renders the program cells as a hex listing, sixteen cells per line.
    pub fn hex_dump(&self) -> String {
        let mut out = String::new();
        for (row, chunk) in self.code().chunks(16).enumerate() {
            let _ = write!(out, "{:04x}:", row * 16);
            for cell in chunk {
                let _ = write!(out, " {cell:02x}");
            }
            out.push('\n');
        }
        let _ = writeln!(out, "tape start: {:#06x}", self.tape_start);
        out
    }
}

/// Collapses every run of ASCII whitespace into a single space.
pub fn normalize_whitespace(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_space = false;
    for c in source.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Sum of the decimal digits in `token`, modulo 256.
pub fn token_value(token: &[u8]) -> u8 {
    token
        .iter()
        .filter(|b| b.is_ascii_digit())
        .fold(0u8, |acc, b| acc.wrapping_add(b - b'0'))
}

/// Encodes program source into an [`Image`].
pub fn encode(source: &str) -> Image {
    let normalized = normalize_whitespace(source);
    debug!("normalized source: {normalized:?}");

    let bytes = normalized.as_bytes();
    let mut memory = Memory::new();
    let mut emitted = 0usize;
    let mut acc: u8 = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            acc = acc.wrapping_add(b - b'0');
        }
        if b == SEPARATOR || i == bytes.len() - 1 {
            if emitted == MEMORY_SIZE {
                warn!("program exceeds {MEMORY_SIZE} cells; later tokens overwrite from address 0");
            }
            debug!("cell {:#06x} = {}", emitted as u16, acc);
            memory.set(emitted as u16, acc);
            emitted += 1;
            acc = 0;
        }
    }

    Image::new(memory, emitted)
}

/// Reads and encodes a source file.
pub fn encode_file(path: impl AsRef<Path>) -> Result<Image, VMError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .map_err(|e| VMError::IoError(format!("{}: {e}", path.display())))?;
    Ok(encode(&source))
}
