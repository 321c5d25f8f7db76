//! Word stream reader.
//!
//! A module is a 5-word header followed by instruction records. The first word
//! of each record packs the word count in its high half and the opcode in its
//! low half. [`Module::parse`] validates the header and [`Module::instructions`]
//! walks the records, checking each declared length against what is left.

use crate::error::{ModuleError, Result};
use crate::op::Op;

/// SPIR-V magic number.
pub const MAGIC: u32 = 0x0723_0203;

/// Number of header words preceding the first instruction.
pub const HEADER_WORDS: usize = 5;

/// Decoded module header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Version word.
    pub version: u32,
    /// Generator magic.
    pub generator: u32,
    /// One past the largest id used in the module.
    pub bound: u32,
}

/// A validated, borrowed bytecode module.
#[derive(Debug, Clone, Copy)]
pub struct Module<'a> {
    words: &'a [u32],
    header: Header,
}

impl<'a> Module<'a> {
    /// Validate the header of `words`.
    pub fn parse(words: &'a [u32]) -> Result<Self> {
        if words.len() < HEADER_WORDS {
            return Err(ModuleError::HeaderTooShort { words: words.len() });
        }
        if words[0] != MAGIC {
            return Err(ModuleError::InvalidMagic { found: words[0] });
        }
        Ok(Self {
            words,
            header: Header {
                version: words[1],
                generator: words[2],
                bound: words[3],
            },
        })
    }

    /// Module header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Raw words, header included.
    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    /// Iterate instruction records after the header.
    pub fn instructions(&self) -> Instructions<'a> {
        Instructions {
            words: self.words,
            offset: HEADER_WORDS,
            failed: false,
        }
    }

    /// Collect every instruction, failing on the first malformed record.
    pub fn collect_instructions(&self) -> Result<Vec<Instruction<'a>>> {
        self.instructions().collect()
    }
}

/// Iterator over instruction records.
///
/// Yields an error once and then stops if a record is malformed.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    words: &'a [u32],
    offset: usize,
    failed: bool,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.words.len() {
            return None;
        }
        let offset = self.offset;
        let first = self.words[offset];
        let count = (first >> 16) as usize;
        let opcode = (first & 0xffff) as u16;

        if count == 0 {
            self.failed = true;
            return Some(Err(ModuleError::ZeroWordCount { offset }));
        }
        let available = self.words.len() - offset;
        if count > available {
            self.failed = true;
            return Some(Err(ModuleError::Truncated {
                offset,
                needed: count,
                available,
            }));
        }

        self.offset += count;
        Some(Ok(Instruction {
            opcode,
            operands: &self.words[offset + 1..offset + count],
            offset,
        }))
    }
}

/// One instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Raw opcode.
    pub opcode: u16,
    /// Operand words (the record without its first word).
    pub operands: &'a [u32],
    /// Word offset of the record inside the module.
    pub offset: usize,
}

impl<'a> Instruction<'a> {
    /// Known opcode, if any.
    pub fn op(&self) -> Option<Op> {
        Op::from_word(self.opcode)
    }

    /// Operand `index`, bounds-checked.
    pub fn word(&self, index: usize) -> Result<u32> {
        self.operands
            .get(index)
            .copied()
            .ok_or(ModuleError::MissingOperand {
                opcode: self.opcode,
                offset: self.offset,
                index,
            })
    }

    /// Operands from `index` to the end (empty if out of range).
    pub fn rest(&self, index: usize) -> &'a [u32] {
        self.operands.get(index..).unwrap_or(&[])
    }

    /// Decode the literal string starting at operand `index`.
    ///
    /// Returns the string and the operand index just past it.
    pub fn string(&self, index: usize) -> Result<(String, usize)> {
        let words = self.operands.get(index..).ok_or(ModuleError::MissingOperand {
            opcode: self.opcode,
            offset: self.offset,
            index,
        })?;
        let (text, used) =
            decode_string(words).ok_or(ModuleError::InvalidString { offset: self.offset })?;
        Ok((text, index + used))
    }
}

/// Decode a nul-terminated little-endian UTF-8 string literal.
///
/// Returns the text and the number of words it occupied, or `None` when the
/// terminator is missing or the bytes are not UTF-8.
pub fn decode_string(words: &[u32]) -> Option<(String, usize)> {
    let mut bytes = Vec::new();
    for (index, word) in words.iter().enumerate() {
        for byte in word.to_le_bytes() {
            if byte == 0 {
                return String::from_utf8(bytes).ok().map(|s| (s, index + 1));
            }
            bytes.push(byte);
        }
    }
    None
}

/// Encode a string literal, nul-terminated and padded to a word boundary.
pub fn encode_string(text: &str) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
