//! GSLA command words.
//!
//! Every command starts with a little-endian 16-bit word. Bit 0 and bit 15 select the
//! command family, and the fourteen bits in between hold a run length biased by one:
//!
//! | Pattern (bit15..bit0)    | Command | Payload |
//! | ------------------------ | ------- | ------- |
//! | `0 LLLLLLLLLLLLLL 1`     | Literal copy of `L+1` bytes | the `L+1` bytes |
//! | `1 LLLLLLLLLLLLLL 1`     | Cursor skip of `L+1` bytes | none |
//! | `1 LLLLLLLLLLLLLL 0`     | Dictionary copy of `L+1` bytes | 16-bit offset + `0x2000` |
//! | `0x0000`                 | Source bank skip | none |
//! | `0x0002`                 | End of frame | none |
//! | `0x0006`                 | End of animation | none |
//!
//! Any other word with bits 0 and 15 clear is reserved.
//!
//! So a literal of the four bytes `09 09 09 09` is written as:
//! ```text
//! 07 00       <- (4 - 1) << 1 | 1
//! 09 09 09 09 <- payload
//! ```

use crate::errors::{DecodeError, GslaError};
use std::fmt;

/// Longest run a single literal, skip, or dictionary copy can describe
pub const MAX_RUN: usize = 0x4000;
/// Bias added to every dictionary offset on the wire
pub const DICTIONARY_BIAS: u16 = 0x2000;
/// Largest dictionary offset that survives the wire bias
pub const MAX_DICTIONARY_OFFSET: usize = (u16::MAX - DICTIONARY_BIAS) as usize;
/// Size of one bank of the playback target's address space
pub const BANK_SIZE: usize = 0x10000;

/// One decoded GSLA command.
///
/// Lengths are stored unbiased (`1..=MAX_RUN`) and dictionary offsets are stored as
/// canvas positions; the wire biases are only applied by [`Opcode::write`] and
/// reversed by [`Opcode::parse`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Copy the next `n` stream bytes to the canvas
    Literal(usize),
    /// Advance the canvas cursor by `n` bytes without writing
    Skip(usize),
    /// Copy `len` bytes forward, one at a time, from `offset` in the canvas.
    /// [`Opcode::write`] rejects an `offset` above [`MAX_DICTIONARY_OFFSET`].
    Copy { len: usize, offset: usize },
    /// Move the read position to the start of the next bank
    BankSkip,
    EndOfFrame,
    EndOfAnimation,
}

impl Opcode {
    const RUN_FLAG: u16 = 0x0001;
    const HIGH_FLAG: u16 = 0x8000;
    const LENGTH_MASK: u16 = 0x3FFF;
    const BANK_SKIP: u16 = 0x0000;
    const END_OF_FRAME: u16 = 0x0002;
    const END_OF_ANIMATION: u16 = 0x0006;

    pub fn literal(len: usize) -> Result<Self, GslaError> {
        check_run(len).map(Self::Literal)
    }

    pub fn skip(len: usize) -> Result<Self, GslaError> {
        check_run(len).map(Self::Skip)
    }

    pub fn copy(len: usize, offset: usize) -> Result<Self, GslaError> {
        let len = check_run(len)?;
        if offset > MAX_DICTIONARY_OFFSET {
            return Err(GslaError::OffsetOutOfRange(offset));
        }

        Ok(Self::Copy { len, offset })
    }

    /// Size of the command word plus any fixed operand, excluding a literal's payload
    pub const fn header_len(&self) -> usize {
        match self {
            Self::Copy { .. } => 4,
            _ => 2,
        }
    }

    /// Total number of stream bytes this command occupies
    pub const fn wire_len(&self) -> usize {
        match self {
            Self::Literal(n) => 2 + *n,
            _ => self.header_len(),
        }
    }

    /// The 16-bit command word. Run lengths must already be in `1..=MAX_RUN`, as the
    /// checked constructors guarantee.
    pub fn command_word(&self) -> u16 {
        match *self {
            Self::Literal(n) => length_field(n) | Self::RUN_FLAG,
            Self::Skip(n) => Self::HIGH_FLAG | length_field(n) | Self::RUN_FLAG,
            Self::Copy { len, .. } => Self::HIGH_FLAG | length_field(len),
            Self::BankSkip => Self::BANK_SKIP,
            Self::EndOfFrame => Self::END_OF_FRAME,
            Self::EndOfAnimation => Self::END_OF_ANIMATION,
        }
    }

    /// Append the command word (and dictionary offset, if any) to `out`.
    /// A literal's payload is written by the caller.
    ///
    /// Commands built directly from the variants are checked here, so an out of range
    /// length or offset is an error rather than a corrupt word.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), GslaError> {
        match *self {
            Self::Literal(n) | Self::Skip(n) => {
                check_run(n)?;
            }
            Self::Copy { len, offset } => {
                Self::copy(len, offset)?;
            }
            _ => (),
        }

        out.extend_from_slice(&self.command_word().to_le_bytes());
        if let Self::Copy { offset, .. } = *self {
            let biased = offset as u16 + DICTIONARY_BIAS;
            out.extend_from_slice(&biased.to_le_bytes());
        }

        Ok(())
    }

    /// Read the command at `pos` in `stream`. A literal's payload is not read.
    pub fn parse(stream: &[u8], pos: usize) -> Result<Self, DecodeError> {
        let word = read_word(stream, pos)?;
        let len = usize::from((word >> 1) & Self::LENGTH_MASK) + 1;

        let op = match (word & Self::HIGH_FLAG != 0, word & Self::RUN_FLAG != 0) {
            (false, true) => Self::Literal(len),
            (true, true) => Self::Skip(len),
            (true, false) => {
                let raw = read_word(stream, pos + 2)?;
                let offset = raw
                    .checked_sub(DICTIONARY_BIAS)
                    .ok_or(DecodeError::InvalidDictionaryOffset { offset: pos, raw })?;

                Self::Copy {
                    len,
                    offset: offset.into(),
                }
            }
            (false, false) => match word {
                Self::BANK_SKIP => Self::BankSkip,
                Self::END_OF_FRAME => Self::EndOfFrame,
                Self::END_OF_ANIMATION => Self::EndOfAnimation,
                _ => return Err(DecodeError::ReservedOpcode { offset: pos, word }),
            },
        };

        Ok(op)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Literal(..) => "literal",
            Self::Skip(..) => "skip",
            Self::Copy { .. } => "dictionary copy",
            Self::BankSkip => "bank skip",
            Self::EndOfFrame => "end of frame",
            Self::EndOfAnimation => "end of animation",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Literal(n) => write!(f, "Literal: {} bytes", n),
            Self::Skip(n) => write!(f, "Skip: {} bytes", n),
            Self::Copy { len, offset } => write!(f, "Copy: {} bytes from {:04x}", len, offset),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// The two ways an opcode stream can end
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Terminator {
    EndOfFrame,
    EndOfAnimation,
}

impl Terminator {
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::EndOfFrame => Opcode::EndOfFrame,
            Self::EndOfAnimation => Opcode::EndOfAnimation,
        }
    }

    pub const fn name(self) -> &'static str {
        self.opcode().name()
    }
}

/// Bytes left in the bank that holds stream position `pos`
pub(crate) const fn bank_remaining(pos: usize) -> usize {
    BANK_SIZE - (pos & (BANK_SIZE - 1))
}

/// Stream position of the first byte of the bank after the one holding `pos`
pub(crate) const fn next_bank(pos: usize) -> usize {
    (pos & !(BANK_SIZE - 1)) + BANK_SIZE
}

fn check_run(len: usize) -> Result<usize, GslaError> {
    if (1..=MAX_RUN).contains(&len) {
        Ok(len)
    } else {
        Err(GslaError::LengthOutOfRange(len))
    }
}

fn length_field(len: usize) -> u16 {
    debug_assert!((1..=MAX_RUN).contains(&len));
    ((len - 1) as u16) << 1
}

fn read_word(stream: &[u8], pos: usize) -> Result<u16, DecodeError> {
    stream
        .get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(DecodeError::Truncated { offset: pos })
}
