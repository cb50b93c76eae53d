use std::io;
use thiserror::Error;

/// Errors raised while replaying a single opcode stream onto a canvas.
///
/// Every `offset` is a byte position in the loaded stream (relative to its load base),
/// so a failure can be traced back to the exact command word that caused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("opcode stream ends early at offset {offset:#x}")]
    Truncated { offset: usize },

    #[error("reserved command word {word:#06x} at offset {offset:#x}")]
    ReservedOpcode { offset: usize, word: u16 },

    #[error("command at offset {offset:#x} writes {len} bytes at cursor {cursor:#x}, past the {canvas} byte canvas")]
    CanvasOverrun {
        offset: usize,
        cursor: usize,
        len: usize,
        canvas: usize,
    },

    #[error("dictionary copy at offset {offset:#x} reads {len} bytes from {from:#x}, past the {canvas} byte canvas")]
    DictionaryOverrun {
        offset: usize,
        from: usize,
        len: usize,
        canvas: usize,
    },

    #[error("dictionary offset {raw:#06x} at offset {offset:#x} is below the 0x2000 bias")]
    InvalidDictionaryOffset { offset: usize, raw: u16 },
}

/// Possible errors that arise from loading, saving, encoding, or decoding GSLA data.
#[derive(Error, Debug)]
pub enum GslaError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("invalid GSLA magic: expected \"GSLA\", found {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("header claims {expected} bytes but the file holds {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("GSLA version {0:#06x} is not supported")]
    UnsupportedVersion(u16),

    #[error("canvas geometry {width_bytes}x{height} does not describe a {frame_size} byte frame")]
    BadGeometry {
        width_bytes: u16,
        height: u16,
        frame_size: usize,
    },

    #[error("chunk at offset {offset:#x} is malformed: {reason}")]
    BadChunk { offset: usize, reason: &'static str },

    #[error("required {0} chunk is missing")]
    MissingChunk(&'static str),

    #[error("frame count {0} is not valid for this file")]
    BadFrameCount(u32),

    #[error("frame {frame} ended with {found} where {expected} was expected")]
    UnexpectedTerminator {
        frame: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("frame {frame}: {source}")]
    Frame {
        frame: usize,
        #[source]
        source: DecodeError,
    },

    #[error("run length {0} cannot be encoded in a single command (1..=16384)")]
    LengthOutOfRange(usize),

    #[error("dictionary offset {0:#x} cannot be encoded")]
    OffsetOutOfRange(usize),

    #[error("frame holds {actual} bytes but the canvas is {expected} bytes")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("a stream cannot start at {0:#x}, one byte before a bank boundary")]
    UnalignedStream(usize),

    #[error("no frames to encode")]
    NoFrames,

    #[error("encoded frame needs {needed} bytes but the output buffer holds {available}")]
    OutputBufferTooSmall { needed: usize, available: usize },

    #[error("encoded file of {0} bytes exceeds the 32-bit length field")]
    FileTooLarge(usize),
}
