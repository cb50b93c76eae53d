//! Information and structures for `GSLA` files.
//!
//! A `GSLA` file is a fixed header followed by a list of chunks:
//! 1. Header
//! 2. `INIT` chunk: the first frame, encoded against an empty canvas
//! 3. `ANIM` chunk: every later frame, each encoded against the frame before it
//!
//! ## Header
//! The twenty byte header is little endian throughout.
//! It can be extracted into a [`GslaHeader`] by using [`gsla_info()`].
//!
//! | Byte Num | Description |
//! | :------: | ----------- |
//! | 0..4     | magic bytes ("GSLA") |
//! | 4..8     | length of the whole file |
//! | 8..10    | version; bit 15 is set when a ring frame is present |
//! | 10..12   | canvas width in bytes |
//! | 12..14   | canvas height in lines |
//! | 14..16   | bytes per canvas (`0` means 65536) |
//! | 16..20   | number of frames, including the ring frame |
//!
//! ## Chunks
//! Every chunk starts with a four byte tag and a 32-bit length that includes the eight
//! byte chunk header. Chunks with tags other than `INIT` and `ANIM` are skipped.
//!
//! The `INIT` chunk holds one opcode stream that ends with an end of animation command.
//! The `ANIM` chunk holds `frame_count - 1` opcode streams back to back; all of them end
//! with an end of frame command, except the last one, which ends with end of animation.
//! See [`opcode`](crate::opcode) for the commands themselves.
//!
//! When the ring frame flag is set, the last `ANIM` stream rebuilds the first frame
//! from the last real frame, so playback can loop without a visible seam.
//!
//! ## An Example
//! A two frame, 4x2 byte animation whose first frame is all `05`, and whose second
//! frame changes bytes 2 and 3 to `07 08`:
//! ```text
//! Header
//! 47534C41 <- "GSLA"
//! 3D000000 <- file length (61 bytes)
//! 0080     <- version 0, ring frame present
//! 0400     <- 4 bytes wide
//! 0200     <- 2 lines high
//! 0800     <- 8 bytes per canvas
//! 03000000 <- 2 frames + 1 ring frame
//!
//! INIT chunk
//! 494E4954 11000000 <- "INIT", 17 bytes
//! 0100 05           <- literal: 05
//! 0C80 0020         <- copy 7 bytes from offset 0
//! 0600              <- end of animation
//!
//! ANIM chunk
//! 414E494D 18000000 <- "ANIM", 24 bytes
//! 0380              <- skip 2 bytes
//! 0300 0708         <- literal: 07 08
//! 0200              <- end of frame
//! 0380              <- skip 2 bytes (ring frame)
//! 0280 0020         <- copy 2 bytes from offset 0
//! 0600              <- end of animation
//! ```
//! [`gsla_info()`]: crate::gsla_info

use crate::errors::GslaError;
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter, LittleEndian};
use smallvec::SmallVec;
use std::fmt;
use std::io::{Cursor, Write};
use std::str;

pub const MAGIC: &[u8; 4] = b"GSLA";
pub const INIT_TAG: &[u8; 4] = b"INIT";
pub const ANIM_TAG: &[u8; 4] = b"ANIM";
/// Version bit marking a ring frame at the end of the `ANIM` chunk
pub const RING_FRAME_FLAG: u16 = 0x8000;

/// Dimensions of one canvas, in bytes per line and lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasGeometry {
    pub width_bytes: u16,
    pub height: u16,
}

impl CanvasGeometry {
    /// The 320x200, four bits per pixel super hi-res screen
    pub const SUPER_HIRES: Self = Self::new(160, 200);

    pub const fn new(width_bytes: u16, height: u16) -> Self {
        Self {
            width_bytes,
            height,
        }
    }

    pub const fn frame_size(&self) -> usize {
        self.width_bytes as usize * self.height as usize
    }

    /// Pick a geometry for canvases of `frame_size` bytes: the super hi-res screen
    /// when it fits exactly, or a single line otherwise.
    pub fn for_frame_size(frame_size: usize) -> Self {
        if frame_size == Self::SUPER_HIRES.frame_size() {
            Self::SUPER_HIRES
        } else if frame_size == 0x10000 {
            Self::new(256, 256)
        } else {
            Self::new(frame_size.min(u16::MAX.into()) as u16, 1)
        }
    }

    pub(crate) fn check(&self, frame_size: usize) -> Result<(), GslaError> {
        if frame_size == 0 || frame_size > 0x10000 || self.frame_size() != frame_size {
            return Err(GslaError::BadGeometry {
                width_bytes: self.width_bytes,
                height: self.height,
                frame_size,
            });
        }

        Ok(())
    }
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self::SUPER_HIRES
    }
}

/// The information stored at the start of a `GSLA` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GslaHeader {
    pub file_length: u32,
    pub version: u16,
    pub geometry: CanvasGeometry,
    /// bytes per canvas (1..=65536)
    pub frame_size: usize,
    /// number of canvases, including the ring frame
    pub frame_count: u32,
}

impl GslaHeader {
    pub const SIZE: usize = 20;

    pub fn has_ring_frame(&self) -> bool {
        self.version & RING_FRAME_FLAG != 0
    }

    /// Parse and validate the header at the start of `file`
    pub(crate) fn from_file(file: &[u8]) -> Result<Self, GslaError> {
        if file.len() < Self::SIZE {
            return Err(GslaError::LengthMismatch {
                expected: Self::SIZE,
                actual: file.len(),
            });
        }

        let mut rdr = ByteReader::endian(Cursor::new(&file[..Self::SIZE]), LittleEndian);
        let mut magic = [0u8; 4];
        rdr.read_bytes(&mut magic)?;
        if &magic != MAGIC {
            return Err(GslaError::InvalidMagic(magic));
        }

        let file_length = rdr.read::<u32>()?;
        let version = rdr.read::<u16>()?;
        let geometry = CanvasGeometry::new(rdr.read::<u16>()?, rdr.read::<u16>()?);
        let frame_size = match rdr.read::<u16>()? {
            0 => 0x10000,
            n => usize::from(n),
        };
        let frame_count = rdr.read::<u32>()?;

        if file_length as usize != file.len() {
            return Err(GslaError::LengthMismatch {
                expected: file_length as usize,
                actual: file.len(),
            });
        }
        if version & !RING_FRAME_FLAG != 0 {
            return Err(GslaError::UnsupportedVersion(version));
        }
        geometry.check(frame_size)?;

        let header = Self {
            file_length,
            version,
            geometry,
            frame_size,
            frame_count,
        };
        if frame_count == 0 || (header.has_ring_frame() && frame_count < 2) {
            return Err(GslaError::BadFrameCount(frame_count));
        }
        // every ANIM stream holds at least a terminator word
        if frame_count > 1 {
            let min_overhead = Self::SIZE + 2 * ChunkHeader::SIZE + 2;
            let max_streams = file.len().saturating_sub(min_overhead) / 2;
            if frame_count as usize - 1 > max_streams {
                return Err(GslaError::BadFrameCount(frame_count));
            }
        }

        Ok(header)
    }

    /// Write out `self` in the twenty byte `GSLA` layout
    pub(crate) fn write<W: Write>(&self, wtr: &mut ByteWriter<W, LittleEndian>) -> Result<(), GslaError> {
        wtr.write_bytes(MAGIC)?; // 0..4
        wtr.write(self.file_length)?; // 4..8
        wtr.write(self.version)?; // 8..10
        wtr.write(self.geometry.width_bytes)?; // 10..12
        wtr.write(self.geometry.height)?; // 12..14
        // 65536 wraps around to the conventional zero
        wtr.write(self.frame_size as u16)?; // 14..16
        wtr.write(self.frame_count)?; // 16..20

        Ok(())
    }
}

impl fmt::Display for GslaHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GSLA v{:04x}: {}x{} bytes ({} per frame), {} frames{}",
            self.version & !RING_FRAME_FLAG,
            self.geometry.width_bytes,
            self.geometry.height,
            self.frame_size,
            self.frame_count,
            if self.has_ring_frame() {
                " (including ring frame)"
            } else {
                ""
            }
        )
    }
}

/// The eight bytes that open every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub tag: [u8; 4],
    /// includes this header
    pub length: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    fn read(file: &[u8], offset: usize) -> Result<Self, GslaError> {
        let bytes = file.get(offset..offset + Self::SIZE).ok_or(GslaError::BadChunk {
            offset,
            reason: "chunk header runs past the end of the file",
        })?;

        let mut rdr = ByteReader::endian(Cursor::new(bytes), LittleEndian);
        let mut tag = [0u8; 4];
        rdr.read_bytes(&mut tag)?;
        let length = rdr.read::<u32>()?;

        Ok(Self { tag, length })
    }

    pub fn write<W: Write>(&self, wtr: &mut ByteWriter<W, LittleEndian>) -> Result<(), GslaError> {
        wtr.write_bytes(&self.tag)?;
        wtr.write(self.length)?;

        Ok(())
    }
}

/// Where a chunk sits in a `GSLA` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub tag: [u8; 4],
    /// file position of the chunk header
    pub offset: usize,
    /// length of the chunk, including its header
    pub length: usize,
}

impl ChunkInfo {
    /// File position of the first byte after the chunk header
    pub fn data_offset(&self) -> usize {
        self.offset + ChunkHeader::SIZE
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn tag_str(&self) -> &str {
        str::from_utf8(&self.tag).unwrap_or("????")
    }
}

impl fmt::Display for ChunkInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} @ {:06x} ({} bytes)",
            self.tag_str(),
            self.offset,
            self.length
        )
    }
}

/// The header and chunk table of a `GSLA` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub header: GslaHeader,
    pub chunks: SmallVec<[ChunkInfo; 4]>,
}

impl FileInfo {
    pub(crate) fn from_file(file: &[u8]) -> Result<Self, GslaError> {
        let header = GslaHeader::from_file(file)?;
        let mut chunks = SmallVec::new();
        let mut offset = GslaHeader::SIZE;

        while offset < file.len() {
            let chunk = ChunkHeader::read(file, offset)?;
            let length = chunk.length as usize;
            if length < ChunkHeader::SIZE {
                return Err(GslaError::BadChunk {
                    offset,
                    reason: "chunk length is shorter than its header",
                });
            }
            if offset + length > file.len() {
                return Err(GslaError::BadChunk {
                    offset,
                    reason: "chunk runs past the end of the file",
                });
            }

            chunks.push(ChunkInfo {
                tag: chunk.tag,
                offset,
                length,
            });
            offset += length;
        }

        Ok(Self { header, chunks })
    }

    /// The first chunk tagged `tag`
    pub fn chunk(&self, tag: &[u8; 4]) -> Option<&ChunkInfo> {
        self.chunks.iter().find(|c| &c.tag == tag)
    }
}

/// Extract the [`GslaHeader`] and chunk table from a complete `GSLA` file
///
/// This validates the header and chunk framing without decoding any frames.
pub fn gsla_info(file: &[u8]) -> Result<FileInfo, GslaError> {
    FileInfo::from_file(file)
}
