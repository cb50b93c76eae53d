use crate::{
    errors::GslaError,
    format::{CanvasGeometry, ChunkHeader, GslaHeader, ANIM_TAG, INIT_TAG, RING_FRAME_FLAG},
    opcode::{bank_remaining, Terminator},
};
use bitstream_io::{ByteWriter, LittleEndian};
use log::debug;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

mod frame;
pub(crate) mod matcher;

pub use self::frame::FrameEncoder;

type LogWtr<'a> = &'a mut dyn Write;

/// Configure how frames are turned into opcode streams
///
/// By [`default`](EncoderSettings::default):
///
/// | Parameter       | Field           | Value |
/// | --------------- | --------------- | :---: |
/// | Span gap        | `gap_tolerance` | 3     |
/// | Shortest copy   | `min_reference` | 4     |
/// | Longest period  | `max_period`    | 4096  |
/// | Loop frame      | `ring_frame`    | true  |
///
/// A dictionary copy costs four bytes, so matches shorter than `min_reference` are
/// stored as literal bytes instead. `gap_tolerance` is the number of unchanged bytes
/// that may sit inside one changed span before the span is split and a skip is emitted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EncoderSettings {
    /// unchanged bytes allowed inside one changed span
    pub gap_tolerance: usize,
    /// shortest match written as a dictionary copy
    pub min_reference: usize,
    /// longest repeating period the pattern search will try
    pub max_period: usize,
    /// append a frame that rebuilds the first frame from the last one
    pub ring_frame: bool,
}

impl EncoderSettings {
    pub const fn new(gap_tolerance: usize, min_reference: usize, max_period: usize) -> Self {
        Self {
            gap_tolerance,
            min_reference,
            max_period,
            ring_frame: true,
        }
    }

    pub fn without_ring_frame(self) -> Self {
        Self {
            ring_frame: false,
            ..self
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::new(3, 4, 4096)
    }
}

/// Encode the first frame of an animation, which starts from an empty canvas
///
/// The stream ends with an end of animation command, so on its own it describes
/// a still image.
/// ```
/// # use gsla::{encode_initial_frame, decode_stream};
/// let stream = encode_initial_frame(&[0, 0, 0, 0]).unwrap();
/// assert_eq!(stream, [0x07, 0x00, 0, 0, 0, 0, 0x06, 0x00]);
///
/// let mut canvas = [0xFF; 4];
/// decode_stream(&stream, &mut canvas).unwrap();
/// assert_eq!(canvas, [0, 0, 0, 0]);
/// ```
pub fn encode_initial_frame(pixels: &[u8]) -> Result<Vec<u8>, GslaError> {
    FrameEncoder::default().encode(pixels, None, 0, Terminator::EndOfAnimation)
}

/// Encode the changes that turn `prior_canvas` into `pixels`
///
/// ```
/// # use gsla::encode_delta_frame;
/// let unchanged = encode_delta_frame(&[1, 2, 3, 4], &[1, 2, 3, 4]).unwrap();
/// assert_eq!(unchanged, [0x02, 0x00]);
/// ```
pub fn encode_delta_frame(pixels: &[u8], prior_canvas: &[u8]) -> Result<Vec<u8>, GslaError> {
    FrameEncoder::default().encode(pixels, Some(prior_canvas), 0, Terminator::EndOfFrame)
}

/// Encode `frames` into a `GSLA` file at `path` with the default settings
pub fn save<P: AsRef<Path>, F: AsRef<[u8]>>(path: P, frames: &[F]) -> Result<(), GslaError> {
    Encoder::for_frames(frames).encode_to_file(path)
}

/// Specify the encoding settings, such as geometry, logging, and output
///
/// To create a new `Encoder`, use [`for_frames()`]. Then, change any of the encoding
/// settings with `Encoder`'s helper methods. Finally, encode the frames with
/// [`encode_to_writer()`], [`encode_to_file()`], or [`encode_to_vec()`].
/// ```
/// # use gsla::{CanvasGeometry, Encoder, EncoderSettings};
/// let frames = vec![vec![1u8; 64], vec![2u8; 64], vec![3u8; 64]];
/// let file = Encoder::for_frames(&frames)
///     .geometry(CanvasGeometry::new(8, 8))
///     .settings(EncoderSettings::default().without_ring_frame())
///     .with_logging(&mut ::std::io::sink())
///     .encode_to_vec()
///     .unwrap();
/// assert_eq!(&file[..4], b"GSLA");
/// ```
///
/// Unless a geometry is given, it is picked by [`CanvasGeometry::for_frame_size`].
///
/// [`for_frames()`]: Encoder::for_frames
/// [`encode_to_writer()`]: Encoder::encode_to_writer
/// [`encode_to_file()`]: Encoder::encode_to_file
/// [`encode_to_vec()`]: Encoder::encode_to_vec
pub struct Encoder<'a> {
    frames: Vec<&'a [u8]>,
    geometry: Option<CanvasGeometry>,
    settings: EncoderSettings,
    log: Option<LogWtr<'a>>,
}

impl<'a> Encoder<'a> {
    /// Create a new `Encoder` for `frames`, which must all be the same size.
    #[inline]
    pub fn for_frames<F: AsRef<[u8]>>(frames: &'a [F]) -> Self {
        Self {
            frames: frames.iter().map(AsRef::as_ref).collect(),
            geometry: None,
            settings: EncoderSettings::default(),
            log: None,
        }
    }

    #[inline]
    pub fn geometry(&mut self, geometry: CanvasGeometry) -> &mut Self {
        self.geometry = Some(geometry);
        self
    }

    /// Set the settings used for frame encoding. See [`EncoderSettings`] for more details.
    #[inline]
    pub fn settings(&mut self, settings: EncoderSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Write a summary of every encoded chunk and frame to `log`
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        self.log = Some(log as LogWtr);
        self
    }

    /// Start the encoding and write the file out to `wtr`
    #[inline]
    pub fn encode_to_writer<W: Write>(&mut self, mut wtr: W) -> Result<(), GslaError> {
        let file = do_encode(self)?;
        wtr.write_all(&file)?;
        wtr.flush().map_err(Into::into)
    }

    /// Start the encoding and write the file out to the newly created `File` at `f`
    #[inline]
    pub fn encode_to_file<P: AsRef<Path>>(&mut self, f: P) -> Result<(), GslaError> {
        let wtr = BufWriter::new(File::create(f)?);
        self.encode_to_writer(wtr)
    }

    /// Start the encoding and return the file in a `Vec<u8>`
    #[inline]
    pub fn encode_to_vec(&mut self) -> Result<Vec<u8>, GslaError> {
        do_encode(self)
    }
}

fn do_encode(opts: &mut Encoder) -> Result<Vec<u8>, GslaError> {
    let Encoder {
        frames,
        geometry,
        settings,
        log,
    } = opts;

    let first = *frames.first().ok_or(GslaError::NoFrames)?;
    let frame_size = first.len();
    if let Some(bad) = frames.iter().find(|f| f.len() != frame_size) {
        return Err(GslaError::FrameSizeMismatch {
            expected: frame_size,
            actual: bad.len(),
        });
    }

    let geometry = (*geometry).unwrap_or_else(|| CanvasGeometry::for_frame_size(frame_size));
    geometry.check(frame_size)?;

    let encoder = FrameEncoder::new(*settings);
    let ring = settings.ring_frame && frames.len() > 1;
    let mut out = vec![0u8; GslaHeader::SIZE];

    // INIT
    let init = begin_chunk(&mut out);
    let stream = encoder.encode(first, None, out.len(), Terminator::EndOfAnimation)?;
    log_stream(log, 0, out.len(), stream.len())?;
    out.extend_from_slice(&stream);
    if frames.len() > 1 && bank_remaining(out.len() + ChunkHeader::SIZE) == 1 {
        // keep the first ANIM command off the last byte of a bank
        out.push(0);
    }
    end_chunk(&mut out, init, INIT_TAG)?;

    // ANIM
    if frames.len() > 1 {
        let mut deltas: Vec<(&[u8], &[u8])> = frames.windows(2).map(|w| (w[1], w[0])).collect();
        if ring {
            deltas.push((first, frames[frames.len() - 1]));
        }

        let anim = begin_chunk(&mut out);
        for (idx, &(next, prior)) in deltas.iter().enumerate() {
            let terminator = if idx + 1 == deltas.len() {
                Terminator::EndOfAnimation
            } else {
                Terminator::EndOfFrame
            };
            let stream = encoder.encode(next, Some(prior), out.len(), terminator)?;
            log_stream(log, idx + 1, out.len(), stream.len())?;
            out.extend_from_slice(&stream);
        }
        end_chunk(&mut out, anim, ANIM_TAG)?;
    }

    let header = GslaHeader {
        file_length: out
            .len()
            .try_into()
            .map_err(|_| GslaError::FileTooLarge(out.len()))?,
        version: if ring { RING_FRAME_FLAG } else { 0 },
        geometry,
        frame_size,
        frame_count: (frames.len() + usize::from(ring)) as u32,
    };
    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "# Header\n{}", &header)?;
    }

    let mut hdr = Vec::with_capacity(GslaHeader::SIZE);
    header.write(&mut ByteWriter::endian(&mut hdr, LittleEndian))?;
    out[..GslaHeader::SIZE].copy_from_slice(&hdr);

    Ok(out)
}

/// Reserve space for a chunk header, returning where the chunk starts
fn begin_chunk(out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.resize(start + ChunkHeader::SIZE, 0);
    start
}

fn end_chunk(out: &mut Vec<u8>, start: usize, tag: &[u8; 4]) -> Result<(), GslaError> {
    let length = out.len() - start;
    let chunk = ChunkHeader {
        tag: *tag,
        length: length
            .try_into()
            .map_err(|_| GslaError::FileTooLarge(out.len()))?,
    };
    debug!("{} chunk: {} bytes at {:06x}", String::from_utf8_lossy(tag), length, start);

    let mut hdr = Vec::with_capacity(ChunkHeader::SIZE);
    chunk.write(&mut ByteWriter::endian(&mut hdr, LittleEndian))?;
    out[start..start + ChunkHeader::SIZE].copy_from_slice(&hdr);

    Ok(())
}

fn log_stream(
    log: &mut Option<LogWtr>,
    frame: usize,
    pos: usize,
    len: usize,
) -> Result<(), GslaError> {
    debug!("frame {}: {} bytes at {:06x}", frame, len, pos);
    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "{:06x} - Frame {}: {} bytes", pos, frame, len)?;
    }

    Ok(())
}
