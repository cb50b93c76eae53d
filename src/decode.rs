use crate::errors::{DecodeError, GslaError};
use crate::format::{FileInfo, GslaHeader, ANIM_TAG, INIT_TAG};
use crate::opcode::{next_bank, Opcode, Terminator};
use log::{debug, trace};
use std::{
    borrow::Cow,
    fs,
    io::{Read, Write},
    path::Path,
};

type LogWtr<'a> = &'a mut dyn Write;

/// How a single opcode stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEnd {
    /// stream bytes read, from the first command through the terminator
    pub consumed: usize,
    pub terminator: Terminator,
    /// canvas cursor after the last command
    pub cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Running,
    EndOfFrame,
    EndOfAnimation,
}

/// Replay the opcode stream starting at `start` onto `canvas`.
///
/// `stream` must begin at the stream's load base: bank skips jump to the next multiple
/// of 64KB counted from `stream[0]`. The canvas is modified in place, so it has to
/// hold the previous frame (or zeros, for the first frame) beforehand.
/// ```
/// # use gsla::decode_frame;
/// let stream = [0x01, 0x00, 0xAA, 0x0C, 0x80, 0x00, 0x20, 0x06, 0x00];
/// let mut canvas = [0u8; 8];
/// let end = decode_frame(&stream, 0, &mut canvas).unwrap();
///
/// assert_eq!(canvas, [0xAA; 8]);
/// assert_eq!(end.consumed, stream.len());
/// ```
pub fn decode_frame(
    stream: &[u8],
    start: usize,
    canvas: &mut [u8],
) -> Result<FrameEnd, DecodeError> {
    let mut pos = start;
    let mut cursor = 0;
    let mut state = DecodeState::Running;

    while state == DecodeState::Running {
        let op = Opcode::parse(stream, pos)?;
        trace!("{:05x} - {} | cursor {:04x}", pos, op, cursor);

        match op {
            Opcode::Literal(n) => {
                let dest = canvas_run(canvas, pos, cursor, n)?;
                let payload = stream
                    .get(pos + 2..pos + 2 + n)
                    .ok_or(DecodeError::Truncated { offset: pos })?;
                canvas[dest].copy_from_slice(payload);
                cursor += n;
                pos += op.wire_len();
            }
            Opcode::Skip(n) => {
                canvas_run(canvas, pos, cursor, n)?;
                cursor += n;
                pos += op.wire_len();
            }
            Opcode::Copy { len, offset } => {
                canvas_run(canvas, pos, cursor, len)?;
                if offset + len > canvas.len() {
                    return Err(DecodeError::DictionaryOverrun {
                        offset: pos,
                        from: offset,
                        len,
                        canvas: canvas.len(),
                    });
                }
                // one byte at a time, so a source overlapping the cursor repeats
                for i in 0..len {
                    canvas[cursor + i] = canvas[offset + i];
                }
                cursor += len;
                pos += op.wire_len();
            }
            Opcode::BankSkip => pos = next_bank(pos),
            Opcode::EndOfFrame => {
                pos += op.wire_len();
                state = DecodeState::EndOfFrame;
            }
            Opcode::EndOfAnimation => {
                pos += op.wire_len();
                state = DecodeState::EndOfAnimation;
            }
        }
    }

    let terminator = match state {
        DecodeState::EndOfAnimation => Terminator::EndOfAnimation,
        _ => Terminator::EndOfFrame,
    };

    Ok(FrameEnd {
        consumed: pos - start,
        terminator,
        cursor,
    })
}

/// Replay a stream that was loaded at a bank boundary onto `canvas`
pub fn decode_stream(stream: &[u8], canvas: &mut [u8]) -> Result<FrameEnd, DecodeError> {
    decode_frame(stream, 0, canvas)
}

fn canvas_run(
    canvas: &[u8],
    offset: usize,
    cursor: usize,
    len: usize,
) -> Result<std::ops::Range<usize>, DecodeError> {
    if cursor + len > canvas.len() {
        return Err(DecodeError::CanvasOverrun {
            offset,
            cursor,
            len,
            canvas: canvas.len(),
        });
    }

    Ok(cursor..cursor + len)
}

/// A fully decoded `GSLA` animation: one canvas per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    header: GslaHeader,
    canvases: Vec<Vec<u8>>,
}

impl Animation {
    pub fn header(&self) -> &GslaHeader {
        &self.header
    }

    pub fn width_bytes(&self) -> u16 {
        self.header.geometry.width_bytes
    }

    pub fn height(&self) -> u16 {
        self.header.geometry.height
    }

    pub fn frame_size(&self) -> usize {
        self.header.frame_size
    }

    /// Number of canvases, including the ring frame if there is one
    pub fn frame_count(&self) -> usize {
        self.canvases.len()
    }

    pub fn has_ring_frame(&self) -> bool {
        self.header.has_ring_frame()
    }

    /// The real frames of the animation, without the ring frame
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.canvases[..self.real_frames()]
    }

    /// The decoded ring frame; it should equal the first frame
    pub fn ring_frame(&self) -> Option<&[u8]> {
        if self.has_ring_frame() {
            self.canvases.last().map(Vec::as_slice)
        } else {
            None
        }
    }

    /// Any decoded canvas, including the ring frame
    pub fn canvas(&self, idx: usize) -> Option<&[u8]> {
        self.canvases.get(idx).map(Vec::as_slice)
    }

    pub fn into_frames(mut self) -> Vec<Vec<u8>> {
        self.canvases.truncate(self.real_frames());
        self.canvases
    }

    fn real_frames(&self) -> usize {
        self.canvases.len() - usize::from(self.has_ring_frame())
    }
}

/// Specify the decoding settings, such as logging and input.
///
/// To create a new `Decoder`, use [`for_bytes()`], [`for_reader()`], or
/// [`for_file()`]. The whole file is held in memory while it is decoded.
/// Finally, decode the input data with [`decode()`].
/// ```
/// # use gsla::{Encoder, Decoder};
/// let frames = vec![vec![0u8; 32000], vec![7u8; 32000]];
/// let file = Encoder::for_frames(&frames).encode_to_vec().unwrap();
///
/// let animation = Decoder::for_bytes(&file).decode().unwrap();
/// assert_eq!(animation.frames(), &frames[..]);
/// assert_eq!(animation.ring_frame(), Some(&frames[0][..]));
/// ```
/// A `Decoder` can also report the [`GslaHeader`] with [`header()`]
/// without decoding any frames.
///
/// [`for_bytes()`]: Decoder::for_bytes
/// [`for_reader()`]: Decoder::for_reader
/// [`for_file()`]: Decoder::for_file
/// [`decode()`]: Decoder::decode
/// [`header()`]: Decoder::header
pub struct Decoder<'a> {
    data: Cow<'a, [u8]>,
    log: Option<LogWtr<'a>>,
    info: Option<FileInfo>,
}

impl<'a> Decoder<'a> {
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(bytes),
            log: None,
            info: None,
        }
    }

    #[inline]
    pub fn for_reader<R: Read>(mut rdr: R) -> Result<Self, GslaError> {
        let mut data = Vec::new();
        rdr.read_to_end(&mut data)?;

        Ok(Self::owned(data))
    }

    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> Result<Self, GslaError> {
        fs::read(p).map(Self::owned).map_err(Into::into)
    }

    fn owned(data: Vec<u8>) -> Self {
        Self {
            data: Cow::Owned(data),
            log: None,
            info: None,
        }
    }

    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr);
        self
    }

    #[inline]
    pub fn header(&mut self) -> Result<GslaHeader, GslaError> {
        self.get_file_info().map(|info| info.header)
    }

    #[inline]
    pub fn info(&mut self) -> Result<&FileInfo, GslaError> {
        self.get_file_info()
    }

    #[inline]
    pub fn decode(&mut self) -> Result<Animation, GslaError> {
        do_decode(self)
    }

    fn get_file_info(&mut self) -> Result<&FileInfo, GslaError> {
        let info = match self.info.take() {
            Some(info) => info,
            None => FileInfo::from_file(&self.data)?,
        };

        Ok(self.info.insert(info))
    }
}

/// Decode a complete `GSLA` file from a `Read`er into an [`Animation`]
///
/// This is a convenience function to decode without having to set up a [`Decoder`]
pub fn decode<R: Read>(rdr: R) -> Result<Animation, GslaError> {
    Decoder::for_reader(rdr)?.decode()
}

/// Read and decode the `GSLA` file at `path`
pub fn load<P: AsRef<Path>>(path: P) -> Result<Animation, GslaError> {
    Decoder::for_file(path)?.decode()
}

fn do_decode(opt: &mut Decoder) -> Result<Animation, GslaError> {
    let info = opt.get_file_info()?.clone();
    let Decoder { data, log, .. } = opt;
    let header = info.header;

    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "# Header\n{}", &header)?;
        writeln!(wtr, "## Chunks")?;
        for chunk in &info.chunks {
            writeln!(wtr, "{}", chunk)?;
        }
        writeln!(wtr)?;
    }
    for chunk in info
        .chunks
        .iter()
        .filter(|c| &c.tag != INIT_TAG && &c.tag != ANIM_TAG)
    {
        debug!("skipping unknown chunk {}", chunk);
    }

    let frame_count = header.frame_count as usize;
    let mut canvases: Vec<Vec<u8>> = Vec::new();

    // the first frame starts from an empty canvas
    let init = info.chunk(INIT_TAG).ok_or(GslaError::MissingChunk("INIT"))?;
    let mut canvas = vec![0; header.frame_size];
    let end = decode_frame(&data[..init.end()], init.data_offset(), &mut canvas)
        .map_err(|source| GslaError::Frame { frame: 0, source })?;
    expect_terminator(0, end.terminator, Terminator::EndOfAnimation)?;
    if end.cursor != header.frame_size {
        return Err(GslaError::BadChunk {
            offset: init.offset,
            reason: "INIT stream does not cover the whole canvas",
        });
    }
    log_frame(log, 0, init.data_offset(), &end)?;
    canvases.push(canvas);

    if frame_count > 1 {
        let anim = info.chunk(ANIM_TAG).ok_or(GslaError::MissingChunk("ANIM"))?;
        let stream = &data[..anim.end()];
        let mut pos = anim.data_offset();

        for frame in 1..frame_count {
            let mut canvas = canvases[frame - 1].clone();
            let end = decode_frame(stream, pos, &mut canvas)
                .map_err(|source| GslaError::Frame { frame, source })?;

            let expected = if frame + 1 == frame_count {
                Terminator::EndOfAnimation
            } else {
                Terminator::EndOfFrame
            };
            expect_terminator(frame, end.terminator, expected)?;
            log_frame(log, frame, pos, &end)?;

            pos += end.consumed;
            canvases.push(canvas);
        }

        if pos != anim.end() {
            return Err(GslaError::BadChunk {
                offset: anim.offset,
                reason: "ANIM chunk has bytes after its last stream",
            });
        }
    }

    Ok(Animation { header, canvases })
}

fn expect_terminator(
    frame: usize,
    found: Terminator,
    expected: Terminator,
) -> Result<(), GslaError> {
    if found == expected {
        Ok(())
    } else {
        Err(GslaError::UnexpectedTerminator {
            frame,
            expected: expected.name(),
            found: found.name(),
        })
    }
}

fn log_frame(
    log: &mut Option<LogWtr>,
    frame: usize,
    pos: usize,
    end: &FrameEnd,
) -> Result<(), GslaError> {
    debug!(
        "frame {}: {} bytes at {:06x}, ended with {}",
        frame,
        end.consumed,
        pos,
        end.terminator.name()
    );
    if let Some(wtr) = log.as_mut() {
        writeln!(
            wtr,
            "{:06x} - Frame {}: {} bytes, cursor {:04x}, {}",
            pos,
            frame,
            end.consumed,
            end.cursor,
            end.terminator.name()
        )?;
    }

    Ok(())
}
