use std::ops::Range;

use log::trace;

use crate::{
    errors::GslaError,
    opcode::{bank_remaining, next_bank, Opcode, Terminator, MAX_RUN},
};

use super::{
    matcher::{find_best_match, CompressionContext, Visibility},
    EncoderSettings,
};

/// Largest canvas the 16-bit frame size field can describe
pub(crate) const MAX_FRAME_SIZE: usize = 0x10000;

/// Encodes single frames into GSLA opcode streams.
///
/// A stream is positioned in the final file by its `stream_offset`: banks are counted
/// from the start of the file, and no command (or literal payload) may straddle a bank.
/// ```
/// # use gsla::{FrameEncoder, EncoderSettings, Terminator, decode_frame};
/// let prior = vec![0u8; 64];
/// let mut next = prior.clone();
/// next[10..20].copy_from_slice(b"0123456789");
///
/// let encoder = FrameEncoder::new(EncoderSettings::default());
/// let stream = encoder
///     .encode(&next, Some(&prior[..]), 0, Terminator::EndOfFrame)
///     .unwrap();
///
/// let mut canvas = prior.clone();
/// decode_frame(&stream, 0, &mut canvas).unwrap();
/// assert_eq!(canvas, next);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder {
    settings: EncoderSettings,
}

impl FrameEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Encode `pixels` as a stream that rebuilds it from `prior`, or from an empty
    /// canvas when `prior` is `None`.
    pub fn encode(
        &self,
        pixels: &[u8],
        prior: Option<&[u8]>,
        stream_offset: usize,
        terminator: Terminator,
    ) -> Result<Vec<u8>, GslaError> {
        if pixels.len() > MAX_FRAME_SIZE {
            return Err(GslaError::FrameSizeMismatch {
                expected: MAX_FRAME_SIZE,
                actual: pixels.len(),
            });
        }
        if bank_remaining(stream_offset) == 1 {
            return Err(GslaError::UnalignedStream(stream_offset));
        }

        let (mut work, visibility) = match prior {
            Some(prior) if prior.len() != pixels.len() => {
                return Err(GslaError::FrameSizeMismatch {
                    expected: prior.len(),
                    actual: pixels.len(),
                })
            }
            Some(prior) => (prior.to_vec(), Visibility::Whole),
            None => (vec![0; pixels.len()], Visibility::UpToCursor),
        };

        let mut wtr = StreamWriter::new(stream_offset);
        let mut cursor = 0;

        loop {
            let span = match visibility {
                Visibility::UpToCursor if cursor < pixels.len() => 0..pixels.len(),
                Visibility::UpToCursor => break,
                Visibility::Whole => {
                    match changed_span(pixels, &work, cursor, self.settings.gap_tolerance) {
                        Some(span) => span,
                        None => break,
                    }
                }
            };

            if span.start > cursor {
                wtr.push_skip(span.start - cursor)?;
            }
            self.encode_span(&mut wtr, pixels, &mut work, span.clone(), visibility)?;
            cursor = span.end;
        }

        wtr.finish(terminator)
    }

    /// Encode into a caller provided buffer, returning the number of bytes written.
    pub fn encode_into(
        &self,
        pixels: &[u8],
        prior: Option<&[u8]>,
        stream_offset: usize,
        terminator: Terminator,
        buf: &mut [u8],
    ) -> Result<usize, GslaError> {
        let stream = self.encode(pixels, prior, stream_offset, terminator)?;
        let available = buf.len();
        let out = buf
            .get_mut(..stream.len())
            .ok_or(GslaError::OutputBufferTooSmall {
                needed: stream.len(),
                available,
            })?;
        out.copy_from_slice(&stream);

        Ok(stream.len())
    }

    /// Feed one changed span to the matcher until it is consumed
    fn encode_span(
        &self,
        wtr: &mut StreamWriter,
        pixels: &[u8],
        work: &mut [u8],
        span: Range<usize>,
        visibility: Visibility,
    ) -> Result<(), GslaError> {
        let mut pos = span.start;

        while pos < span.end {
            let end = span.end.min(pos + MAX_RUN);
            let ctx = CompressionContext::new(work, visibility, self.settings.max_period);

            let len = match find_best_match(&pixels[pos..end], &ctx, pos) {
                Some(m) if m.len >= self.settings.min_reference => {
                    trace!("{:04x} - {:?} match of {} from {:04x}", pos, m.kind, m.len, m.offset);
                    wtr.push(Opcode::copy(m.len, m.offset)?)?;
                    m.len
                }
                Some(m) => {
                    wtr.push_literal(&pixels[pos..pos + m.len])?;
                    m.len
                }
                None => {
                    wtr.push_literal(&pixels[pos..=pos])?;
                    1
                }
            };

            // the dictionary now holds what the decoder will have written
            work[pos..pos + len].copy_from_slice(&pixels[pos..pos + len]);
            pos += len;
        }

        Ok(())
    }
}

/// Find the next run of bytes in `new` that differ from `old`, starting at `from`.
///
/// Up to `tolerance` matching bytes may sit between two differing bytes of one span.
fn changed_span(new: &[u8], old: &[u8], from: usize, tolerance: usize) -> Option<Range<usize>> {
    let start = (from..new.len()).find(|&i| new[i] != old[i])?;
    let mut end = start + 1;
    let mut gap = 0;

    for i in end..new.len() {
        if new[i] != old[i] {
            end = i + 1;
            gap = 0;
        } else {
            gap += 1;
            if gap > tolerance {
                break;
            }
        }
    }

    Some(start..end)
}

/// Output for one opcode stream that keeps every command inside a single bank.
///
/// A command never leaves exactly one byte free at the end of a bank, so there is
/// always room for a bank skip before the next command.
#[derive(Debug)]
struct StreamWriter {
    out: Vec<u8>,
    /// file position of `out[0]`
    base: usize,
    /// index and length of the literal that may still absorb more bytes
    open_literal: Option<(usize, usize)>,
}

impl StreamWriter {
    fn new(base: usize) -> Self {
        Self {
            out: Vec::new(),
            base,
            open_literal: None,
        }
    }

    fn position(&self) -> usize {
        self.base + self.out.len()
    }

    fn fits(start: usize, len: usize) -> bool {
        let remaining = bank_remaining(start);
        len <= remaining && remaining - len != 1
    }

    /// Make room for a `len` byte command, skipping to the next bank if needed
    fn reserve(&mut self, len: usize) -> Result<(), GslaError> {
        let pos = self.position();
        if Self::fits(pos, len) {
            return Ok(());
        }

        let bank = next_bank(pos);
        trace!("{:05x} - bank skip to {:05x}", pos, bank);
        Opcode::BankSkip.write(&mut self.out)?;
        self.out.resize(bank - self.base, 0);
        self.open_literal = None;

        Ok(())
    }

    fn push(&mut self, op: Opcode) -> Result<(), GslaError> {
        self.reserve(op.wire_len())?;
        trace!("{:05x} - {}", self.position(), op);
        op.write(&mut self.out)?;
        self.open_literal = None;

        Ok(())
    }

    fn push_skip(&mut self, mut len: usize) -> Result<(), GslaError> {
        while len > 0 {
            let run = len.min(MAX_RUN);
            self.push(Opcode::skip(run)?)?;
            len -= run;
        }

        Ok(())
    }

    /// Append literal bytes, growing the previous literal when it is still open
    fn push_literal(&mut self, bytes: &[u8]) -> Result<(), GslaError> {
        if let Some((header, len)) = self.open_literal {
            let grown = len + bytes.len();
            if grown <= MAX_RUN && Self::fits(self.base + header, 2 + grown) {
                let word = Opcode::Literal(grown).command_word();
                self.out[header..header + 2].copy_from_slice(&word.to_le_bytes());
                self.out.extend_from_slice(bytes);
                self.open_literal = Some((header, grown));
                return Ok(());
            }
        }

        let op = Opcode::literal(bytes.len())?;
        self.reserve(op.wire_len())?;
        let header = self.out.len();
        trace!("{:05x} - {}", self.position(), op);
        op.write(&mut self.out)?;
        self.out.extend_from_slice(bytes);
        self.open_literal = Some((header, bytes.len()));

        Ok(())
    }

    fn finish(mut self, terminator: Terminator) -> Result<Vec<u8>, GslaError> {
        self.push(terminator.opcode())?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_tolerate_small_gaps() {
        let old = [0u8; 16];
        let mut new = old;
        new[2] = 1;
        new[6] = 1; // three matching bytes in between
        new[11] = 1; // four matching bytes in between

        assert_eq!(changed_span(&new, &old, 0, 3), Some(2..7));
        assert_eq!(changed_span(&new, &old, 7, 3), Some(11..12));
        assert_eq!(changed_span(&new, &old, 12, 3), None);
        assert_eq!(changed_span(&new, &old, 0, 0), Some(2..3));
    }

    #[test]
    fn literal_grows_in_place() {
        let mut wtr = StreamWriter::new(0);
        wtr.push_literal(&[1]).unwrap();
        wtr.push_literal(&[2, 3]).unwrap();
        assert_eq!(wtr.finish(Terminator::EndOfFrame).unwrap(), [0x05, 0x00, 1, 2, 3, 0x02, 0x00]);
    }

    #[test]
    fn literal_does_not_grow_across_a_bank() {
        // a 5 byte literal starting 7 bytes before the bank ends exactly on it
        let mut wtr = StreamWriter::new(0xFFF9);
        wtr.push_literal(&[1, 2, 3, 4, 5]).unwrap();
        wtr.push_literal(&[6]).unwrap();

        let out = wtr.finish(Terminator::EndOfFrame).unwrap();
        assert_eq!(&out[..7], &[0x09, 0x00, 1, 2, 3, 4, 5]);
        // the next byte opens a fresh literal at the start of the next bank
        assert_eq!(&out[7..11], &[0x01, 0x00, 6, 0x02]);
    }

    #[test]
    fn never_leaves_one_byte_in_a_bank() {
        let mut wtr = StreamWriter::new(0xFFF0);
        // 2 + 13 bytes would leave a single byte free
        wtr.push_literal(&[7; 13]).unwrap();

        let out = wtr.finish(Terminator::EndOfFrame).unwrap();
        assert_eq!(&out[..2], &[0x00, 0x00]);
        assert!(out[2..16].iter().all(|&b| b == 0));
        assert_eq!(&out[16..18], &[0x19, 0x00]);
    }
}
