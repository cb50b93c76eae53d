//! Match finding against the canvas that is being rebuilt.
//!
//! The dictionary is always a canvas: either the frame under construction (for the
//! first frame), or the previous frame that is being overwritten in place (for every
//! delta frame). Bytes before the cursor already hold the new frame, bytes after it
//! still hold whatever the decoder will find there when the next command runs.

use crate::opcode::MAX_DICTIONARY_OFFSET;

/// Which part of the dictionary holds bytes the decoder can copy from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visibility {
    /// Only bytes already written for this frame (the initial frame)
    UpToCursor,
    /// The whole canvas (delta frames: untouched bytes still hold the prior frame)
    Whole,
}

/// Everything the matcher may look at while encoding one frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompressionContext<'a> {
    dictionary: &'a [u8],
    visibility: Visibility,
    max_period: usize,
}

impl<'a> CompressionContext<'a> {
    pub(crate) fn new(dictionary: &'a [u8], visibility: Visibility, max_period: usize) -> Self {
        Self {
            dictionary,
            visibility,
            max_period,
        }
    }

    /// Number of leading dictionary bytes a copy may start from
    fn extent(&self, cursor: usize) -> usize {
        let live = match self.visibility {
            Visibility::UpToCursor => cursor,
            Visibility::Whole => self.dictionary.len(),
        };

        live.min(MAX_DICTIONARY_OFFSET + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchKind {
    /// A period ending right at the cursor, repeated by an overlapping copy
    Pattern,
    /// A plain substring somewhere in the dictionary
    Substring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Match {
    /// dictionary position the copy reads from
    pub offset: usize,
    pub len: usize,
    pub kind: MatchKind,
}

impl Match {
    fn new(offset: usize, len: usize, kind: MatchKind) -> Self {
        Self { offset, len, kind }
    }
}

/// Find the longest run of `source` that a single dictionary copy placed at `cursor`
/// would reproduce.
///
/// Pattern matches are tried first and are only replaced by a strictly longer
/// substring match. Short matches are returned as found; deciding whether they are
/// worth a copy is left to the caller.
pub(crate) fn find_best_match(
    source: &[u8],
    ctx: &CompressionContext,
    cursor: usize,
) -> Option<Match> {
    let pattern = find_pattern(source, ctx, cursor);
    let best_len = pattern.map_or(0, |m| m.len);
    if best_len == source.len() {
        return pattern;
    }

    match find_substring(source, ctx, cursor) {
        Some(sub) if sub.len > best_len => Some(sub),
        _ => pattern,
    }
}

/// Try every period `p` that ends at the cursor and keep the one whose repetition
/// covers the longest prefix of `source`.
fn find_pattern(source: &[u8], ctx: &CompressionContext, cursor: usize) -> Option<Match> {
    let max_period = cursor.min(source.len()).min(ctx.max_period);
    let mut best: Option<Match> = None;

    for period in 1..=max_period {
        let start = cursor - period;
        if start > MAX_DICTIONARY_OFFSET {
            continue;
        }

        let pattern = &ctx.dictionary[start..cursor];
        let len = source
            .iter()
            .zip(pattern.iter().cycle())
            .take_while(|(s, d)| s == d)
            .count();

        if len > best.map_or(0, |m| m.len) {
            best = Some(Match::new(start, len, MatchKind::Pattern));
            if len == source.len() {
                break;
            }
        }
    }

    best
}

/// Brute force search of every visible dictionary position.
fn find_substring(source: &[u8], ctx: &CompressionContext, cursor: usize) -> Option<Match> {
    let dict = ctx.dictionary;
    let mut best: Option<Match> = None;

    for offset in 0..ctx.extent(cursor) {
        let len = if offset < cursor {
            // reads that reach the cursor see bytes this same copy has just written
            let behind = &dict[offset..cursor];
            source
                .iter()
                .enumerate()
                .take_while(|&(i, s)| {
                    let d = behind.get(i).copied().unwrap_or_else(|| source[i - behind.len()]);
                    *s == d
                })
                .count()
        } else {
            source
                .iter()
                .zip(&dict[offset..])
                .take_while(|(s, d)| s == d)
                .count()
        };

        if len > best.map_or(0, |m| m.len) {
            best = Some(Match::new(offset, len, MatchKind::Substring));
            if len == source.len() {
                break;
            }
        }
    }

    best
}
