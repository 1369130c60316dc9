//! Scramble and reveal frames
//!
//! Cosmetic sequences shown while text changes hands: every sensitive
//! region is overwritten with filler characters of the same length for a
//! bounded number of frames, then the final text is written. Frames are
//! plain strings; timing belongs to the caller's scheduler.

use crate::privacy::masking::PiiMatch;
use crate::privacy::token::TokenMapping;
use crate::privacy::unmasking::UnmaskingEngine;
use rand::seq::SliceRandom;
use rand::Rng;

/// Characters used for filler frames
pub const FILLER_CHARS: [char; 8] = ['@', '#', '0', '1', '&', '*', '%', '?'];

/// A frame sequence ending in the text that must persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    /// Intermediate filler frames
    pub frames: Vec<String>,
    /// Text written after the last frame
    pub final_text: String,
}

/// `len` random filler characters
pub fn filler<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| *FILLER_CHARS.choose(rng).unwrap_or(&'#'))
        .collect()
}

/// Frames that reveal every known token in `text`.
///
/// Returns `None` when the mapping resolves no token in the text.
pub fn reveal_plan<R: Rng + ?Sized>(
    rng: &mut R,
    engine: &UnmaskingEngine,
    text: &str,
    mapping: &TokenMapping,
    steps: u32,
) -> Option<FramePlan> {
    let spans = engine.find_tokens(text);
    let regions: Vec<(usize, usize, usize)> = spans
        .iter()
        .filter_map(|span| {
            mapping
                .get(&span.token)
                .map(|value| (span.start, span.end, value.chars().count()))
        })
        .collect();
    if regions.is_empty() {
        return None;
    }

    let frames = (0..steps)
        .map(|_| overwrite(rng, text, &regions))
        .collect();

    Some(FramePlan {
        frames,
        final_text: engine.decode(text, mapping),
    })
}

/// Frames that scramble each match of the original text before
/// `final_text` (the masked text) replaces it.
pub fn scramble_plan<R: Rng + ?Sized>(
    rng: &mut R,
    text: &str,
    matches: &[PiiMatch],
    steps: u32,
    final_text: String,
) -> FramePlan {
    let regions: Vec<(usize, usize, usize)> = matches
        .iter()
        .map(|m| (m.start, m.end, m.value.chars().count()))
        .collect();

    let frames = (0..steps)
        .map(|_| overwrite(rng, text, &regions))
        .collect();

    FramePlan { frames, final_text }
}

/// Replace each `(start, end, len)` region with `len` filler characters.
/// Regions must be sorted and non-overlapping.
fn overwrite<R: Rng + ?Sized>(rng: &mut R, text: &str, regions: &[(usize, usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for &(start, end, len) in regions {
        out.push_str(&text[last..start]);
        out.push_str(&filler(rng, len));
        last = end;
    }
    out.push_str(&text[last..]);
    out
}
