//! LCS token alignment between canonical verse text and recognized speech.
//!
//! The canonical side comes from the text edition, the recognized side from a
//! speech-to-text transcript. Both are tokenized on whitespace, normalized
//! with [`crate::normalize::normalize_token`], and matched with a classic
//! longest-common-subsequence dynamic program over normalized equality.

use tracing::debug;

use crate::error::{Error, Result};
use crate::normalize::normalize_token;
use crate::types::{Transcript, VerseText};

/// One canonical word, tagged with the verse it belongs to.
#[derive(Debug, Clone)]
pub struct CanonicalToken {
    pub normalized: String,
    pub verse: u32,
    pub raw: String,
    pub index: usize,
}

/// One recognized word with its time span.
#[derive(Debug, Clone)]
pub struct RecognizedToken {
    pub normalized: String,
    pub start: f64,
    pub end: f64,
}

/// A recognized token bound to the canonical token it was aligned to.
/// The match sequence is non-decreasing in both token orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerseMatch {
    pub verse: u32,
    pub start: f64,
    pub end: f64,
}

/// Split each verse's text on whitespace in verse order, normalize, and drop
/// tokens with no comparable content.
pub fn canonical_tokens(verses: &[VerseText]) -> Vec<CanonicalToken> {
    let mut tokens = Vec::new();
    for verse in verses {
        for word in verse.text.split_whitespace() {
            let normalized = normalize_token(word);
            if normalized.is_empty() {
                continue;
            }
            tokens.push(CanonicalToken {
                normalized,
                verse: verse.verse,
                raw: word.to_string(),
                index: tokens.len(),
            });
        }
    }
    tokens
}

/// Flatten a transcript into timed recognized tokens.
///
/// Word-level timestamps are used directly when the engine provides them.
/// Segment-only entries get word boundaries interpolated across the segment's
/// `[start, end]` window proportionally to each word's character length.
pub fn recognized_tokens(transcript: &Transcript) -> Vec<RecognizedToken> {
    let mut tokens = Vec::new();
    for segment in &transcript.segments {
        match &segment.words {
            Some(words) if !words.is_empty() => {
                for word in words {
                    push_token(&mut tokens, &word.text, word.start, word.end);
                }
            }
            _ => interpolate_segment(&mut tokens, &segment.text, segment.start, segment.end),
        }
    }
    tokens
}

fn push_token(tokens: &mut Vec<RecognizedToken>, text: &str, start: f64, end: f64) {
    let normalized = normalize_token(text);
    if normalized.is_empty() {
        return;
    }
    tokens.push(RecognizedToken {
        normalized,
        start,
        end,
    });
}

fn interpolate_segment(tokens: &mut Vec<RecognizedToken>, text: &str, start: f64, end: f64) {
    let words: Vec<&str> = text.split_whitespace().collect();
    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    if total_chars == 0 {
        return;
    }

    let span = (end - start).max(0.0);
    let mut cursor = start;
    for word in words {
        let share = word.chars().count() as f64 / total_chars as f64;
        let word_end = cursor + span * share;
        push_token(tokens, word, cursor, word_end);
        cursor = word_end;
    }
}

/// Align canonical tokens against recognized tokens.
///
/// Classic LCS over normalized equality, O(N·M) time and space. Backtracking
/// from `(N, M)` consumes equal tokens first, otherwise steps toward the
/// larger sub-solution; on equal DP values the canonical index is decremented
/// (ties break toward the canonical axis).
///
/// Zero matches overall is an unrecoverable alignment failure for the whole
/// requested range. Partial failure is handled per-verse downstream, but an
/// empty match list leaves nothing to aggregate.
pub fn align(canonical: &[CanonicalToken], recognized: &[RecognizedToken]) -> Result<Vec<VerseMatch>> {
    let n = canonical.len();
    let m = recognized.len();
    if n == 0 || m == 0 {
        return Err(Error::Alignment(
            "no comparable tokens on one side of the alignment".into(),
        ));
    }

    // dp[i][j] = LCS length of canonical[..i] vs recognized[..j].
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = if canonical[i - 1].normalized == recognized[j - 1].normalized {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let mut matches = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        if canonical[i - 1].normalized == recognized[j - 1].normalized {
            matches.push(VerseMatch {
                verse: canonical[i - 1].verse,
                start: recognized[j - 1].start,
                end: recognized[j - 1].end,
            });
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] >= dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    matches.reverse();

    debug!(
        canonical = n,
        recognized = m,
        matched = matches.len(),
        "token alignment complete"
    );

    if matches.is_empty() {
        return Err(Error::Alignment(
            "no tokens matched between transcript and canonical text".into(),
        ));
    }

    Ok(matches)
}
