//! Verse timing aggregation: collapse token matches into one interval per
//! verse, repair unmatched verses, and derive the render trim window.

use tracing::debug;

use crate::align::VerseMatch;
use crate::types::{TrimWindow, VerseText, VerseTiming};

/// Estimated recitation speed used when extrapolating a trailing gap.
const SECONDS_PER_CHAR: f64 = 0.13;
/// Buffer added to a trailing-gap estimate.
const TAIL_BUFFER_SECS: f64 = 2.0;
/// Padding before the first aligned verse when trimming.
const LEAD_IN_SECS: f64 = 0.2;
/// Padding after the last aligned verse when trimming.
const LEAD_OUT_SECS: f64 = 0.5;

/// Collapse the ordered match list into exactly one `VerseTiming` per
/// requested verse.
///
/// Verses with at least one match take the first match's start and the last
/// match's end. Verses with no match are repaired by gap filling:
/// - A gap bounded by a resolved successor is split evenly across the
///   unresolved verses (`nextStart - prevEnd`, range start counts as time 0).
/// - A trailing gap is extrapolated from raw character length
///   (`prevEnd + chars × 0.13 s + 2.0 s`), capped to the known total audio
///   duration, then split evenly.
///
/// A final continuity pass extends each verse's end forward to the next
/// verse's start, so no silent gap is left between adjacent subtitle cues.
/// The reverse case (a verse overlapping into its successor) is deliberately
/// not corrected.
pub fn aggregate(
    matches: &[VerseMatch],
    verses: &[VerseText],
    total_duration: Option<f64>,
) -> Vec<VerseTiming> {
    let mut spans: Vec<Option<(f64, f64)>> = vec![None; verses.len()];

    // Matches are order-preserving, so the first match for a verse carries
    // its minimum start and the last match its maximum end.
    for (idx, verse) in verses.iter().enumerate() {
        let mut span: Option<(f64, f64)> = None;
        for m in matches.iter().filter(|m| m.verse == verse.verse) {
            span = Some(match span {
                None => (m.start, m.end),
                Some((s, e)) => (s.min(m.start), e.max(m.end)),
            });
        }
        spans[idx] = span;
    }

    fill_gaps(&mut spans, verses, total_duration);

    let mut timings: Vec<VerseTiming> = verses
        .iter()
        .zip(&spans)
        .map(|(verse, span)| {
            // fill_gaps resolved every remaining None.
            let (start, end) = span.unwrap_or((0.0, 0.0));
            VerseTiming {
                verse: verse.verse,
                start,
                end,
            }
        })
        .collect();

    enforce_continuity(&mut timings);

    debug!(
        verses = timings.len(),
        matches = matches.len(),
        "verse timings aggregated"
    );
    timings
}

fn fill_gaps(spans: &mut [Option<(f64, f64)>], verses: &[VerseText], total_duration: Option<f64>) {
    let len = spans.len();
    let mut i = 0;
    while i < len {
        if spans[i].is_some() {
            i += 1;
            continue;
        }

        // Maximal run of unresolved verses [i, j).
        let mut j = i;
        while j < len && spans[j].is_none() {
            j += 1;
        }

        let prev_end = if i == 0 { 0.0 } else { spans[i - 1].map(|(_, e)| e).unwrap_or(0.0) };
        let run = (j - i) as f64;

        let gap_end = if j < len {
            spans[j].map(|(s, _)| s).unwrap_or(prev_end)
        } else {
            // Trailing gap: estimate from character length, capped to the
            // known audio duration when available.
            let chars: usize = verses[i..j]
                .iter()
                .map(|v| v.text.chars().count())
                .sum();
            let mut estimate = prev_end + chars as f64 * SECONDS_PER_CHAR + TAIL_BUFFER_SECS;
            if let Some(total) = total_duration {
                estimate = estimate.min(total);
            }
            estimate
        };

        let per_verse = (gap_end - prev_end) / run;
        let mut cursor = prev_end;
        for span in spans[i..j].iter_mut() {
            *span = Some((cursor, cursor + per_verse));
            cursor += per_verse;
        }

        i = j;
    }
}

fn enforce_continuity(timings: &mut [VerseTiming]) {
    for i in 0..timings.len().saturating_sub(1) {
        let next_start = timings[i + 1].start;
        if timings[i].end < next_start {
            timings[i].end = next_start;
        }
    }
}

impl TrimWindow {
    /// Compute the trim window from a resolved timing sequence.
    ///
    /// `offset` gets the lead-in subtracted without clamping. A negative
    /// offset is passed through and means "no seek" to the audio caller.
    pub fn from_timings(timings: &[VerseTiming]) -> Option<TrimWindow> {
        let first = timings.first()?;
        let last = timings.last()?;
        let offset = first.start - LEAD_IN_SECS;
        Some(TrimWindow {
            offset,
            duration: (last.end - offset) + LEAD_OUT_SECS,
        })
    }

    /// Fallback window when no alignment ran: the whole audio, rounded up,
    /// plus one second.
    pub fn fallback(raw_audio_duration: f64) -> TrimWindow {
        TrimWindow {
            offset: 0.0,
            duration: raw_audio_duration.ceil() + 1.0,
        }
    }

    /// Shift a timing sequence onto the trimmed timeline, so subtitle cues
    /// line up with the re-based audio/video.
    pub fn rebase(&self, timings: &[VerseTiming]) -> Vec<VerseTiming> {
        timings
            .iter()
            .map(|t| VerseTiming {
                verse: t.verse,
                start: t.start - self.offset,
                end: t.end - self.offset,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verse(n: u32, text: &str) -> VerseText {
        VerseText {
            verse: n,
            text: text.to_string(),
        }
    }

    fn m(verse: u32, start: f64, end: f64) -> VerseMatch {
        VerseMatch { verse, start, end }
    }

    #[test]
    fn test_one_timing_per_verse_no_sentinels() {
        let verses = vec![verse(1, "اول"), verse(2, "ثاني"), verse(3, "ثالث")];
        let matches = vec![m(1, 0.0, 2.0), m(3, 5.0, 7.0)];

        let timings = aggregate(&matches, &verses, Some(10.0));
        assert_eq!(timings.len(), 3);
        for t in &timings {
            assert!(t.end >= t.start);
        }
    }

    #[test]
    fn test_matched_verse_spans_first_to_last_match() {
        let verses = vec![verse(1, "بسم الله الرحمن")];
        let matches = vec![m(1, 1.0, 1.5), m(1, 1.6, 2.2), m(1, 2.3, 3.0)];

        let timings = aggregate(&matches, &verses, None);
        assert_eq!(timings[0].start, 1.0);
        assert_eq!(timings[0].end, 3.0);
    }

    #[test]
    fn test_interior_gap_split_evenly() {
        // Gap of 3 unresolved verses between prevEnd=10.0 and nextStart=16.0:
        // 2.0s each, starts 10/12/14, ends 12/14/16.
        let verses = vec![
            verse(1, "ا"),
            verse(2, "ب"),
            verse(3, "ج"),
            verse(4, "د"),
            verse(5, "ه"),
        ];
        let matches = vec![m(1, 8.0, 10.0), m(5, 16.0, 18.0)];

        let timings = aggregate(&matches, &verses, None);
        assert!((timings[1].start - 10.0).abs() < 1e-9);
        assert!((timings[1].end - 12.0).abs() < 1e-9);
        assert!((timings[2].start - 12.0).abs() < 1e-9);
        assert!((timings[2].end - 14.0).abs() < 1e-9);
        assert!((timings[3].start - 14.0).abs() < 1e-9);
        assert!((timings[3].end - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_gap_estimate_capped_to_duration() {
        // prevEnd=5.0, one unresolved verse of 20 chars, total duration 8.0:
        // estimate 5.0 + 20*0.13 + 2.0 = 9.6, capped to 8.0.
        let text: String = std::iter::repeat('ب').take(20).collect();
        let verses = vec![verse(1, "ا"), verse(2, &text)];
        let matches = vec![m(1, 3.0, 5.0)];

        let timings = aggregate(&matches, &verses, Some(8.0));
        assert!((timings[1].start - 5.0).abs() < 1e-9);
        assert!((timings[1].end - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_gap_uncapped_without_duration() {
        let text: String = std::iter::repeat('ب').take(20).collect();
        let verses = vec![verse(1, "ا"), verse(2, &text)];
        let matches = vec![m(1, 3.0, 5.0)];

        let timings = aggregate(&matches, &verses, None);
        assert!((timings[1].end - 9.6).abs() < 1e-9);
    }

    #[test]
    fn test_leading_gap_starts_at_zero() {
        let verses = vec![verse(1, "ا"), verse(2, "ب")];
        let matches = vec![m(2, 4.0, 6.0)];

        let timings = aggregate(&matches, &verses, None);
        assert!((timings[0].start - 0.0).abs() < 1e-9);
        assert!((timings[0].end - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_continuity_closes_forward_gaps() {
        let verses = vec![verse(1, "ا"), verse(2, "ب")];
        let matches = vec![m(1, 0.0, 1.0), m(2, 3.0, 4.0)];

        let timings = aggregate(&matches, &verses, None);
        // end[0] extended forward to start[1].
        assert_eq!(timings[0].end, 3.0);
        for pair in timings.windows(2) {
            assert!(pair[0].end >= pair[1].start);
        }
    }

    #[test]
    fn test_continuity_leaves_overlaps_alone() {
        let verses = vec![verse(1, "ا"), verse(2, "ب")];
        let matches = vec![m(1, 0.0, 5.0), m(2, 3.0, 6.0)];

        let timings = aggregate(&matches, &verses, None);
        // Overlap into the successor is not trimmed back.
        assert_eq!(timings[0].end, 5.0);
        assert_eq!(timings[1].start, 3.0);
    }

    #[test]
    fn test_trim_window() {
        let timings = vec![
            VerseTiming { verse: 1, start: 2.0, end: 10.0 },
            VerseTiming { verse: 2, start: 10.0, end: 40.0 },
        ];
        let window = TrimWindow::from_timings(&timings).unwrap();
        assert!((window.offset - 1.8).abs() < 1e-9);
        assert!((window.duration - 38.7).abs() < 1e-9);
    }

    #[test]
    fn test_trim_window_negative_offset_means_no_seek() {
        let timings = vec![VerseTiming { verse: 1, start: 0.1, end: 5.0 }];
        let window = TrimWindow::from_timings(&timings).unwrap();
        assert!(window.offset < 0.0);
        assert_eq!(window.seek_offset(), None);
    }

    #[test]
    fn test_trim_window_fallback() {
        let window = TrimWindow::fallback(12.4);
        assert_eq!(window.offset, 0.0);
        assert_eq!(window.duration, 14.0);
    }

    #[test]
    fn test_rebase_shifts_by_offset() {
        let timings = vec![VerseTiming { verse: 1, start: 2.0, end: 4.0 }];
        let window = TrimWindow { offset: 1.8, duration: 10.0 };
        let rebased = window.rebase(&timings);
        assert!((rebased[0].start - 0.2).abs() < 1e-9);
        assert!((rebased[0].end - 2.2).abs() < 1e-9);
    }
}
