//! Styled ASS subtitle track, one caption event per verse.
//!
//! Events come either from the rebased verse timings or, in fallback mode,
//! from a prefix sum over a per-verse duration array.

use tracing::warn;

use crate::error::{Error, Result};
use crate::types::VerseTiming;

/// Style parameters for the burned-in verse captions.
#[derive(Debug, Clone)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    /// Text color as `#RRGGBB`.
    pub text_color: String,
    /// Outline color as `#RRGGBB`.
    pub outline_color: String,
    pub outline_width: u32,
    /// ASS numpad alignment (2 = bottom center, 5 = middle center, 8 = top center).
    pub alignment: u32,
    /// Vertical position of the caption block, percent from the top edge.
    pub vertical_position_pct: f32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Amiri".to_string(),
            font_size: 48,
            text_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            outline_width: 2,
            alignment: 2,
            vertical_position_pct: 80.0,
        }
    }
}

/// Where the caption events' time spans come from.
pub enum SubtitleTiming<'a> {
    /// One event per verse from the rebased timing list.
    Timed(&'a [VerseTiming]),
    /// Cue boundaries from a prefix sum over per-verse durations.
    Durations(&'a [f64]),
}

/// Build a complete ASS document.
///
/// Fails (rather than emitting a malformed track) when the verse text is
/// missing or the timing input's length does not match the verse count.
/// An all-zero duration array substitutes a uniform one second per verse.
pub fn build_track(
    verses: &[String],
    style: &SubtitleStyle,
    timing: SubtitleTiming<'_>,
    play_res: (u32, u32),
) -> Result<String> {
    if verses.is_empty() {
        return Err(Error::Subtitle("no verse text to build a track from".into()));
    }

    let spans: Vec<(f64, f64)> = match timing {
        SubtitleTiming::Timed(timings) => {
            if timings.len() != verses.len() {
                return Err(Error::Subtitle(format!(
                    "timing count {} does not match verse count {}",
                    timings.len(),
                    verses.len()
                )));
            }
            timings.iter().map(|t| (t.start, t.end)).collect()
        }
        SubtitleTiming::Durations(durations) => {
            if durations.len() != verses.len() {
                return Err(Error::Subtitle(format!(
                    "duration count {} does not match verse count {}",
                    durations.len(),
                    verses.len()
                )));
            }
            prefix_sum_spans(durations)
        }
    };

    let (res_x, res_y) = play_res;
    let margin_v = margin_from_top_pct(res_y, style.vertical_position_pct, style.alignment);

    let mut doc = String::new();
    doc.push_str("[Script Info]\n");
    doc.push_str("ScriptType: v4.00+\n");
    doc.push_str(&format!("PlayResX: {res_x}\n"));
    doc.push_str(&format!("PlayResY: {res_y}\n"));
    doc.push_str("WrapStyle: 0\n\n");

    doc.push_str("[V4+ Styles]\n");
    doc.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    doc.push_str(&format!(
        "Style: Verse,{},{},{},{},{},&H00000000,0,0,0,0,100,100,0,0,1,{},0,{},30,30,{},1\n\n",
        style.font_name,
        style.font_size,
        ass_color(&style.text_color),
        ass_color(&style.text_color),
        ass_color(&style.outline_color),
        style.outline_width,
        style.alignment,
        margin_v,
    ));

    doc.push_str("[Events]\n");
    doc.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Text\n");

    // Inline overrides repeat the style choices per event so a player that
    // mangles the style block still renders the requested look.
    let overrides = format!(
        "{{\\an{}\\fn{}\\fs{}\\c{}\\3c{}\\bord{}}}",
        style.alignment,
        style.font_name,
        style.font_size,
        ass_color(&style.text_color),
        ass_color(&style.outline_color),
        style.outline_width,
    );

    for (text, (start, end)) in verses.iter().zip(&spans) {
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Verse,,0,0,0,,{}{}\n",
            format_ass_time(*start),
            format_ass_time(*end),
            overrides,
            escape_ass_text(text),
        ));
    }

    Ok(doc)
}

fn prefix_sum_spans(durations: &[f64]) -> Vec<(f64, f64)> {
    let all_zero = durations.iter().all(|d| *d == 0.0);
    if all_zero {
        warn!("all per-verse durations are zero, substituting 1s per verse");
    }

    let mut cursor = 0.0;
    durations
        .iter()
        .map(|d| {
            let d = if all_zero { 1.0 } else { *d };
            let span = (cursor, cursor + d);
            cursor += d;
            span
        })
        .collect()
}

/// `H:MM:SS.CC` with hours unpadded and centisecond precision, as ASS expects.
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let h = total_cs / 360_000;
    let m = (total_cs % 360_000) / 6_000;
    let s = (total_cs % 6_000) / 100;
    let cs = total_cs % 100;
    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

/// Parse an `H:MM:SS.CC` timestamp back to seconds.
pub fn parse_ass_time(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let (s, cs) = rest.split_once('.')?;
    let s: u64 = s.parse().ok()?;
    let cs: u64 = cs.parse().ok()?;
    Some(h as f64 * 3600.0 + m as f64 * 60.0 + s as f64 + cs as f64 / 100.0)
}

/// `#RRGGBB` -> ASS `&HAABBGGRR&` (alpha 0 = opaque).
fn ass_color(hex: &str) -> String {
    let hex = hex.trim_start_matches('#');
    if hex.len() == 6 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&hex[0..2], 16),
            u8::from_str_radix(&hex[2..4], 16),
            u8::from_str_radix(&hex[4..6], 16),
        ) {
            return format!("&H00{b:02X}{g:02X}{r:02X}&");
        }
    }
    warn!(color = hex, "unparseable color, falling back to white");
    "&H00FFFFFF&".to_string()
}

/// MarginV for a caption block at `pct` percent from the top of the frame.
/// Bottom-anchored alignments measure the margin from the bottom edge.
fn margin_from_top_pct(res_y: u32, pct: f32, alignment: u32) -> u32 {
    let y = (res_y as f32 * (pct / 100.0)).round() as i32;
    match alignment {
        1..=3 => (res_y as i32 - y).max(0) as u32,
        _ => y.max(0) as u32,
    }
}

fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("آية {}", i + 1)).collect()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_ass_time(3661.234), "1:01:01.23");
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(59.999), "0:01:00.00");
    }

    #[test]
    fn test_timestamp_round_trip() {
        for &secs in &[0.0, 1.5, 3661.234, 7322.99] {
            let formatted = format_ass_time(secs);
            let parsed = parse_ass_time(&formatted).unwrap();
            assert!(
                (parsed - secs).abs() < 0.01,
                "{secs} -> {formatted} -> {parsed}"
            );
        }
    }

    #[test]
    fn test_timed_track_one_event_per_verse() {
        let timings = vec![
            VerseTiming { verse: 1, start: 0.2, end: 4.0 },
            VerseTiming { verse: 2, start: 4.0, end: 9.5 },
        ];
        let doc = build_track(
            &verses(2),
            &SubtitleStyle::default(),
            SubtitleTiming::Timed(&timings),
            (1080, 1920),
        )
        .unwrap();

        assert_eq!(doc.matches("Dialogue:").count(), 2);
        assert!(doc.contains("0:00:00.20,0:00:04.00"));
        assert!(doc.contains("0:00:04.00,0:00:09.50"));
    }

    #[test]
    fn test_fallback_prefix_sum() {
        let doc = build_track(
            &verses(3),
            &SubtitleStyle::default(),
            SubtitleTiming::Durations(&[2.0, 3.0, 1.5]),
            (1080, 1920),
        )
        .unwrap();

        assert!(doc.contains("0:00:00.00,0:00:02.00"));
        assert!(doc.contains("0:00:02.00,0:00:05.00"));
        assert!(doc.contains("0:00:05.00,0:00:06.50"));
    }

    #[test]
    fn test_fallback_all_zero_uses_uniform_second() {
        let doc = build_track(
            &verses(2),
            &SubtitleStyle::default(),
            SubtitleTiming::Durations(&[0.0, 0.0]),
            (1080, 1920),
        )
        .unwrap();

        assert!(doc.contains("0:00:00.00,0:00:01.00"));
        assert!(doc.contains("0:00:01.00,0:00:02.00"));
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let result = build_track(
            &verses(3),
            &SubtitleStyle::default(),
            SubtitleTiming::Durations(&[1.0, 2.0]),
            (1080, 1920),
        );
        assert!(matches!(result, Err(Error::Subtitle(_))));
    }

    #[test]
    fn test_missing_text_is_error() {
        let result = build_track(
            &[],
            &SubtitleStyle::default(),
            SubtitleTiming::Durations(&[]),
            (1080, 1920),
        );
        assert!(matches!(result, Err(Error::Subtitle(_))));
    }

    #[test]
    fn test_style_overrides_present() {
        let style = SubtitleStyle {
            text_color: "#00FF80".to_string(),
            ..SubtitleStyle::default()
        };
        let doc = build_track(
            &verses(1),
            &style,
            SubtitleTiming::Durations(&[2.0]),
            (1080, 1920),
        )
        .unwrap();

        // BGR ordering in the ASS color tag.
        assert!(doc.contains("&H0080FF00&"));
        assert!(doc.contains("\\fnAmiri"));
    }

    #[test]
    fn test_event_text_escaped() {
        let doc = build_track(
            &["نص {مع} أقواس".to_string()],
            &SubtitleStyle::default(),
            SubtitleTiming::Durations(&[1.0]),
            (1080, 1920),
        )
        .unwrap();
        assert!(doc.contains("\\{مع\\}"));
    }
}
