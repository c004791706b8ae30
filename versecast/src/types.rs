use serde::{Deserialize, Serialize};

/// A recognized word with timing, as produced by a speech-to-text engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// A transcript segment (phrase-level). `words` is present when the engine
/// provides word-level timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub words: Option<Vec<TranscriptWord>>,
}

/// Speech-to-text output for one audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub duration: f64,
}

impl Transcript {
    /// Whether any segment carries usable text.
    pub fn has_content(&self) -> bool {
        self.segments.iter().any(|s| !s.text.trim().is_empty())
    }
}

/// One verse's canonical text, in verse order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerseText {
    pub verse: u32,
    pub text: String,
}

/// Resolved time interval within the source audio for one verse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerseTiming {
    pub verse: u32,
    pub start: f64,
    pub end: f64,
}

/// Global audio trim window computed from the full verse timing sequence.
///
/// A negative `offset` is passed through as-is; the audio-seek caller treats
/// it as "no seek" (see [`TrimWindow::seek_offset`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub offset: f64,
    pub duration: f64,
}

impl TrimWindow {
    /// Seek position for the audio input, or `None` when the lead-in padding
    /// pushed the offset at or below zero.
    pub fn seek_offset(&self) -> Option<f64> {
        (self.offset > 0.0).then_some(self.offset)
    }
}
