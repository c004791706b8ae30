//! Verse-timed recitation videos: fetch canonical text and audio, align a
//! speech-to-text transcript against the verses, and burn subtitles into a
//! looping background clip with ffmpeg.
//!
//! The high-level entry points are [`render_video`] for the full pipeline
//! and [`align_audio`] for alignment alone. Collaborators (content source,
//! transcriber, publisher) are traits in [`source`], with filesystem and
//! alquran.cloud implementations included.

pub mod align;
pub mod audio;
pub mod config;
pub mod encoder;
pub mod error;
pub mod normalize;
pub mod render;
pub mod source;
pub mod subtitle;
pub mod timing;
pub mod types;

pub use config::{CropMode, RenderOptions};
pub use encoder::{EncoderSelector, VideoEncoder};
pub use error::{Error, Result};
pub use render::{ProgressEvent, ProgressSender, Stage};
pub use source::{
    JsonTranscriber, LocalPublisher, Publisher, QuranApiSource, Recitation, Transcriber,
    VerseSource,
};
pub use subtitle::{SubtitleStyle, SubtitleTiming};
pub use types::{Transcript, TranscriptSegment, TranscriptWord, TrimWindow, VerseText, VerseTiming};

use std::path::Path;

/// Run the full render pipeline: fetch, optionally align, trim, subtitle,
/// encode, publish. Returns the storage key the publisher assigned.
///
/// Pass `None::<&JsonTranscriber>` to skip alignment and fall back to
/// per-verse audio durations for subtitle timing.
pub async fn render_video<S, T, P>(
    options: &RenderOptions,
    source: &S,
    transcriber: Option<&T>,
    publisher: &P,
    selector: &EncoderSelector,
    progress: Option<ProgressSender>,
) -> Result<String>
where
    S: VerseSource,
    T: Transcriber,
    P: Publisher,
{
    render::run(options, source, transcriber, publisher, selector, progress).await
}

/// Align an audio file against canonical verse texts and return per-verse
/// timings, with gaps filled and boundary continuity enforced.
pub async fn align_audio<T: Transcriber>(
    audio_path: &Path,
    verses: &[VerseText],
    transcriber: &T,
) -> Result<Vec<VerseTiming>> {
    let total_duration = audio::probe_duration(audio_path).await.ok();
    render::align_against(audio_path, verses, transcriber, total_duration).await
}
