use std::path::PathBuf;
use std::time::Duration;

use crate::subtitle::SubtitleStyle;

/// How the background clip is fitted to the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Scale to fit, pad with black bars.
    Fit,
    /// Scale to cover, crop the overflow.
    Fill,
}

/// Builder for a render job.
pub struct RenderOptions {
    /// Surah number (1-114).
    pub surah: u32,
    /// First verse of the requested range.
    pub from_verse: u32,
    /// Last verse of the requested range (inclusive).
    pub to_verse: u32,
    /// Text edition identifier (e.g. "quran-uthmani").
    pub text_edition: String,
    /// Reciter edition identifier (e.g. "ar.alafasy"). Ignored when
    /// `audio_path` supplies user audio.
    pub reciter_edition: Option<String>,
    /// User-supplied recitation audio. Takes precedence over the reciter
    /// edition fetch.
    pub audio_path: Option<PathBuf>,
    /// Background video clip, looped to cover the trim duration.
    pub background: PathBuf,
    pub style: SubtitleStyle,
    pub crop_mode: CropMode,
    /// Overlay a surah/verse-range caption in the corner.
    pub overlay_metadata: bool,
    pub output_width: u32,
    pub output_height: u32,
    /// Working directory for intermediates. Defaults under the user cache dir.
    pub work_dir: Option<PathBuf>,
    /// Keep trimmed audio, subtitle file, and text dumps after a successful
    /// publish.
    pub keep_intermediates: bool,
    /// Audio readiness poll interval.
    pub audio_poll_interval: Duration,
    /// Bounded attempt count for the audio readiness wait.
    pub audio_poll_attempts: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            surah: 1,
            from_verse: 1,
            to_verse: 7,
            text_edition: "quran-uthmani".to_string(),
            reciter_edition: Some("ar.alafasy".to_string()),
            audio_path: None,
            background: PathBuf::new(),
            style: SubtitleStyle::default(),
            crop_mode: CropMode::Fill,
            overlay_metadata: false,
            output_width: 1080,
            output_height: 1920,
            work_dir: None,
            keep_intermediates: false,
            audio_poll_interval: Duration::from_millis(500),
            audio_poll_attempts: 60,
        }
    }
}

impl RenderOptions {
    pub fn new(surah: u32, from_verse: u32, to_verse: u32) -> Self {
        Self {
            surah,
            from_verse,
            to_verse,
            ..Self::default()
        }
    }

    pub fn text_edition(mut self, edition: &str) -> Self {
        self.text_edition = edition.to_string();
        self
    }

    pub fn reciter(mut self, edition: &str) -> Self {
        self.reciter_edition = Some(edition.to_string());
        self
    }

    pub fn audio_path(mut self, path: PathBuf) -> Self {
        self.audio_path = Some(path);
        self
    }

    pub fn background(mut self, path: PathBuf) -> Self {
        self.background = path;
        self
    }

    pub fn style(mut self, style: SubtitleStyle) -> Self {
        self.style = style;
        self
    }

    pub fn crop_mode(mut self, mode: CropMode) -> Self {
        self.crop_mode = mode;
        self
    }

    pub fn overlay_metadata(mut self, enabled: bool) -> Self {
        self.overlay_metadata = enabled;
        self
    }

    pub fn output_size(mut self, width: u32, height: u32) -> Self {
        self.output_width = width;
        self.output_height = height;
        self
    }

    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }

    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    /// Resolve the working directory, defaulting to
    /// `~/.cache/versecast/work`.
    pub fn resolve_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("versecast")
                .join("work")
        })
    }

    /// The requested verse numbers, in order.
    pub fn verse_numbers(&self) -> Vec<u32> {
        (self.from_verse..=self.to_verse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let options = RenderOptions::new(36, 1, 12)
            .text_edition("quran-simple")
            .reciter("ar.husary")
            .output_size(1920, 1080)
            .overlay_metadata(true);

        assert_eq!(options.surah, 36);
        assert_eq!(options.verse_numbers().len(), 12);
        assert_eq!(options.text_edition, "quran-simple");
        assert!(options.overlay_metadata);
    }

    #[test]
    fn test_resolve_work_dir_override() {
        let options = RenderOptions::default().work_dir(PathBuf::from("/tmp/vc"));
        assert_eq!(options.resolve_work_dir(), PathBuf::from("/tmp/vc"));
    }
}
