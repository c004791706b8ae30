//! Video encoder selection with hardware detection and software fallback.
//!
//! The selector owns the process-wide memoized choice. Only one job encodes
//! at a time, so the Mutex guards sequential reuse across jobs, not
//! concurrent mutation.

use std::process::Command;
use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEncoder {
    /// NVIDIA hardware encoder.
    Nvenc,
    /// Apple hardware encoder.
    VideoToolbox,
    /// Intel Quick Sync.
    Qsv,
    /// libx264 software encoding.
    Software,
}

impl VideoEncoder {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoEncoder::Nvenc => "h264_nvenc",
            VideoEncoder::VideoToolbox => "h264_videotoolbox",
            VideoEncoder::Qsv => "h264_qsv",
            VideoEncoder::Software => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, VideoEncoder::Software)
    }

    /// Fixed quality/speed option table per encoder.
    pub fn quality_args(&self) -> &'static [&'static str] {
        match self {
            VideoEncoder::Nvenc => &["-cq", "19", "-preset", "p5", "-tune", "hq", "-rc", "vbr"],
            VideoEncoder::VideoToolbox => &["-q:v", "65", "-allow_sw", "1"],
            VideoEncoder::Qsv => &["-global_quality", "20", "-preset", "medium"],
            VideoEncoder::Software => &["-crf", "18", "-preset", "medium"],
        }
    }
}

/// Memoized encoder choice, injected into render jobs.
///
/// `select()` probes the ffmpeg build once; `downgrade()` permanently pins
/// software encoding for the remainder of the process.
pub struct EncoderSelector {
    choice: Mutex<Option<VideoEncoder>>,
}

impl EncoderSelector {
    pub fn new() -> Self {
        Self {
            choice: Mutex::new(None),
        }
    }

    /// A selector with a pre-seeded choice. Skips the ffmpeg probe.
    pub fn with_choice(encoder: VideoEncoder) -> Self {
        Self {
            choice: Mutex::new(Some(encoder)),
        }
    }

    /// The best available encoder, probing ffmpeg on first use.
    pub fn select(&self) -> VideoEncoder {
        let mut choice = self.choice.lock().expect("encoder selector poisoned");
        *choice.get_or_insert_with(|| {
            let available = probe_encoders();
            let picked = pick(&available);
            info!(encoder = picked.ffmpeg_name(), "selected video encoder");
            picked
        })
    }

    /// Pin software encoding for every subsequent encode in this process.
    pub fn downgrade(&self) {
        let mut choice = self.choice.lock().expect("encoder selector poisoned");
        warn!("hardware encode failed, pinning software encoder");
        *choice = Some(VideoEncoder::Software);
    }
}

impl Default for EncoderSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of the H.264 encoders this ffmpeg build advertises.
fn probe_encoders() -> Vec<String> {
    let output = match Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
    {
        Ok(out) if out.status.success() => out,
        Ok(_) | Err(_) => {
            warn!("could not query ffmpeg encoders, assuming software only");
            return Vec::new();
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|name| name.starts_with("h264_") || *name == "libx264")
        .map(str::to_string)
        .collect()
}

/// Preference order: GPU-vendor encoder, then the platform's hardware
/// encoder, then software.
fn pick(available: &[String]) -> VideoEncoder {
    let has = |name: &str| available.iter().any(|a| a == name);

    if has("h264_nvenc") {
        return VideoEncoder::Nvenc;
    }
    if cfg!(target_os = "macos") && has("h264_videotoolbox") {
        return VideoEncoder::VideoToolbox;
    }
    if has("h264_qsv") {
        return VideoEncoder::Qsv;
    }
    VideoEncoder::Software
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefers_nvenc() {
        let available = names(&["libx264", "h264_qsv", "h264_nvenc"]);
        assert_eq!(pick(&available), VideoEncoder::Nvenc);
    }

    #[test]
    fn test_falls_back_to_software() {
        assert_eq!(pick(&names(&["libx264"])), VideoEncoder::Software);
        assert_eq!(pick(&[]), VideoEncoder::Software);
    }

    #[test]
    fn test_qsv_when_no_vendor_encoder() {
        if !cfg!(target_os = "macos") {
            assert_eq!(pick(&names(&["libx264", "h264_qsv"])), VideoEncoder::Qsv);
        }
    }

    #[test]
    fn test_downgrade_is_sticky() {
        let selector = EncoderSelector::with_choice(VideoEncoder::Nvenc);
        assert_eq!(selector.select(), VideoEncoder::Nvenc);

        selector.downgrade();
        assert_eq!(selector.select(), VideoEncoder::Software);
        // Stays downgraded for subsequent jobs.
        assert_eq!(selector.select(), VideoEncoder::Software);
    }

    #[test]
    fn test_quality_args_per_encoder() {
        assert!(VideoEncoder::Software.quality_args().contains(&"-crf"));
        assert!(VideoEncoder::Nvenc.quality_args().contains(&"-cq"));
        assert!(!VideoEncoder::Software.is_hardware());
        assert!(VideoEncoder::VideoToolbox.is_hardware());
    }
}
