//! Collaborator seams: canonical content source, speech-to-text, and
//! publishing. The render pipeline only sees these traits; the shipped
//! implementations cover the common CLI case.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::{Transcript, VerseText};

/// Bounded retry for resolving a surah's verse count, the one fetch that
/// gates everything else. All other fetch errors surface immediately.
const VERSE_COUNT_ATTEMPTS: u32 = 3;
const VERSE_COUNT_BACKOFF: Duration = Duration::from_secs(2);

/// Per-verse recitation audio for a requested range.
#[derive(Debug, Clone)]
pub struct Recitation {
    /// `(verse, url)` pairs in verse order.
    pub audio_urls: Vec<(u32, String)>,
    /// Per-verse durations in seconds, when the upstream supplies them.
    pub durations: Option<Vec<f64>>,
}

/// Canonical verse text and recitation audio, keyed by edition identifiers.
pub trait VerseSource {
    fn verse_count(&self, surah: u32) -> impl std::future::Future<Output = Result<u32>> + Send;

    fn verses(
        &self,
        surah: u32,
        from: u32,
        to: u32,
        edition: &str,
    ) -> impl std::future::Future<Output = Result<Vec<VerseText>>> + Send;

    fn recitation(
        &self,
        surah: u32,
        from: u32,
        to: u32,
        reciter: &str,
    ) -> impl std::future::Future<Output = Result<Recitation>> + Send;
}

/// Speech-to-text for an audio file. Word-level timestamps are preferred;
/// segment-level entries are accepted and interpolated downstream.
pub trait Transcriber {
    fn transcribe(&self, audio: &Path) -> impl std::future::Future<Output = Result<Transcript>> + Send;
}

/// Upload a finished video, returning a storage key.
pub trait Publisher {
    fn publish(&self, video: &Path) -> impl std::future::Future<Output = Result<String>> + Send;
}

// ── alquran.cloud content client ─────────────────────────────────────────

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SurahData {
    #[serde(rename = "numberOfAyahs")]
    number_of_ayahs: u32,
    #[serde(default)]
    ayahs: Vec<AyahData>,
}

#[derive(Deserialize)]
struct AyahData {
    #[serde(rename = "numberInSurah")]
    number_in_surah: u32,
    text: String,
    audio: Option<String>,
}

/// Content client for the alquran.cloud API.
pub struct QuranApiSource {
    client: reqwest::Client,
    base_url: String,
}

impl QuranApiSource {
    pub fn new() -> Self {
        Self::with_base_url("https://api.alquran.cloud/v1")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn surah(&self, surah: u32, edition: Option<&str>) -> Result<SurahData> {
        let url = match edition {
            Some(edition) => format!("{}/surah/{surah}/{edition}", self.base_url),
            None => format!("{}/surah/{surah}", self.base_url),
        };
        let envelope: ApiEnvelope<SurahData> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Fetch(format!("content API rejected {url}: {e}")))?
            .json()
            .await?;
        Ok(envelope.data)
    }

    fn select_range(ayahs: Vec<AyahData>, from: u32, to: u32) -> Result<Vec<AyahData>> {
        let selected: Vec<AyahData> = ayahs
            .into_iter()
            .filter(|a| a.number_in_surah >= from && a.number_in_surah <= to)
            .collect();

        let expected = (to - from + 1) as usize;
        if selected.len() != expected {
            return Err(Error::Fetch(format!(
                "verse range {from}-{to} incomplete: got {} of {expected} verses",
                selected.len()
            )));
        }
        Ok(selected)
    }
}

impl Default for QuranApiSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VerseSource for QuranApiSource {
    async fn verse_count(&self, surah: u32) -> Result<u32> {
        let mut last_err = None;
        for attempt in 1..=VERSE_COUNT_ATTEMPTS {
            match self.surah(surah, None).await {
                Ok(data) => return Ok(data.number_of_ayahs),
                Err(e) => {
                    warn!(surah, attempt, error = %e, "verse count fetch failed");
                    last_err = Some(e);
                    if attempt < VERSE_COUNT_ATTEMPTS {
                        tokio::time::sleep(VERSE_COUNT_BACKOFF).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Fetch("verse count unavailable".into())))
    }

    async fn verses(&self, surah: u32, from: u32, to: u32, edition: &str) -> Result<Vec<VerseText>> {
        let data = self.surah(surah, Some(edition)).await?;
        let selected = Self::select_range(data.ayahs, from, to)?;
        Ok(selected
            .into_iter()
            .map(|a| VerseText {
                verse: a.number_in_surah,
                text: a.text,
            })
            .collect())
    }

    async fn recitation(&self, surah: u32, from: u32, to: u32, reciter: &str) -> Result<Recitation> {
        let data = self.surah(surah, Some(reciter)).await?;
        let selected = Self::select_range(data.ayahs, from, to)?;

        let mut audio_urls = Vec::with_capacity(selected.len());
        for ayah in selected {
            let url = ayah.audio.ok_or_else(|| {
                Error::Fetch(format!(
                    "edition {reciter} has no audio for verse {}:{}",
                    surah, ayah.number_in_surah
                ))
            })?;
            audio_urls.push((ayah.number_in_surah, url));
        }

        // alquran.cloud does not publish per-verse durations; they are probed
        // locally after download.
        Ok(Recitation {
            audio_urls,
            durations: None,
        })
    }
}

// ── Sidecar transcript reader ────────────────────────────────────────────

/// Reads a transcript saved by an external STT run as JSON
/// (`{"segments": [...], "duration": ...}`), keyed off the audio path's
/// sidecar or an explicit file.
pub struct JsonTranscriber {
    path: Option<PathBuf>,
}

impl JsonTranscriber {
    /// Read the transcript from an explicit JSON file.
    pub fn from_file(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Read `<audio>.json` next to the audio file.
    pub fn sidecar() -> Self {
        Self { path: None }
    }
}

impl Transcriber for JsonTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => {
                let mut sidecar = audio.as_os_str().to_owned();
                sidecar.push(".json");
                PathBuf::from(sidecar)
            }
        };

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Alignment(format!("transcript not readable at {}: {e}", path.display()))
        })?;
        let transcript: Transcript = serde_json::from_str(&raw)?;

        if !transcript.has_content() {
            return Err(Error::Alignment(format!(
                "transcript at {} carries no usable text",
                path.display()
            )));
        }
        Ok(transcript)
    }
}

// ── Local filesystem publisher ───────────────────────────────────────────

/// Moves finished videos into an output directory. The storage key is the
/// final path.
pub struct LocalPublisher {
    output_dir: PathBuf,
}

impl LocalPublisher {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl Publisher for LocalPublisher {
    async fn publish(&self, video: &Path) -> Result<String> {
        let file_name = video
            .file_name()
            .ok_or_else(|| Error::Publish {
                path: video.to_path_buf(),
                reason: "video path has no file name".into(),
            })?
            .to_owned();

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::Publish {
                path: video.to_path_buf(),
                reason: format!("cannot create output dir: {e}"),
            })?;

        let dest = self.output_dir.join(file_name);
        tokio::fs::copy(video, &dest)
            .await
            .map_err(|e| Error::Publish {
                path: video.to_path_buf(),
                reason: format!("copy to {} failed: {e}", dest.display()),
            })?;

        info!(dest = %dest.display(), "video published");
        Ok(dest.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TranscriptSegment;

    fn ayah(n: u32, text: &str) -> AyahData {
        AyahData {
            number_in_surah: n,
            text: text.to_string(),
            audio: None,
        }
    }

    #[test]
    fn test_select_range_complete() {
        let ayahs = vec![ayah(1, "ا"), ayah(2, "ب"), ayah(3, "ج")];
        let selected = QuranApiSource::select_range(ayahs, 2, 3).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].number_in_surah, 2);
    }

    #[test]
    fn test_select_range_incomplete_is_fetch_error() {
        let ayahs = vec![ayah(1, "ا")];
        let result = QuranApiSource::select_range(ayahs, 1, 3);
        assert!(matches!(result, Err(Error::Fetch(_))));
    }

    #[test]
    fn test_api_envelope_shape() {
        let raw = r#"{"data":{"numberOfAyahs":7,"ayahs":[
            {"numberInSurah":1,"text":"بسم الله","audio":"https://cdn.example/1.mp3"}
        ]}}"#;
        let envelope: ApiEnvelope<SurahData> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.number_of_ayahs, 7);
        assert_eq!(envelope.data.ayahs[0].number_in_surah, 1);
        assert!(envelope.data.ayahs[0].audio.is_some());
    }

    #[tokio::test]
    async fn test_json_transcriber_reads_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("rec.wav");
        let transcript = Transcript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 2.0,
                text: "بسم الله".to_string(),
                words: None,
            }],
            duration: 2.0,
        };
        std::fs::write(
            dir.path().join("rec.wav.json"),
            serde_json::to_string(&transcript).unwrap(),
        )
        .unwrap();

        let read = JsonTranscriber::sidecar().transcribe(&audio).await.unwrap();
        assert_eq!(read.segments.len(), 1);
    }

    #[tokio::test]
    async fn test_json_transcriber_rejects_empty_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, r#"{"segments":[],"duration":0.0}"#).unwrap();

        let result = JsonTranscriber::from_file(path)
            .transcribe(Path::new("unused.wav"))
            .await;
        assert!(matches!(result, Err(Error::Alignment(_))));
    }

    #[tokio::test]
    async fn test_local_publisher_copies_video() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("out.mp4");
        std::fs::write(&video, b"mp4").unwrap();
        let out_dir = dir.path().join("published");

        let key = LocalPublisher::new(out_dir.clone())
            .publish(&video)
            .await
            .unwrap();
        assert!(PathBuf::from(&key).exists());
        assert!(out_dir.join("out.mp4").exists());
        // Source is preserved; the orchestrator decides when to delete it.
        assert!(video.exists());
    }
}
