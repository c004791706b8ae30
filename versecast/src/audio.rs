//! Audio-side helpers: probing, readiness waiting, recitation download, and
//! per-verse clip concatenation. Everything media-shaped goes through the
//! ffmpeg/ffprobe binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Duration of a media file in seconds, via ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    if !path.exists() {
        return Err(Error::AudioMissing {
            path: path.to_path_buf(),
        });
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Encode("ffprobe not found — install with: apt install ffmpeg".into())
            } else {
                Error::Encode(format!("failed to run ffprobe: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Encode(format!("ffprobe failed: {stderr}")));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Encode(format!("unparseable ffprobe duration: {e}")))
}

/// Wait until `path` exists with non-zero size.
///
/// The readiness check runs on a fixed interval inside a deadline. Exceeding
/// the deadline is an [`Error::AvailabilityTimeout`], distinct from the
/// missing-file error a caller gets when it skips the wait entirely.
pub async fn await_file_ready(path: &Path, interval: Duration, attempts: u32) -> Result<()> {
    let deadline = interval * attempts.max(1);

    let ready = async {
        loop {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.len() > 0 {
                    return;
                }
            }
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(deadline, ready).await {
        Ok(()) => {
            debug!(path = %path.display(), "audio is readable");
            Ok(())
        }
        Err(_) => Err(Error::AvailabilityTimeout {
            path: path.to_path_buf(),
        }),
    }
}

/// Download a file to `dest`, streaming through a `.part` temp file that is
/// renamed on completion.
pub async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::Fetch(format!("HTTP error fetching {url}: {e}")))?;

    let total_size = response.content_length().unwrap_or(0);
    let pb = if show_progress {
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        pb.set_message(format!(
            "Downloading {}",
            dest.file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        Some(pb)
    } else {
        None
    };

    let tmp_path = dest.with_extension("part");
    let mut file = std::fs::File::create(&tmp_path)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    use std::io::Write;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        if let Some(pb) = &pb {
            pb.set_position(downloaded);
        }
    }
    file.flush()?;
    drop(file);

    if std::fs::metadata(&tmp_path)?.len() == 0 {
        std::fs::remove_file(&tmp_path).ok();
        return Err(Error::Fetch(format!("empty download from {url}")));
    }

    std::fs::rename(&tmp_path, dest)?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    debug!(path = %dest.display(), bytes = downloaded, "downloaded");
    Ok(())
}

/// Concatenate per-verse clips into one audio file using ffmpeg's concat
/// demuxer, re-encoding to a uniform stream so mixed source codecs are safe.
pub async fn concat_clips(clips: &[PathBuf], dest: &Path) -> Result<()> {
    if clips.is_empty() {
        return Err(Error::Fetch("no audio clips to concatenate".into()));
    }

    let list_path = dest.with_extension("txt");
    let mut list = String::new();
    for clip in clips {
        // concat demuxer quoting: single quotes, embedded quotes escaped.
        let escaped = clip.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    tokio::fs::write(&list_path, list).await?;

    let output = tokio::process::Command::new("ffmpeg")
        .args(["-nostdin", "-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(&list_path)
        .args(["-ar", "44100", "-ac", "2", "-c:a", "aac", "-b:a", "192k"])
        .arg(dest)
        .output()
        .await
        .map_err(|e| Error::Encode(format!("failed to run ffmpeg: {e}")))?;

    tokio::fs::remove_file(&list_path).await.ok();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Encode(format!("audio concat failed: {stderr}")));
    }

    info!(clips = clips.len(), path = %dest.display(), "recitation audio assembled");
    Ok(())
}

/// Persist the per-verse duration array next to the working audio, for the
/// subtitle fallback path and for debugging a bad alignment.
pub async fn write_durations(durations: &[f64], dest: &Path) -> Result<()> {
    let json = serde_json::to_string(durations)?;
    tokio::fs::write(dest, json).await?;
    Ok(())
}

/// Best-effort removal of an intermediate file. Errors are logged, never
/// raised.
pub fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if path.exists() {
            warn!(path = %path.display(), error = %e, "failed to clean up intermediate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_await_file_ready_succeeds_for_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ready.wav");
        std::fs::write(&path, b"riff").unwrap();

        await_file_ready(&path, Duration::from_millis(10), 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_file_ready_times_out_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.wav");

        let result = await_file_ready(&path, Duration::from_millis(10), 3).await;
        assert!(matches!(result, Err(Error::AvailabilityTimeout { .. })));
    }

    #[tokio::test]
    async fn test_await_file_ready_times_out_for_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();

        let result = await_file_ready(&path, Duration::from_millis(10), 3).await;
        assert!(matches!(result, Err(Error::AvailabilityTimeout { .. })));
    }

    #[tokio::test]
    async fn test_await_file_ready_picks_up_late_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.wav");

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                std::fs::write(&path, b"riff").unwrap();
            })
        };

        await_file_ready(&path, Duration::from_millis(10), 20)
            .await
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_durations_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durations.json");
        write_durations(&[1.5, 2.25, 3.0], &path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<f64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![1.5, 2.25, 3.0]);
    }

    #[test]
    fn test_remove_quietly_ignores_missing() {
        remove_quietly(Path::new("/nonexistent/versecast-test-file"));
    }
}
