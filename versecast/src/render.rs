//! Render orchestration: fetch, align, trim, subtitle, encode, publish.
//!
//! Stages run strictly sequentially and each pushes a monotonically
//! increasing progress percentage onto the caller's channel. Only the encode
//! stage retries internally: once, on the software encoder, after a
//! hardware failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::audio;
use crate::config::{CropMode, RenderOptions};
use crate::encoder::{EncoderSelector, VideoEncoder};
use crate::error::{Error, Result};
use crate::source::{Publisher, Transcriber, VerseSource};
use crate::subtitle::{self, SubtitleTiming};
use crate::timing;
use crate::types::{TrimWindow, VerseText, VerseTiming};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Align,
    AwaitAudio,
    TrimWindow,
    Background,
    Subtitles,
    Encode,
    Publish,
    Cleanup,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Align => "align",
            Stage::AwaitAudio => "await-audio",
            Stage::TrimWindow => "trim-window",
            Stage::Background => "background",
            Stage::Subtitles => "subtitles",
            Stage::Encode => "encode",
            Stage::Publish => "publish",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Overall percentage reported when the stage completes. Encode owns the
    /// 60-90 slice and reports continuously within it.
    fn percent(&self) -> u8 {
        match self {
            Stage::Fetch => 10,
            Stage::Align => 25,
            Stage::AwaitAudio => 30,
            Stage::TrimWindow => 35,
            Stage::Background => 45,
            Stage::Subtitles => 55,
            Stage::Encode => 90,
            Stage::Publish => 95,
            Stage::Cleanup => 100,
        }
    }
}

const ENCODE_SLICE_START: f64 = 60.0;
const ENCODE_SLICE_END: f64 = 90.0;

/// One progress update pushed to the subscriber.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: u8,
}

pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;

/// Monotone progress reporter. A dropped receiver never fails the job.
struct Progress {
    tx: Option<ProgressSender>,
    last: AtomicU8,
}

impl Progress {
    fn new(tx: Option<ProgressSender>) -> Self {
        Self {
            tx,
            last: AtomicU8::new(0),
        }
    }

    fn emit(&self, stage: Stage, percent: u8) {
        let percent = percent.max(self.last.load(Ordering::Relaxed));
        self.last.store(percent, Ordering::Relaxed);
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent { stage, percent });
        }
    }

    fn stage_done(&self, stage: Stage) {
        self.emit(stage, stage.percent());
    }
}

/// Run the full render pipeline and return the published storage key.
pub async fn run<S, T, P>(
    options: &RenderOptions,
    source: &S,
    transcriber: Option<&T>,
    publisher: &P,
    selector: &EncoderSelector,
    progress_tx: Option<ProgressSender>,
) -> Result<String>
where
    S: VerseSource,
    T: Transcriber,
    P: Publisher,
{
    let progress = Progress::new(progress_tx);
    let work_dir = options.resolve_work_dir();
    tokio::fs::create_dir_all(&work_dir).await?;

    // ── Fetch ────────────────────────────────────────────────────────────
    let count = source.verse_count(options.surah).await?;
    if options.from_verse < 1 || options.to_verse > count || options.from_verse > options.to_verse {
        return Err(Error::Fetch(format!(
            "verse range {}-{} invalid for surah {} ({count} verses)",
            options.from_verse, options.to_verse, options.surah
        )));
    }

    let verses = source
        .verses(options.surah, options.from_verse, options.to_verse, &options.text_edition)
        .await?;

    let fetched = fetch_audio(options, source, &work_dir).await?;
    write_text_dump(&verses, &work_dir).await?;
    progress.stage_done(Stage::Fetch);

    // ── Await audio ──────────────────────────────────────────────────────
    // The working audio may still be landing on disk (user upload, slow
    // CDN); transcription and probing both need it readable first.
    audio::await_file_ready(
        &fetched.audio_path,
        options.audio_poll_interval,
        options.audio_poll_attempts,
    )
    .await?;
    progress.stage_done(Stage::AwaitAudio);

    let total_duration = audio::probe_duration(&fetched.audio_path).await?;

    // ── Optional alignment ───────────────────────────────────────────────
    let timings: Option<Vec<VerseTiming>> = match transcriber {
        Some(transcriber) => {
            let resolved =
                align_against(&fetched.audio_path, &verses, transcriber, Some(total_duration))
                    .await?;
            progress.stage_done(Stage::Align);
            Some(resolved)
        }
        None => {
            debug!("no transcriber supplied, using duration fallback");
            None
        }
    };

    // ── Trim window ──────────────────────────────────────────────────────
    let window = timings
        .as_deref()
        .and_then(TrimWindow::from_timings)
        .unwrap_or_else(|| TrimWindow::fallback(total_duration));
    progress.stage_done(Stage::TrimWindow);

    // ── Background clip ──────────────────────────────────────────────────
    if !options.background.exists() {
        return Err(Error::Fetch(format!(
            "background clip not found: {}",
            options.background.display()
        )));
    }
    let background_duration = audio::probe_duration(&options.background).await?;
    if background_duration <= 0.0 {
        return Err(Error::Encode("background clip has no duration".into()));
    }
    progress.stage_done(Stage::Background);

    // ── Subtitle track ───────────────────────────────────────────────────
    let verse_texts: Vec<String> = verses.iter().map(|v| v.text.clone()).collect();
    let fallback_durations;
    let track = match &timings {
        Some(timings) => {
            let rebased = window.rebase(timings);
            subtitle::build_track(
                &verse_texts,
                &options.style,
                SubtitleTiming::Timed(&rebased),
                (options.output_width, options.output_height),
            )?
        }
        None => {
            fallback_durations = fetched
                .durations
                .clone()
                .unwrap_or_else(|| vec![0.0; verse_texts.len()]);
            subtitle::build_track(
                &verse_texts,
                &options.style,
                SubtitleTiming::Durations(&fallback_durations),
                (options.output_width, options.output_height),
            )?
        }
    };
    let subtitle_path = work_dir.join("captions.ass");
    tokio::fs::write(&subtitle_path, track).await?;
    progress.stage_done(Stage::Subtitles);

    // ── Encode ───────────────────────────────────────────────────────────
    let video_path = work_dir.join("render.mp4");
    encode_with_fallback(selector, |encoder| {
        run_encode_once(
            encoder,
            options,
            &fetched.audio_path,
            &subtitle_path,
            &video_path,
            window,
            &progress,
        )
    })
    .await?;
    progress.stage_done(Stage::Encode);

    // ── Publish ──────────────────────────────────────────────────────────
    // On failure the local video file is preserved for manual recovery.
    let key = publisher.publish(&video_path).await?;
    progress.stage_done(Stage::Publish);

    // ── Cleanup ──────────────────────────────────────────────────────────
    if !options.keep_intermediates {
        audio::remove_quietly(&subtitle_path);
        audio::remove_quietly(&work_dir.join("verses.txt"));
        audio::remove_quietly(&work_dir.join("durations.json"));
        if fetched.owned_audio {
            audio::remove_quietly(&fetched.audio_path);
        }
        audio::remove_quietly(&video_path);
    }
    progress.stage_done(Stage::Cleanup);

    info!(key = %key, "render complete");
    Ok(key)
}

/// Standalone alignment: transcript -> token alignment -> resolved timings.
pub async fn align_against<T: Transcriber>(
    audio_path: &Path,
    verses: &[VerseText],
    transcriber: &T,
    total_duration: Option<f64>,
) -> Result<Vec<VerseTiming>> {
    let transcript = transcriber.transcribe(audio_path).await?;
    if !transcript.has_content() {
        return Err(Error::Alignment(
            "transcription returned no usable word or segment data".into(),
        ));
    }

    let canonical = crate::align::canonical_tokens(verses);
    let recognized = crate::align::recognized_tokens(&transcript);
    let matches = crate::align::align(&canonical, &recognized)?;

    let duration = match total_duration {
        Some(d) => Some(d),
        None => Some(transcript.duration).filter(|d| *d > 0.0),
    };
    Ok(timing::aggregate(&matches, verses, duration))
}

struct FetchedAudio {
    audio_path: PathBuf,
    durations: Option<Vec<f64>>,
    /// Whether the pipeline created this file (and may delete it).
    owned_audio: bool,
}

async fn fetch_audio<S: VerseSource>(
    options: &RenderOptions,
    source: &S,
    work_dir: &Path,
) -> Result<FetchedAudio> {
    if let Some(user_audio) = &options.audio_path {
        return Ok(FetchedAudio {
            audio_path: user_audio.clone(),
            durations: None,
            owned_audio: false,
        });
    }

    let reciter = options.reciter_edition.as_deref().ok_or_else(|| {
        Error::Fetch("no audio source: neither an audio path nor a reciter edition given".into())
    })?;

    let recitation = source
        .recitation(options.surah, options.from_verse, options.to_verse, reciter)
        .await?;

    let clips_dir = work_dir.join("clips");
    tokio::fs::create_dir_all(&clips_dir).await?;

    let mut clips = Vec::with_capacity(recitation.audio_urls.len());
    for (verse, url) in &recitation.audio_urls {
        let clip_path = clips_dir.join(format!("verse-{verse:03}.mp3"));
        audio::download_file(url, &clip_path, false).await?;
        clips.push(clip_path);
    }

    // Per-verse durations feed the subtitle fallback; probe locally when the
    // upstream doesn't supply them.
    let durations = match recitation.durations {
        Some(durations) => durations,
        None => {
            let mut probed = Vec::with_capacity(clips.len());
            for clip in &clips {
                probed.push(audio::probe_duration(clip).await?);
            }
            probed
        }
    };

    let audio_path = work_dir.join("audio.m4a");
    audio::concat_clips(&clips, &audio_path).await?;
    audio::write_durations(&durations, &work_dir.join("durations.json")).await?;

    for clip in &clips {
        audio::remove_quietly(clip);
    }

    Ok(FetchedAudio {
        audio_path,
        durations: Some(durations),
        owned_audio: true,
    })
}

async fn write_text_dump(verses: &[VerseText], work_dir: &Path) -> Result<()> {
    let mut dump = String::new();
    for verse in verses {
        dump.push_str(&format!("{}\t{}\n", verse.verse, verse.text));
    }
    tokio::fs::write(work_dir.join("verses.txt"), dump).await?;
    Ok(())
}

/// Encode with the selected encoder; after a hardware failure, downgrade the
/// selector and retry exactly once with identical inputs on software.
async fn encode_with_fallback<F, Fut>(selector: &EncoderSelector, mut attempt: F) -> Result<()>
where
    F: FnMut(VideoEncoder) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let encoder = selector.select();
    match attempt(encoder).await {
        Ok(()) => Ok(()),
        Err(e) if encoder.is_hardware() => {
            warn!(
                encoder = encoder.ffmpeg_name(),
                error = %e,
                "hardware encode failed, retrying on software"
            );
            selector.downgrade();
            attempt(VideoEncoder::Software).await
        }
        Err(e) => Err(e),
    }
}

async fn run_encode_once(
    encoder: VideoEncoder,
    options: &RenderOptions,
    audio_path: &Path,
    subtitle_path: &Path,
    output: &Path,
    window: TrimWindow,
    progress: &Progress,
) -> Result<()> {
    let filter = build_video_filter(options, subtitle_path);
    let duration = format!("{:.3}", window.duration);

    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.args(["-nostdin", "-y", "-stream_loop", "-1", "-i"])
        .arg(&options.background);
    if let Some(seek) = window.seek_offset() {
        cmd.args(["-ss", &format!("{seek:.3}")]);
    }
    cmd.arg("-i")
        .arg(audio_path)
        .args(["-t", &duration])
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .args(["-vf", &filter])
        .args(["-c:v", encoder.ffmpeg_name()])
        .args(encoder.quality_args())
        .args(["-pix_fmt", "yuv420p"])
        .args(["-c:a", "aac", "-b:a", "192k"])
        .args(["-movflags", "+faststart"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    info!(encoder = encoder.ffmpeg_name(), output = %output.display(), "starting encode");

    let mut child = cmd
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Encode("ffmpeg not found — install with: apt install ffmpeg".into())
            } else {
                Error::Encode(format!("failed to start ffmpeg: {e}"))
            }
        })?;

    // Map ffmpeg's time= reports linearly into the 60-90% slice.
    let mut stderr_tail = String::new();
    if let Some(stderr) = child.stderr.take() {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(t) = extract_encode_time(&line) {
                let fraction = (t / window.duration).clamp(0.0, 1.0);
                let percent =
                    ENCODE_SLICE_START + fraction * (ENCODE_SLICE_END - ENCODE_SLICE_START);
                progress.emit(Stage::Encode, percent as u8);
            }
            stderr_tail.push_str(&line);
            stderr_tail.push('\n');
            if stderr_tail.len() > 8192 {
                let cut = stderr_tail.len() - 4096;
                stderr_tail.drain(..cut);
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Encode(format!("ffmpeg did not exit cleanly: {e}")))?;

    if !status.success() {
        return Err(Error::Encode(format!(
            "{} exited with {:?}: {}",
            encoder.ffmpeg_name(),
            status.code(),
            stderr_tail.trim()
        )));
    }
    Ok(())
}

fn build_video_filter(options: &RenderOptions, subtitle_path: &Path) -> String {
    let w = options.output_width;
    let h = options.output_height;

    let fit = match options.crop_mode {
        CropMode::Fill => format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}"),
        CropMode::Fit => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
    };

    let mut filter = format!("{fit},setsar=1,ass='{}'", escape_filter_path(subtitle_path));

    if options.overlay_metadata {
        filter.push_str(&format!(
            ",drawtext=text='Surah {} {}-{}':fontsize=32:fontcolor=white@0.8:x=w-tw-24:y=24",
            options.surah, options.from_verse, options.to_verse
        ));
    }

    filter
}

/// Escape a path for use inside an ffmpeg filter argument.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Pull the seconds out of an ffmpeg stderr line like `time=00:01:23.45`.
fn extract_encode_time(line: &str) -> Option<f64> {
    let idx = line.find("time=")?;
    let rest = &line[idx + 5..];
    let stamp = rest.split_whitespace().next()?;
    let mut parts = stamp.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}
