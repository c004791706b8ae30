use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use versecast::{
    CropMode, EncoderSelector, JsonTranscriber, LocalPublisher, QuranApiSource, RenderOptions,
    SubtitleStyle, VerseSource,
};

#[derive(Parser)]
#[command(name = "versecast", about = "Render verse-timed recitation videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a subtitled recitation video.
    Render(RenderArgs),
    /// Align recitation audio against verse text and print per-verse timings.
    Align(AlignArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Surah number (1-114).
    #[arg(short, long)]
    surah: u32,

    /// First verse of the range.
    #[arg(long, default_value = "1")]
    from: u32,

    /// Last verse of the range (inclusive).
    #[arg(long)]
    to: u32,

    /// Background video clip to loop behind the subtitles.
    #[arg(short, long)]
    background: PathBuf,

    /// Text edition identifier.
    #[arg(long, default_value = "quran-uthmani")]
    text_edition: String,

    /// Reciter edition for fetched audio.
    #[arg(long, default_value = "ar.alafasy")]
    reciter: String,

    /// Use this audio file instead of fetching recitation clips.
    #[arg(short, long)]
    audio: Option<PathBuf>,

    /// Transcript JSON for verse alignment. Without it subtitle timing falls
    /// back to per-verse audio durations.
    #[arg(short = 'T', long)]
    transcript: Option<PathBuf>,

    /// Output directory for the finished video.
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// How to fit the background to the frame.
    #[arg(long, default_value = "fill")]
    crop: CropArg,

    /// Overlay a surah/verse-range caption.
    #[arg(long)]
    overlay: bool,

    /// Output frame size as WIDTHxHEIGHT.
    #[arg(long, default_value = "1080x1920")]
    size: String,

    /// Subtitle font size.
    #[arg(long, default_value = "48")]
    font_size: u32,

    /// Keep intermediate files after publishing.
    #[arg(long)]
    keep_intermediates: bool,

    /// Working directory for intermediates.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
struct AlignArgs {
    /// Recitation audio file.
    audio: PathBuf,

    /// Surah number (1-114).
    #[arg(short, long)]
    surah: u32,

    /// First verse of the range.
    #[arg(long, default_value = "1")]
    from: u32,

    /// Last verse of the range (inclusive).
    #[arg(long)]
    to: u32,

    /// Text edition identifier.
    #[arg(long, default_value = "quran-uthmani")]
    text_edition: String,

    /// Transcript JSON. Defaults to `<audio>.json` next to the audio file.
    #[arg(short = 'T', long)]
    transcript: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CropArg {
    Fit,
    Fill,
}

impl From<CropArg> for CropMode {
    fn from(arg: CropArg) -> Self {
        match arg {
            CropArg::Fit => CropMode::Fit,
            CropArg::Fill => CropMode::Fill,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("versecast=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Render(args) => run_render(args).await,
        Command::Align(args) => run_align(args).await,
    }
}

async fn run_render(args: RenderArgs) {
    let (width, height) = match parse_size(&args.size) {
        Some(dims) => dims,
        None => {
            eprintln!("Invalid --size {:?}, expected WIDTHxHEIGHT", args.size);
            std::process::exit(1);
        }
    };

    let style = SubtitleStyle {
        font_size: args.font_size,
        ..SubtitleStyle::default()
    };

    let mut options = RenderOptions::new(args.surah, args.from, args.to)
        .text_edition(&args.text_edition)
        .reciter(&args.reciter)
        .background(args.background)
        .style(style)
        .crop_mode(args.crop.into())
        .overlay_metadata(args.overlay)
        .output_size(width, height)
        .keep_intermediates(args.keep_intermediates);
    if let Some(audio) = args.audio {
        options = options.audio_path(audio);
    }
    if let Some(dir) = args.work_dir {
        options = options.work_dir(dir);
    }

    let source = QuranApiSource::new();
    let publisher = LocalPublisher::new(args.output);
    let selector = EncoderSelector::new();
    let transcriber = args.transcript.map(JsonTranscriber::from_file);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<versecast::ProgressEvent>();
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:<12} [{wide_bar:.cyan/blue}] {pos}%")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            bar.set_message(event.stage.name().to_string());
            bar.set_position(event.percent as u64);
        }
        bar.finish_and_clear();
    });

    let result = versecast::render_video(
        &options,
        &source,
        transcriber.as_ref(),
        &publisher,
        &selector,
        Some(tx),
    )
    .await;
    reporter.await.ok();

    match result {
        Ok(key) => println!("{key}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_align(args: AlignArgs) {
    let source = QuranApiSource::new();
    let verses = match source
        .verses(args.surah, args.from, args.to, &args.text_edition)
        .await
    {
        Ok(verses) => verses,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let transcriber = match args.transcript {
        Some(path) => JsonTranscriber::from_file(path),
        None => JsonTranscriber::sidecar(),
    };

    let timings = match versecast::align_audio(&args.audio, &verses, &transcriber).await {
        Ok(timings) => timings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("{:<7} {:>9} {:>9}", "VERSE", "START", "END");
    for timing in &timings {
        println!(
            "{:<7} {:>9.2} {:>9.2}",
            format!("{}:{}", args.surah, timing.verse),
            timing.start,
            timing.end
        );
    }
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once(['x', 'X'])?;
    Some((w.parse().ok()?, h.parse().ok()?))
}
