//! `artist-audio`: command line front end for the audio tooling library

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use artist_audio_tools::artwork::{ImageOutputFormat, ImageResizeOptions};
use artist_audio_tools::config::AppConfig;
use artist_audio_tools::engine::tools::locate_ffmpeg;
use artist_audio_tools::logger::init_logger;
use artist_audio_tools::notification::{CompositeProgressObserver, ConsoleProgressObserver, ProgressBarObserver};
use artist_audio_tools::transcode::{AudioProcessingSettings, OutputFormat, SourceFile, TrackMetadata};
use artist_audio_tools::AudioTools;

#[derive(Parser, Debug)]
#[command(name = "artist-audio")]
#[command(about = "Analyse, preview, convert and prepare cover art for audio uploads")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, env = "ARTIST_AUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the ffmpeg binary (skips discovery)
    #[arg(long, global = true, env = "ARTIST_AUDIO_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Peak, loudness, clipping and silence report
    Analyze { input: PathBuf },

    /// Normalized amplitude envelope
    Waveform {
        input: PathBuf,
        #[arg(long)]
        buckets: Option<usize>,
    },

    /// Frequency bars at a point in time
    Spectrum {
        input: PathBuf,
        /// Position in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        #[arg(long)]
        bars: Option<usize>,
    },

    /// Convert to a distribution format
    Convert(ConvertArgs),

    /// Resize cover art
    Resize(ResizeArgs),

    /// Locate ffmpeg and print its version
    EngineInfo,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    input: PathBuf,

    /// mp3, ogg, wav or m4a
    #[arg(short, long, default_value = "mp3")]
    format: OutputFormat,

    /// Output file or directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    #[arg(long)]
    bitrate: Option<String>,

    #[arg(long)]
    sample_rate: Option<String>,

    /// Loudness normalization
    #[arg(long)]
    normalize: bool,

    #[arg(long)]
    trim_start: Option<String>,

    #[arg(long)]
    trim_end: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    artist: Option<String>,

    #[arg(long)]
    album: Option<String>,

    /// Cover image to embed
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Draw a progress bar instead of log lines
    #[arg(long)]
    progress_bar: bool,
}

#[derive(Args, Debug)]
struct ResizeArgs {
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// 0 keeps the source width
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// 0 keeps the source height
    #[arg(long, default_value_t = 0)]
    height: u32,

    #[arg(long, default_value_t = 90)]
    quality: u8,

    /// jpeg, png or webp
    #[arg(long, default_value = "jpeg")]
    format: ImageOutputFormat,

    #[arg(long)]
    crop: bool,
}

#[derive(Serialize)]
struct WrittenFile<'a> {
    path: &'a Path,
    mime_type: &'a str,
    bytes: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(ffmpeg) = cli.ffmpeg {
        config.engine.ffmpeg_path = Some(ffmpeg);
    }

    let tools = AudioTools::new(config);

    match cli.command {
        Command::Analyze { input } => {
            let report = tools
                .analyze(&input)
                .await
                .with_context(|| format!("Failed to analyse {}", input.display()))?;
            print_json(&report)?;
        }
        Command::Waveform { input, buckets } => {
            let envelope = tools
                .waveform(&input, buckets)
                .await
                .with_context(|| format!("Failed to decode {}", input.display()))?;
            print_json(&envelope)?;
        }
        Command::Spectrum { input, time, bars } => {
            let bars = tools
                .spectrum(&input, time, bars)
                .await
                .with_context(|| format!("Failed to decode {}", input.display()))?;
            print_json(&bars)?;
        }
        Command::Convert(args) => convert(&tools, args).await?,
        Command::Resize(args) => resize(&tools, args).await?,
        Command::EngineInfo => {
            let tool = locate_ffmpeg(&tools.config().engine)
                .await
                .context("Failed to locate ffmpeg")?;
            print_json(&tool)?;
        }
    }

    Ok(())
}

async fn convert(tools: &AudioTools, args: ConvertArgs) -> Result<()> {
    let source = SourceFile::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let cover_art: Option<bytes::Bytes> = match &args.cover {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read cover {}", path.display()))?
                .into(),
        ),
        None => None,
    };
    let metadata = if args.title.is_some() || args.artist.is_some() || args.album.is_some() {
        Some(TrackMetadata {
            title: args.title,
            artist: args.artist,
            album: args.album,
        })
    } else {
        None
    };

    let settings = AudioProcessingSettings {
        format: args.format,
        bitrate: args.bitrate,
        sample_rate: args.sample_rate,
        normalize: args.normalize,
        trim_start: args.trim_start,
        trim_end: args.trim_end,
        metadata,
        cover_art,
    };

    let mut observer = CompositeProgressObserver::new();
    if args.progress_bar {
        observer.add_observer(Box::new(ProgressBarObserver::default()));
    } else {
        observer.add_observer(Box::new(ConsoleProgressObserver::with_prefix("[convert] ")));
    }

    let blob = tools
        .convert(&source, &settings, Some(&observer))
        .await
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    let path = blob
        .save_to(&args.output, source.stem())
        .await
        .context("Failed to write the converted file")?;
    info!("Saved {}", path.display());

    print_json(&WrittenFile {
        path: &path,
        mime_type: blob.mime_type,
        bytes: blob.len(),
    })
}

async fn resize(tools: &AudioTools, args: ResizeArgs) -> Result<()> {
    let data = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let options = ImageResizeOptions {
        width: args.width,
        height: args.height,
        quality: args.quality,
        format: args.format,
        crop_to_square: args.crop,
    };
    let blob = tools
        .resize_cover(&data, &options)
        .await
        .with_context(|| format!("Failed to resize {}", args.input.display()))?;

    tokio::fs::write(&args.output, &blob.bytes)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    print_json(&WrittenFile {
        path: &args.output,
        mime_type: blob.mime_type,
        bytes: blob.bytes.len(),
    })
}
