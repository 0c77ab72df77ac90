use anyhow::{anyhow, Result};
use clap::Parser;
use dialoguer::{FuzzySelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use vidscan::{probe, ConfigStore, FfmpegFrameSource, Progress, ProgressPhase, ScanCreator, VideoInfo};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(version, about = "Generate a contact sheet (scan) for a video.")]
struct Args {
    /// Input video file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Layout preset name (a file in <config dir>/layout)
    #[arg(short, long, default_value = "default")]
    layout: String,

    /// Video stream index to sample
    #[arg(short, long)]
    stream: Option<usize>,

    /// Configuration directory
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Output directory for the generated scan
    #[arg(long, default_value = "scans")]
    out_dir: PathBuf,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,

    /// ffprobe executable
    #[arg(long, default_value = "ffprobe")]
    ffprobe: String,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(mut args: Args) -> Result<()> {
    // Configuration is validated before anything touches the video
    let store = ConfigStore::locate(args.config_dir.as_deref());
    debug!("using config directory {}", store.root().display());
    let config = store.load(&args.layout)?;
    let creator = ScanCreator::new(config)?;

    // --- Interactive Prompts ---
    if args.file.is_none() {
        let files = find_media_files();
        if files.is_empty() {
            return Err(anyhow!("No media files found in current directory."));
        }
        let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
            .with_prompt("Choose an input file")
            .default(0)
            .items(&files)
            .interact()?;
        args.file = Some(PathBuf::from(&files[selection]));
    }
    let input_path = args.file.ok_or_else(|| anyhow!("Input file must be provided"))?;

    let info = probe(&input_path, &args.ffprobe)?;
    let stream = match args.stream {
        Some(index) => index,
        None => choose_stream(&info)?,
    };

    // --- Execution ---
    let source = FfmpegFrameSource::new(&input_path).with_command(&args.ffmpeg);

    // Created on the first extraction update, once the total is known
    let progress_bar: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    let pb_clone = Arc::clone(&progress_bar);

    let path = creator.create_scan_with_progress(
        &source,
        &info,
        stream,
        &args.out_dir,
        SystemTime::now(),
        move |progress: Progress| {
            let Ok(mut pb_guard) = pb_clone.lock() else {
                return;
            };
            match progress.phase {
                ProgressPhase::ExtractingFrames => {
                    if pb_guard.is_none() {
                        let pb = ProgressBar::new(progress.total as u64);
                        if let Ok(style) = ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                        {
                            pb.set_style(style.progress_chars("#>-"));
                        }
                        pb.set_message("Extracting frames");
                        *pb_guard = Some(pb);
                    }
                    if let Some(ref pb) = *pb_guard {
                        pb.set_position(progress.completed as u64);
                    }
                }
                ProgressPhase::Composing => {
                    if let Some(pb) = pb_guard.take() {
                        pb.finish_with_message("Done");
                    }
                    println!("{}", progress.message);
                }
                ProgressPhase::Saving | ProgressPhase::Complete => println!("{}", progress.message),
            }
        },
    )?;

    println!("\nScan written to {}", path.display());
    Ok(())
}

fn choose_stream(info: &VideoInfo) -> Result<usize> {
    if info.video_streams.len() <= 1 {
        return Ok(0);
    }
    let items: Vec<String> = info
        .video_streams
        .iter()
        .enumerate()
        .map(|(i, s)| format!("#{} {} {}", i, s.codec_label(), s.frame_size_label()))
        .collect();
    let selection = Select::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt("Choose a video stream")
        .default(0)
        .items(&items)
        .interact()?;
    Ok(selection)
}

fn find_media_files() -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path().extension().is_some_and(|ext| {
                    matches!(
                        ext.to_str().map(|s| s.to_ascii_lowercase()).as_deref(),
                        Some("mp4" | "mkv" | "mov" | "avi" | "webm" | "m4v" | "ts" | "flv" | "wmv")
                    )
                })
        })
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}
