use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bili_upload_core::clock::SystemClock;
use bili_upload_core::config::{config_path, load_config, save_config, AppConfig};
use bili_upload_core::meta::{split_tags, Copyright};
use bili_upload_core::progress::{LogProgress, ProgressHandler, ProgressReporter, Report};
use bili_upload_core::session::{MetaOverrides, SessionOutcome, UploadSession, VideoLocation};
use bili_upload_core::uploader::dry_run::DryRunUploader;
use bili_upload_core::uploader::replay::ReplayUploader;
use bili_upload_core::zones::ZONES;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "bili-upload")]
#[command(about = "Upload a video with metadata, cover image, and progress reporting")]
#[command(version)]
#[command(subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    upload: UploadArgs,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct UploadArgs {
    /// Video folder name under the videos root
    #[arg(required = true)]
    video_folder: Option<String>,

    /// Video file name inside the folder
    #[arg(required = true)]
    video_file: Option<String>,

    /// Video title (default: from the title template)
    #[arg(long)]
    title: Option<String>,

    /// Video description (default: from the description template)
    #[arg(long)]
    desc: Option<String>,

    /// Tags, comma-separated (the file stem is always added)
    #[arg(long)]
    tags: Option<String>,

    /// Category (zone) id, see `bili-upload zones`
    #[arg(long)]
    tid: Option<u32>,

    /// Mark the video as a reprint of SOURCE
    #[arg(long, value_name = "SOURCE")]
    reprint: Option<String>,

    /// Allow others to reprint the video
    #[arg(long)]
    allow_reprint: bool,

    /// Disable the charging panel
    #[arg(long)]
    no_elec: bool,

    /// Text posted to followers' feeds
    #[arg(long)]
    dynamic: Option<String>,

    /// Cover image (default: <stem>_cover.<ext> next to the video)
    #[arg(long)]
    cover: Option<String>,

    /// Cookie file with SESSDATA, bili_jct, buvid3 and DedeUserID
    #[arg(long)]
    cookie_file: Option<String>,

    /// Directory holding one folder per video
    #[arg(long)]
    videos_root: Option<String>,

    /// Directory for upload logs and result records
    #[arg(long)]
    logs_dir: Option<String>,

    /// Replay a recorded JSON-lines event log instead of the dry-run uploader
    #[arg(long)]
    replay: Option<String>,

    /// Show a progress bar on the console
    #[arg(long)]
    progress_bar: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List common category (zone) ids
    Zones,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Config { action }) => {
            init_logging(None);
            run_config(action, cli.json)
        }
        Some(Commands::Zones) => run_zones(cli.json),
        None => run_upload(&cli.upload, cli.json).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Console logging, plus a plain-text copy in `log_file` when given.
fn init_logging(log_file: Option<(&Path, &str)>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    guard
}

async fn run_upload(args: &UploadArgs, json: bool) -> CliResult {
    let (Some(folder), Some(file)) = (args.video_folder.as_deref(), args.video_file.as_deref()) else {
        return Err("video folder and video file are required".into());
    };

    let mut cfg = load_config();
    if let Some(p) = &args.cookie_file {
        cfg.paths.cookie_file = PathBuf::from(p);
    }
    if let Some(p) = &args.videos_root {
        cfg.paths.videos_root = PathBuf::from(p);
    }
    if let Some(p) = &args.logs_dir {
        cfg.paths.logs_dir = PathBuf::from(p);
    }

    std::fs::create_dir_all(&cfg.paths.logs_dir)?;
    let log_name = format!("{}_upload.log", file);
    let _guard = init_logging(Some((cfg.paths.logs_dir.as_path(), log_name.as_str())));

    tracing::info!("=== bili-upload started ===");
    tracing::info!("video folder: {}", folder);
    tracing::info!("video file: {}", file);

    let overrides = MetaOverrides {
        title: args.title.clone(),
        desc: args.desc.clone(),
        tags: args.tags.as_deref().map(split_tags),
        tid: args.tid,
        reprint_source: args.reprint.clone(),
        allow_reprint: args.allow_reprint,
        no_elec: args.no_elec,
        dynamic: args.dynamic.clone(),
        cover: args.cover.as_ref().map(PathBuf::from),
    };
    let location = VideoLocation::resolve(&cfg.paths.videos_root, folder, file);
    let session = UploadSession::new(&cfg, location, overrides);
    if !json {
        print_guidance(&cfg, session.location());
    }

    let bar = args.progress_bar.then(BarProgress::new);
    let mut reporter = ProgressReporter::new((LogProgress, bar), SystemClock, cfg.reporter.clone());

    let outcome = match &args.replay {
        Some(log) => {
            let mut uploader = ReplayUploader::new(log)
                .with_pace(Duration::from_millis(cfg.dry_run.chunk_delay_ms));
            session.run(&mut uploader, &mut reporter).await
        }
        None => {
            let chunk_size = usize::try_from(cfg.dry_run.chunk_size_kb.saturating_mul(1024))
                .unwrap_or(usize::MAX);
            let mut uploader = DryRunUploader::new(chunk_size)
                .with_chunk_delay(Duration::from_millis(cfg.dry_run.chunk_delay_ms));
            session.run(&mut uploader, &mut reporter).await
        }
    };

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("upload did not complete: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("=== bili-upload finished ===");
    print_outcome(&outcome, json)
}

fn print_guidance(cfg: &AppConfig, location: &VideoLocation) {
    let file = &location.file_name;
    let r = &cfg.reporter;
    println!("bili-upload");
    println!("Notes:");
    println!(
        "1. {} must hold valid SESSDATA, bili_jct, buvid3 and DedeUserID values",
        cfg.paths.cookie_file.display()
    );
    println!(
        "2. {} must exist",
        location.video.display()
    );
    println!("3. Large videos can take a while to upload");
    println!(
        "4. Progress is logged every {}%, with details every {}s and a summary every {}s",
        r.percent_step,
        r.detailed_interval.as_secs(),
        r.summary_interval.as_secs()
    );
    println!(
        "5. Logs go to the console and {}",
        cfg.paths.logs_dir.join(format!("{}_upload.log", file)).display()
    );
    println!(
        "6. The result is saved to {}",
        cfg.paths.logs_dir.join(format!("{}_result.txt", file)).display()
    );
}

fn print_outcome(outcome: &SessionOutcome, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        println!("AV: {}", outcome.result.aid);
        println!("BV: {}", outcome.result.bvid);
        if let Some(cid) = outcome.result.cid {
            println!("CID: {}", cid);
        }
        println!("Result saved to {}", outcome.record_path.display());
    }
    Ok(())
}

/// Console progress bar fed from the reporter's lines.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {elapsed_precise} {msg}") {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl ProgressHandler for BarProgress {
    fn on_report(&mut self, report: &Report) {
        match report {
            Report::Progress { percentage, .. } | Report::Summary { percentage, .. } => {
                self.bar.set_position(*percentage as u64);
            }
            Report::Detailed { percentage, remaining, .. } => {
                self.bar.set_position(*percentage as u64);
                if let Some(r) = remaining {
                    self.bar.set_message(format!("~{:.0}s left", r.as_secs_f64()));
                }
            }
            Report::PageStarted { .. } => self.bar.set_message(report.to_string()),
            Report::Completed { .. } => self.bar.finish_with_message("done"),
            Report::Failed { message } => self.bar.abandon_with_message(message.clone()),
            _ => {}
        }
    }
}

fn run_zones(json: bool) -> CliResult {
    if json {
        let zones: Vec<_> = ZONES
            .iter()
            .map(|(tid, name)| serde_json::json!({ "tid": tid, "name": name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&zones)?);
    } else {
        for (tid, name) in ZONES {
            println!("{:>4}  {}", tid, name);
        }
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            save_config(&AppConfig::default(), &path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg = load_config();
            set_config_key(&mut cfg, key, value)?;
            save_config(&cfg, &path)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["paths", sub] => match *sub {
            "videos_root" => cfg.paths.videos_root = PathBuf::from(value),
            "logs_dir" => cfg.paths.logs_dir = PathBuf::from(value),
            "cookie_file" => cfg.paths.cookie_file = PathBuf::from(value),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["meta", sub] => match *sub {
            "tid" => cfg.meta.tid = value.parse()?,
            "tags" => cfg.meta.tags = split_tags(value),
            "title_template" => cfg.meta.title_template = value.to_string(),
            "desc_template" => cfg.meta.desc_template = value.to_string(),
            "page_title_template" => cfg.meta.page_title_template = value.to_string(),
            "page_desc_template" => cfg.meta.page_desc_template = value.to_string(),
            "copyright" => {
                cfg.meta.copyright = Copyright::parse(value)
                    .ok_or_else(|| format!("Invalid copyright: {} (original or reprint)", value))?
            }
            "source" => cfg.meta.source = value.to_string(),
            "no_reprint" => cfg.meta.no_reprint = value.parse()?,
            "open_elec" => cfg.meta.open_elec = value.parse()?,
            "dynamic" => cfg.meta.dynamic = value.to_string(),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["reporter", sub] => match *sub {
            "percent_step" => cfg.reporter.percent_step = value.parse()?,
            "detailed_interval_secs" => cfg.reporter.detailed_interval = Duration::from_secs(value.parse()?),
            "summary_interval_secs" => cfg.reporter.summary_interval = Duration::from_secs(value.parse()?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["dry_run", sub] => match *sub {
            "chunk_size_kb" => cfg.dry_run.chunk_size_kb = value.parse()?,
            "chunk_delay_ms" => cfg.dry_run.chunk_delay_ms = value.parse()?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    cfg.reporter.validate()?;
    Ok(())
}
