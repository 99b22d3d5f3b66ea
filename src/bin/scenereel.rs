use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use scenereel::live::surface::{NullAudio, PngSequenceSurface};

#[derive(Parser, Debug)]
#[command(name = "scenereel", version)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a scene list as a single video file.
    Render(RenderArgs),
    /// Ingest URLs into an asset cache and print the records as JSON.
    Ingest(IngestArgs),
    /// Play a scene list through the live compositor and dump the frames as PNGs.
    Preview(PreviewArgs),
    /// Write a whole-project snapshot for later re-import.
    Snapshot(SnapshotArgs),
    /// Fill missing scene assets with the offline provider.
    Produce(ProduceArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene list (JSON array or project snapshot).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "16:9")]
    aspect: String,

    /// Pace frames at the output frame rate instead of rendering as fast as possible.
    #[arg(long)]
    realtime: bool,

    /// Apply each scene's visual effect to exported frames.
    #[arg(long)]
    effects: bool,

    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct IngestArgs {
    urls: Vec<String>,

    /// Write materialized objects under this directory.
    #[arg(long)]
    save_objects: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    out_dir: PathBuf,

    /// Maximum number of frames to present.
    #[arg(long, default_value_t = 60)]
    frames: u64,

    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "untitled")]
    title: String,
}

#[derive(Parser, Debug)]
struct ProduceArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Where to write the updated scene list.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "16:9")]
    aspect: String,

    /// Stills only, on the wider research pool.
    #[arg(long)]
    research: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

impl From<BackendChoice> for scenereel::BackendKind {
    fn from(c: BackendChoice) -> Self {
        match c {
            BackendChoice::Cpu => Self::Cpu,
            BackendChoice::Gpu => Self::Gpu,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scenereel=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => scenereel::ReelConfig::load(path)?,
        None => scenereel::ReelConfig::default(),
    };
    cfg.validate()?;

    match cli.cmd {
        Command::Render(args) => cmd_render(&cfg, args).await,
        Command::Ingest(args) => cmd_ingest(&cfg, args).await,
        Command::Preview(args) => cmd_preview(&cfg, args).await,
        Command::Snapshot(args) => cmd_snapshot(args),
        Command::Produce(args) => cmd_produce(&cfg, args).await,
    }
}

/// Accepts either a bare JSON array of scenes or a project snapshot.
fn read_scenes(path: &Path) -> anyhow::Result<Vec<scenereel::Scene>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read scene list '{}'", path.display()))?;
    if let Ok(scenes) = serde_json::from_str::<Vec<scenereel::Scene>>(&text) {
        return Ok(scenes);
    }
    let snapshot = scenereel::ProjectSnapshot::import_json(&text)
        .with_context(|| format!("parse scene list '{}'", path.display()))?;
    Ok(snapshot.scenes)
}

fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("write '{}'", path.display()))
}

fn media_loader() -> anyhow::Result<Arc<scenereel::DefaultMediaLoader>> {
    let fetcher = Arc::new(scenereel::HttpImageFetcher::new()?);
    Ok(Arc::new(scenereel::DefaultMediaLoader::new(fetcher)))
}

async fn cmd_render(cfg: &scenereel::ReelConfig, args: RenderArgs) -> anyhow::Result<()> {
    let scenes = read_scenes(&args.in_path)?;
    let aspect = scenereel::AspectRatio::parse(&args.aspect)?;

    let mut opts = scenereel::ExportOpts::from_config(&cfg.render)?;
    opts.realtime = args.realtime;
    opts.apply_effects |= args.effects;

    let mut renderer = scenereel::ExportRenderer::new(media_loader()?, opts);
    if args.effects || cfg.render.effects_in_export {
        renderer = renderer.with_effects(scenereel::create_backend(args.backend.into())?);
    }

    let mut last_pct = -1i64;
    let blob = renderer
        .render(&scenes, aspect, |frac, label| {
            let pct = (frac * 100.0).floor() as i64;
            if pct != last_pct {
                last_pct = pct;
                eprint!("\r{pct:>3}% {label:<32}");
            }
        })
        .await?;
    eprintln!();

    blob.save(&args.out)?;
    eprintln!(
        "wrote {} ({} frames, {:.2}s, {})",
        args.out.display(),
        blob.frame_count,
        blob.duration_sec,
        blob.mime
    );
    Ok(())
}

async fn cmd_ingest(cfg: &scenereel::ReelConfig, args: IngestArgs) -> anyhow::Result<()> {
    let fetcher = Arc::new(scenereel::HttpImageFetcher::new()?);
    let cache = scenereel::AssetCache::new(cfg.cache.clone(), fetcher);
    for url in &args.urls {
        cache.ingest(url, None).await;
    }

    let records: Vec<scenereel::AssetRecord> =
        cache.records().iter().map(|r| r.as_ref().clone()).collect();
    println!("{}", serde_json::to_string_pretty(&records)?);

    if let Some(dir) = args.save_objects.as_deref() {
        let n = cache.save_objects(dir)?;
        eprintln!("saved {n} objects under {}", dir.display());
    }
    Ok(())
}

async fn cmd_preview(cfg: &scenereel::ReelConfig, args: PreviewArgs) -> anyhow::Result<()> {
    let scenes = read_scenes(&args.in_path)?;
    let loader = media_loader()?;
    let surface = PngSequenceSurface::new(&args.out_dir)?;

    let mut player = scenereel::LivePlayer::load(
        loader.as_ref(),
        &scenes,
        scenereel::LiveOpts::from(&cfg.preview),
        scenereel::create_backend(args.backend.into())?,
        Box::new(surface),
        Box::new(NullAudio),
    )
    .await?;

    player.play()?;
    let mut presented = 0u64;
    while presented < args.frames && player.state() == scenereel::PlayState::Playing {
        player.tick()?;
        presented += 1;
    }
    player.dispose();

    eprintln!("wrote {presented} frames to {}", args.out_dir.display());
    Ok(())
}

fn cmd_snapshot(args: SnapshotArgs) -> anyhow::Result<()> {
    let scenes = read_scenes(&args.in_path)?;
    scenereel::scene::model::validate_scenes(&scenes)?;
    let snapshot = scenereel::ProjectSnapshot::new(args.title, serde_json::Value::Null, scenes);
    write_text(&args.out, &snapshot.export_json()?)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn cmd_produce(cfg: &scenereel::ReelConfig, args: ProduceArgs) -> anyhow::Result<()> {
    let scenes = read_scenes(&args.in_path)?;
    let aspect = scenereel::AspectRatio::parse(&args.aspect)?;
    let mode = if args.research {
        scenereel::ProductionMode::Research
    } else {
        scenereel::ProductionMode::Full
    };

    let opts = scenereel::ProductionOpts::from_config(&cfg.production, mode, aspect);
    let pipeline =
        scenereel::ProductionPipeline::new(Arc::new(scenereel::OfflineProvider::new()), opts);
    let report = pipeline.run(scenes).await;

    write_text(&args.out, &serde_json::to_string_pretty(&report.scenes)?)?;
    eprintln!(
        "produced {} scenes, wrote {}",
        report.produced.len(),
        args.out.display()
    );
    report.into_result()?;
    Ok(())
}
