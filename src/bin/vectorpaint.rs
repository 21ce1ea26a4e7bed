use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vectorpaint::{
    IterationReport, PaintResult, PosLoss, Raster, SessionConfig, SessionInputs, SessionObserver,
    SnapshotWriter, Stage, StrokeRenderer, StrokeSet, SvgOptions, TargetScorer,
};

#[derive(Parser, Debug)]
#[command(name = "vectorpaint", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the initial stroke layout as SVG.
    Init(InitArgs),
    /// Run both optimization stages and write the painting.
    Paint(PaintArgs),
}

#[derive(Parser, Debug)]
struct InitArgs {
    /// Session config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Style image (resized to the canvas).
    #[arg(long)]
    style: PathBuf,

    /// Output SVG path.
    #[arg(long)]
    out: PathBuf,

    /// Also write a rasterized preview.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Override the config seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct PaintArgs {
    /// Session config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Style image (resized to the canvas).
    #[arg(long)]
    style: PathBuf,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// Image the offline guidance pulls toward; defaults to the style image.
    #[arg(long)]
    guidance_target: Option<PathBuf>,

    /// Override the config seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the positional loss (`pos`, `bez` or `sinkhorn`).
    #[arg(long)]
    pos_type: Option<PosLoss>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Paint(args) => cmd_paint(args),
    }
}

fn load_config(path: &Path, seed: Option<u64>) -> anyhow::Result<SessionConfig> {
    let mut config = SessionConfig::from_json_file(path)
        .with_context(|| format!("load config '{}'", path.display()))?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    Ok(config)
}

fn svg_options(config: &SessionConfig) -> SvgOptions {
    SvgOptions {
        background: Some(config.render.background),
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config, args.seed)?;
    config.validate()?;
    let style = Raster::load(&args.style, config.canvas)?;

    let strokes = vectorpaint::initialize(&config.init_spec(), Some(&style))?;
    vectorpaint::write_svg(&args.out, &strokes, svg_options(&config))?;
    eprintln!("wrote {}", args.out.display());

    if let Some(png) = &args.png {
        let mut renderer = vectorpaint::create_renderer(&config.render)?;
        renderer.render(&strokes)?.save_png(png)?;
        eprintln!("wrote {}", png.display());
    }
    Ok(())
}

/// Write `{stem}.svg` and a rendered `{stem}.png` into `dir`.
fn write_result(
    dir: &Path,
    stem: &str,
    strokes: &StrokeSet,
    svg: SvgOptions,
    renderer: &mut dyn StrokeRenderer,
) -> PaintResult<()> {
    let svg_path = dir.join(format!("{stem}.svg"));
    vectorpaint::write_svg(&svg_path, strokes, svg)?;
    let png_path = dir.join(format!("{stem}.png"));
    renderer.render(strokes)?.save_png(&png_path)?;
    tracing::info!(svg = %svg_path.display(), png = %png_path.display(), "result written");
    Ok(())
}

/// Writes `style_result.{svg,png}` after imitation and forwards snapshots.
struct CliObserver {
    out: PathBuf,
    svg: SvgOptions,
    renderer: Box<dyn StrokeRenderer>,
    snapshots: Option<SnapshotWriter>,
}

impl SessionObserver for CliObserver {
    fn on_iteration(&mut self, report: &IterationReport) -> ControlFlow<()> {
        if report.iteration % 50 == 0 {
            tracing::info!(
                stage = %report.stage,
                iteration = report.iteration,
                loss = report.total,
                "progress"
            );
        }
        ControlFlow::Continue(())
    }

    fn on_snapshot(
        &mut self,
        stage: Stage,
        iteration: u64,
        raster: &Raster,
        strokes: &StrokeSet,
    ) -> PaintResult<()> {
        match &mut self.snapshots {
            Some(w) => w.on_snapshot(stage, iteration, raster, strokes),
            None => Ok(()),
        }
    }

    fn on_stage_end(&mut self, stage: Stage, strokes: &StrokeSet) -> PaintResult<()> {
        if stage == Stage::Imitation {
            write_result(
                &self.out,
                "style_result",
                strokes,
                self.svg,
                self.renderer.as_mut(),
            )?;
        }
        Ok(())
    }
}

fn cmd_paint(args: PaintArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config, args.seed)?;
    if let Some(pos_type) = args.pos_type {
        config.loss.pos_type = pos_type;
    }
    let style = Raster::load(&args.style, config.canvas)?;
    let guide = match &args.guidance_target {
        Some(p) => Raster::load(p, config.canvas)?,
        None => style.clone(),
    };

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;
    let svg = svg_options(&config);
    let mut renderer = vectorpaint::create_renderer(&config.render)?;
    config.validate()?;
    let initial = vectorpaint::initialize(&config.init_spec(), Some(&style))?;
    write_result(&args.out, "stroke_init", &initial, svg, renderer.as_mut())?;

    let mut observer = CliObserver {
        out: args.out.clone(),
        svg,
        renderer: vectorpaint::create_renderer(&config.render)?,
        snapshots: config
            .save_step
            .map(|_| SnapshotWriter::new(args.out.join("snapshots"), svg)),
    };
    let mut scorer = TargetScorer::new(guide);

    let result = vectorpaint::run_session(
        config,
        SessionInputs {
            style,
            initial: Some(initial),
        },
        renderer.as_mut(),
        &mut scorer,
        &mut observer,
    );
    let strokes = match result {
        Ok(strokes) => strokes,
        Err(failure) => {
            if let Some(checkpoint) = &failure.checkpoint {
                let path = args.out.join("checkpoint.svg");
                vectorpaint::write_svg(&path, checkpoint, svg)?;
                eprintln!("wrote {}", path.display());
            }
            return Err(failure.into());
        }
    };

    let final_svg = args.out.join("final.svg");
    vectorpaint::write_svg(&final_svg, &strokes, svg)?;
    eprintln!("wrote {}", final_svg.display());

    let final_png = args.out.join("final_render.png");
    renderer.render(&strokes)?.save_png(&final_png)?;
    eprintln!("wrote {}", final_png.display());
    Ok(())
}
