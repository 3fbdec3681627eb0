// Import the clap Parser derive macro for CLI argument parsing
use clap::{Parser, ValueEnum};

// Import our library types
use stroke_painter::sinks::unique_path;
use stroke_painter::{
    load_target, load_textures, paint_batch, progress_channel, BatchFrame, GifSink,
    PainterConfig, Painter, ProgressRecorder, VectorField,
};

// Import indicatif for progress bars
use indicatif::{ProgressBar, ProgressStyle};

// Import standard library modules
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stroke Painter - Recreate images with hill-climbed brush strokes
///
/// Each stroke is a textured, rotated rectangle. Strokes are placed one at a
/// time; every stroke is optimized by hill climbing before it is committed.
#[derive(Parser)]
#[command(name = "stroke-painter")]
#[command(about = "Paint images with optimized brush strokes", long_about = None)]
#[command(version)]
struct Args {
    /// Target image(s) (PNG, JPEG, etc.)
    ///
    /// With more than one target, all of them are painted in parallel as a batch.
    #[arg(short, long, num_args = 1.., required = true)]
    input: Vec<String>,

    /// Brush texture image(s); alpha defines the brush shape
    #[arg(short = 't', long = "texture", num_args = 1.., required = true)]
    textures: Vec<String>,

    /// Optional JSON config file (command-line flags override it)
    #[arg(short, long)]
    config: Option<String>,

    /// Output directory for generated images
    #[arg(short, long, default_value = "./output")]
    output: String,

    /// Base name for output files
    #[arg(long, default_value = "painting")]
    name: String,

    /// Number of strokes to paint
    #[arg(short = 'n', long)]
    strokes: Option<usize>,

    /// Search iterations for the first strokes
    #[arg(long)]
    min_iterations: Option<usize>,

    /// Search iterations for the last stroke
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Shorter side of the target during optimization, in pixels
    ///
    /// Larger = more detail but slower
    #[arg(long)]
    computation_size: Option<u32>,

    /// Longer side of the final image, in pixels
    #[arg(long)]
    output_size: Option<u32>,

    /// Stroke opacity percentage (1-100)
    #[arg(long)]
    opacity: Option<u8>,

    /// Width of new strokes, in computation pixels
    #[arg(short = 'w', long)]
    stroke_width: Option<f32>,

    /// Tint strokes with the texture's own shading
    #[arg(long)]
    shade: bool,

    /// Random seed for reproducible paintings
    #[arg(long)]
    seed: Option<u64>,

    /// Vector field that strokes align with
    #[arg(long, value_enum)]
    field: Option<FieldPreset>,

    /// Center of the vector field as "x,y" in computation pixels (default: image center)
    #[arg(long, value_parser = parse_point)]
    field_center: Option<(f32, f32)>,

    /// Record a progress GIF next to the final image
    #[arg(long)]
    gif: bool,

    /// Frames per second of the progress GIF
    #[arg(long, default_value_t = 20)]
    gif_fps: u32,

    /// Number of threads for batch painting
    ///
    /// Limits Rayon's thread pool size. By default, uses all available CPU cores.
    #[arg(long)]
    threads: Option<usize>,
}

/// Built-in vector fields
#[derive(Clone, Copy, Debug, ValueEnum)]
enum FieldPreset {
    /// Strokes point toward the center
    Sink,
    /// Strokes point away from the center
    Source,
    /// Strokes circle the center
    Swirl,
}

impl FieldPreset {
    fn build(self, center: (f32, f32)) -> VectorField {
        match self {
            FieldPreset::Sink => VectorField::radial_sink(center),
            FieldPreset::Source => VectorField::radial_source(center),
            FieldPreset::Swirl => VectorField::swirl(center),
        }
    }
}

/// Parse "x,y" into a point
fn parse_point(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got \"{}\"", s))?;
    let x = x.trim().parse().map_err(|e| format!("bad x: {}", e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y: {}", e))?;
    Ok((x, y))
}

impl Args {
    /// Apply command-line overrides on top of the loaded config
    fn apply_overrides(&self, config: &mut PainterConfig) {
        if let Some(v) = self.strokes {
            config.num_strokes = v;
        }
        if let Some(v) = self.min_iterations {
            config.min_iterations = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.computation_size {
            config.computation_size = v;
        }
        if let Some(v) = self.output_size {
            config.output_size = v;
        }
        if let Some(v) = self.opacity {
            config.opacity = v;
        }
        if let Some(v) = self.stroke_width {
            config.initial_stroke_width = v;
        }
        if self.shade {
            config.shade_with_texture = true;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

/// Main entry point for the CLI application
fn main() {
    // Log level comes from RUST_LOG (e.g. RUST_LOG=debug for per-stroke detail)
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load inputs, paint, and save results
fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Step 0: Configure Rayon thread pool if thread limit is specified
    if let Some(num_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
        println!("Using {} thread(s) for batch painting", num_threads);
    }

    // Step 1: Build and check the configuration before touching any images
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading config: {}", path);
            PainterConfig::load(path)?
        }
        None => PainterConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    fs::create_dir_all(&args.output)?;

    // Step 2: Load textures (fails on the first unreadable file)
    println!("Loading {} texture(s)...", args.textures.len());
    let textures = load_textures(&args.textures)?;

    // Step 3: Load target(s)
    for input in &args.input {
        if !Path::new(input).exists() {
            return Err(format!("Input file not found: {}", input).into());
        }
    }
    let targets = args
        .input
        .iter()
        .map(|input| load_target(input, config.computation_size))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(preset) = args.field {
        let first = &targets[0];
        let center = args.field_center.unwrap_or((
            first.width() as f32 / 2.0,
            first.height() as f32 / 2.0,
        ));
        config.vector_field = Some(preset.build(center));
    }

    if targets.len() > 1 {
        return run_batch(&args, config, textures, targets);
    }
    let target = &targets[0];

    println!("\nPainting {}", args.input[0]);
    println!("  Working size: {}x{}", target.width(), target.height());
    println!("  Strokes: {}", config.num_strokes);
    println!(
        "  Iterations per stroke: {} → {}",
        config.min_iterations, config.max_iterations
    );
    println!("  Textures: {}", textures.len());
    if let Some(field) = &config.vector_field {
        println!("  Vector field centered at {:?}", field.center());
    }

    // Step 4: Optional progress GIF on its own recorder thread
    let (progress, recorder) = if args.gif {
        let (tx, rx) = progress_channel(config.progress_capacity, config.progress_policy);
        let sink = GifSink::create(Path::new(&args.output).join(format!("{}.gif", args.name)), args.gif_fps)?;
        println!("  Recording progress to {}", sink.path().display());
        (Some(tx), Some(ProgressRecorder::spawn(rx, sink)?))
    } else {
        (None, None)
    };

    let total = config.num_strokes as u64;
    let painter = Painter::new(config, textures)?;

    // Step 5: Setup progress bar
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} (ETA: {eta}) | {msg}")?
            .progress_chars("=>-"),
    );

    println!("\n🖌️  Starting to paint...\n");

    // Step 6: Paint!
    let outcome = painter.paint(target, progress, |report| {
        pb.set_message(format!(
            "Fitness: {:.3}, Iterations: {}",
            report.fitness, report.iterations
        ));
        pb.inc(1);
    })?;

    pb.finish_with_message("Painting complete! 🎉");

    if let Some(recorder) = recorder {
        let frames = recorder.join(Duration::from_secs(300))?;
        println!("  Progress GIF: {} frames", frames);
    }

    // Step 7: Save the high-resolution result
    let path = save_canvas(&outcome.output, &args.output, &args.name)?;

    println!("\n✨ Results:");
    println!("  Strokes painted: {}", outcome.strokes.len());
    println!(
        "  Output size: {}x{}",
        outcome.output.width(),
        outcome.output.height()
    );
    println!("\nCheck {} for the final result!", path.display());

    Ok(())
}

/// Paint several targets in parallel
fn run_batch(
    args: &Args,
    config: PainterConfig,
    textures: stroke_painter::TextureSet,
    targets: Vec<stroke_painter::Canvas>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nPainting {} frames in parallel...", targets.len());

    let frames = targets
        .into_iter()
        .map(|target| BatchFrame::with_all_textures(target, textures.len()))
        .collect();
    let results = paint_batch(frames, &textures, &config);

    let mut failed = 0;
    for (index, result) in results.iter().enumerate() {
        match result {
            Ok(outcome) => {
                let name = format!("{}_{:03}", args.name, index);
                let path = save_canvas(&outcome.output, &args.output, &name)?;
                println!("  Frame {}: {}", index, path.display());
            }
            Err(e) => {
                failed += 1;
                println!("  Frame {}: failed ({})", index, e);
            }
        }
    }

    if failed == results.len() {
        return Err("every frame failed".into());
    }
    println!("\n✨ {} of {} frames painted", results.len() - failed, results.len());
    Ok(())
}

/// Save a canvas as PNG without overwriting earlier results
fn save_canvas(
    canvas: &stroke_painter::Canvas,
    output_dir: &str,
    name: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = unique_path(&Path::new(output_dir).join(format!("{}.png", name)));
    canvas.to_rgba8().save(&path)?;
    Ok(path)
}
