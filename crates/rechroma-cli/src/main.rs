use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rechroma_core::{
    decoders, exporters, pipeline, refine, ColorizeOptions, OnnxPredictor, RefineOptions,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "rechroma")]
#[command(version, about = "Photo colorization with tiled inference and brush refinement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Colorize a grayscale image
    Colorize {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (defaults to <input>_colorized)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// ONNX chroma model file
        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        /// How strongly faint colors are amplified
        #[arg(long, value_name = "FLOAT", default_value = "1.8")]
        vibrancy: f32,

        /// Tile grid density (N for an NxN grid; 1 disables tiling)
        #[arg(long, value_name = "N", default_value = "3")]
        grid: u32,
    },

    /// Re-color a masked region of a previous result
    Refine {
        /// Original image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Brush mask image (non-zero pixels mark the region)
        #[arg(value_name = "MASK")]
        mask: PathBuf,

        /// Output file (defaults to <input>_refined)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// ONNX chroma model file
        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        /// Previous colorization to refine; computed fresh when omitted
        #[arg(long, value_name = "FILE")]
        base: Option<PathBuf>,

        /// Target color for the region as #RRGGBB
        #[arg(long, value_name = "HEX")]
        color: Option<String>,

        /// Strength multiplier for the local prediction
        #[arg(long, value_name = "FLOAT", default_value = "4.5")]
        refine_vibrancy: f32,
    },

    /// Colorize multiple images with shared settings
    Batch {
        /// Input image files
        #[arg(value_name = "INPUTS")]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// ONNX chroma model file
        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        /// How strongly faint colors are amplified
        #[arg(long, value_name = "FLOAT", default_value = "2.0")]
        vibrancy: f32,

        /// Tile grid density
        #[arg(long, value_name = "N", default_value = "4")]
        grid: u32,

        /// Number of parallel threads
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<usize>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Colorize {
            input,
            out,
            model,
            vibrancy,
            grid,
        } => cmd_colorize(input, out, model, vibrancy, grid),

        Commands::Refine {
            input,
            mask,
            out,
            model,
            base,
            color,
            refine_vibrancy,
        } => cmd_refine(input, mask, out, model, base, color, refine_vibrancy),

        Commands::Batch {
            inputs,
            out,
            model,
            vibrancy,
            grid,
            threads,
        } => cmd_batch(inputs, out, model, vibrancy, grid, threads),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_colorize(
    input: PathBuf,
    out: Option<PathBuf>,
    model: PathBuf,
    vibrancy: f32,
    grid: u32,
) -> CliResult {
    println!("Loading model from {}...", model.display());
    let predictor = OnnxPredictor::load(&model)?;

    println!("Decoding {}...", input.display());
    let image = decoders::decode_image(&input)?;
    println!("  Image: {}x{}", image.width(), image.height());

    let options = ColorizeOptions {
        grid_size: grid,
        vibrancy,
        ..ColorizeOptions::default()
    };

    if grid > 1 {
        println!("Running {}x{} tiled pass ({} windows)...", grid, grid, grid * grid);
    } else {
        println!("Running global pass only...");
    }
    let result = pipeline::colorize_image(&image, &predictor, &options)?;

    let output = determine_output_path(&input, &out, "colorized");
    exporters::export_image(&result, &output)?;
    println!("Done! Colorized image saved to: {}", output.display());
    Ok(())
}

fn cmd_refine(
    input: PathBuf,
    mask: PathBuf,
    out: Option<PathBuf>,
    model: PathBuf,
    base: Option<PathBuf>,
    color: Option<String>,
    refine_vibrancy: f32,
) -> CliResult {
    // Validate the target color before any heavy work so a typo fails
    // fast instead of silently dropping the guidance.
    let target_color = color
        .as_deref()
        .map(rechroma_core::parse_hex_color)
        .transpose()?;

    println!("Loading model from {}...", model.display());
    let predictor = OnnxPredictor::load(&model)?;

    println!("Decoding {}...", input.display());
    let image = decoders::decode_image(&input)?;
    let mask_image = decoders::decode_mask(&mask)?;

    let background = match &base {
        Some(path) => {
            println!("Using previous result from {}...", path.display());
            Some(decoders::decode_image(path)?)
        }
        None => {
            println!("No base supplied; computing full colorization first...");
            None
        }
    };

    let options = RefineOptions {
        refine_vibrancy,
        ..RefineOptions::default()
    };

    println!("Refining masked region...");
    let result = refine::refine_image(
        &refine::RefineRequest {
            image: &image,
            mask: &mask_image,
            background: background.as_ref(),
            target_color,
        },
        &predictor,
        &options,
        &rechroma_core::CancelToken::new(),
    )?;

    let output = determine_output_path(&input, &out, "refined");
    exporters::export_image(&result, &output)?;
    println!("Done! Refined image saved to: {}", output.display());
    Ok(())
}

fn cmd_batch(
    inputs: Vec<PathBuf>,
    out: Option<PathBuf>,
    model: PathBuf,
    vibrancy: f32,
    grid: u32,
    threads: Option<usize>,
) -> CliResult {
    if inputs.is_empty() {
        return Err("No input files specified".into());
    }

    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
        println!("Using {} threads for parallel processing", num_threads);
    }

    let output_dir = out.clone().unwrap_or_else(|| PathBuf::from("."));
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)?;
    }

    println!("Loading model from {}...", model.display());
    let predictor = OnnxPredictor::load(&model)?;

    let options = ColorizeOptions {
        grid_size: grid,
        vibrancy,
        ..ColorizeOptions::default()
    };

    println!("\nProcessing {} files in parallel...\n", inputs.len());

    let processed_count = AtomicUsize::new(0);
    let total_files = inputs.len();

    let results: Vec<Result<PathBuf, String>> = inputs
        .par_iter()
        .map(|input| {
            let image = decoders::decode_image(input).map_err(|e| e.to_string())?;
            let result =
                pipeline::colorize_image(&image, &predictor, &options).map_err(|e| e.to_string())?;

            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let extension = input.extension().and_then(|e| e.to_str()).unwrap_or("png");
            let output_path = output_dir.join(format!("{}_colorized.{}", stem, extension));
            exporters::export_image(&result, &output_path).map_err(|e| e.to_string())?;

            let count = processed_count.fetch_add(1, Ordering::SeqCst) + 1;
            println!(
                "[{}/{}] Processed: {} -> {}",
                count,
                total_files,
                input.display(),
                output_path.display()
            );

            Ok(output_path)
        })
        .collect();

    let mut success_count = 0;
    let mut errors: Vec<(PathBuf, String)> = Vec::new();
    for (input, result) in inputs.iter().zip(results.iter()) {
        match result {
            Ok(_) => success_count += 1,
            Err(e) => errors.push((input.clone(), e.clone())),
        }
    }

    println!("\n========================================");
    println!("BATCH PROCESSING COMPLETE");
    println!("========================================");
    println!("  Successful: {}", success_count);
    println!("  Failed:     {}", errors.len());
    println!("  Output dir: {}", output_dir.display());

    if !errors.is_empty() {
        println!("\nErrors:");
        for (path, error) in &errors {
            println!("  {}: {}", path.display(), error);
        }
        return Err(format!("{} files failed to process", errors.len()).into());
    }

    Ok(())
}

/// Output path next to the input: `<stem>_<suffix>.<ext>`.
fn determine_output_path(input: &Path, out: &Option<PathBuf>, suffix: &str) -> PathBuf {
    if let Some(path) = out {
        return path.clone();
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = input.extension().and_then(|e| e.to_str()).unwrap_or("png");
    input.with_file_name(format!("{}_{}.{}", stem, suffix, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_output_path_default() {
        let path = determine_output_path(Path::new("photos/cat.jpg"), &None, "colorized");
        assert_eq!(path, Path::new("photos/cat_colorized.jpg"));
    }

    #[test]
    fn test_determine_output_path_explicit() {
        let out = Some(PathBuf::from("result.png"));
        let path = determine_output_path(Path::new("photos/cat.jpg"), &out, "colorized");
        assert_eq!(path, Path::new("result.png"));
    }
}
