// ============================================================================
// LayerFE CLI — headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   LayerFE --input photo.png --script edit.rhai --output result.png
//   LayerFE -i photo.jpg -o out.png                    (format inferred from output ext)
//   LayerFE -i *.jpg --script blur.rhai --output-dir processed/ --format png
//   LayerFE -i a.png b.png c.png --output-dir out/ --config my_settings.cfg
//
// Each input is loaded into a fresh editor session (white base layer plus
// the image as a content layer), the script drives that session, and the
// flattened render is written out.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::SaveFormat;
use crate::ops::scripting::execute_script_sync;
use crate::project::Project;
use crate::settings::EditorSettings;
use crate::{log_err, log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LayerFE headless layered editor.
#[derive(Parser, Debug)]
#[command(
    name = "LayerFE",
    about = "LayerFE headless layered image editor",
    long_about = "Load images into a layered editing session, drive it with a Rhai\n\
                  script (layers, scale/translate/rotate/draw gestures, blur,\n\
                  sharpen, undo/redo) and write the flattened result.\n\
                  Supports PNG, JPEG, BMP, TGA and TIFF.\n\n\
                  Example:\n  \
                  LayerFE --input photo.png --script edit.rhai --output result.png\n  \
                  LayerFE -i *.jpg --script blur.rhai --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rhai script file to execute against each session.
    /// If omitted, images are only loaded and re-saved (useful for format conversion).
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100). Defaults to the settings file value.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print script console output and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match &args.config {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };

    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let quality = args.quality.unwrap_or(settings.jpeg_quality).clamp(1, 100);

    // Load script source if provided
    let script_source: Option<String> = match &args.script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => Some(src),
            Err(e) => {
                eprintln!("error: could not read script '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    // Create output directory if specified
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(
            input_path,
            &output_path,
            script_source.as_deref(),
            save_format,
            quality,
            &settings,
            args.verbose,
        ) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    script: Option<&str>,
    format: SaveFormat,
    quality: u8,
    settings: &EditorSettings,
    verbose: bool,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut project = Project::open(input.to_path_buf(), settings).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Apply script (optional) ---------------------------------
    if let Some(src) = script {
        let console_output =
            execute_script_sync(src, &mut project.session).map_err(|e| format!("script error: {}", e))?;
        if verbose {
            for line in &console_output {
                println!("  [script] {}", line);
            }
        }
        if project.session.can_undo() {
            project.mark_dirty();
        }
        log_info!(
            "{}: script done, {} layers, {} undo steps",
            project.display_title(),
            project.session.layers().len(),
            project.session.history().undo_count()
        );
    }

    // -- Step 3: Save flattened canvas ------------------------------------
    project
        .save_as(output.to_path_buf(), format, quality)
        .map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path — use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    log_warn!("Pattern '{}' matched no files", pattern);
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when no output extension is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<SaveFormat, crate::io::IoError> {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).ok_or_else(|| crate::io::IoError::UnsupportedFormat(f.to_string()));
    }
    Ok(output.and_then(SaveFormat::from_path).unwrap_or_default())
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: SaveFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_wins_over_extension() {
        assert_eq!(parse_format(Some("bmp"), Some(Path::new("x.png"))).unwrap(), SaveFormat::Bmp);
        assert_eq!(parse_format(None, Some(Path::new("x.JPG"))).unwrap(), SaveFormat::Jpeg);
        assert_eq!(parse_format(None, Some(Path::new("x.webp"))).unwrap(), SaveFormat::Png);
        assert_eq!(parse_format(None, None).unwrap(), SaveFormat::Png);
        assert!(parse_format(Some("gif"), None).is_err());
    }

    #[test]
    fn output_path_never_overwrites_input() {
        let p = build_output_path(Path::new("dir/shot.png"), None, None, SaveFormat::Png).unwrap();
        assert_eq!(p, Path::new("dir/shot_out.png"));
        let p = build_output_path(Path::new("dir/shot.png"), None, Some(Path::new("out")), SaveFormat::Jpeg).unwrap();
        assert_eq!(p, Path::new("out/shot.jpg"));
        let p = build_output_path(Path::new("shot.png"), Some(Path::new("x.tga")), None, SaveFormat::Tga).unwrap();
        assert_eq!(p, Path::new("x.tga"));
    }

    #[test]
    fn cli_args_parse() {
        let args = CliArgs::try_parse_from(["LayerFE", "-i", "a.png", "b.png", "--output-dir", "out", "-q", "70"]).unwrap();
        assert_eq!(args.input, vec!["a.png", "b.png"]);
        assert_eq!(args.quality, Some(70));
        assert!(args.script.is_none());
    }
}
