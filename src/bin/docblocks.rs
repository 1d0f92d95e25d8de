//! CLI binary for docblocks.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and drives the batch PDF, single-image, and merge
//! flows.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docblocks::{
    assemble_page, merge_directory, DocBlocksError, GatedSegmenter, HttpSegmenter, NoopExtractor,
    NullSegmenter, ObjectsResponse, PageInput, PageSelection, Pipeline, PipelineConfig,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a PDF: one markdown file + crop images per page
  docblocks convert report.pdf -o out/

  # Only pages 1..8, with 5 attempts per page
  docblocks convert report.pdf --pages ,8 --retries 5 -o out/

  # Geometry only, no VLM calls
  docblocks convert report.pdf --bbox-only -o out/

  # Single image → objects JSON
  docblocks extract scan_page_1.png > objects.json

  # Single image, whole-page VLM mode (no layout service needed)
  docblocks extract scan.png --vlm-only > objects.json

  # Layout boxes only
  docblocks detect scan_page_1.png

  # Merge per-page markdown into one document + shared media dir
  docblocks merge out/ -o merged/document.md

PAGE SELECTION:
  2        page 2 only
  1,3,5    pages 1, 3 and 5
  ,8       pages 1 through 8
  3,       page 3 through the last page
  all      every page (default)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  GEMINI_API_KEY           Google Gemini API key
  DOCBLOCKS_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  DOCBLOCKS_MODEL          Override model ID
  DOCBLOCKS_SEGMENTER_URL  Layout-segmentation service endpoint

SETUP:
  1. Serve a layout model:  DOCBLOCKS_SEGMENTER_URL=http://localhost:8000/predict
  2. Set an API key:        export OPENAI_API_KEY=sk-...
  3. Convert:               docblocks convert document.pdf -o out/
"#;

/// Segment document pages into typed blocks and extract their text as Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "docblocks",
    version,
    about = "Segment document page images into typed layout blocks with Markdown text",
    long_about = "Convert document page images into typed content blocks (headings, paragraphs, \
tables, pictures, …) with pixel-accurate bounding boxes. Textual blocks are transcribed to \
Markdown by a Vision Language Model; table and picture blocks are cut out as crop images.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCBLOCKS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCBLOCKS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a PDF: rasterise pages, extract blocks, write per-page markdown + crops.
    Convert(ConvertArgs),
    /// Run layout detection on a single image and print geometry-only JSON.
    Detect(DetectArgs),
    /// Extract a single image and print the full objects JSON.
    Extract(ExtractArgs),
    /// Merge per-page markdown files into one document with a shared media directory.
    Merge(MergeArgs),
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Input PDF file.
    input: PathBuf,

    /// Output directory (default: the input file's directory).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Pages to process: e.g. 2, 1,2,3, ,8, 3, or all.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Layout-segmentation service endpoint.
    #[arg(long, env = "DOCBLOCKS_SEGMENTER_URL",
          default_value = "http://localhost:8000/predict")]
    segmenter_url: String,

    /// Attempts per page before it is skipped.
    #[arg(short, long, default_value_t = 3)]
    retries: u32,

    /// Fixed delay between page attempts, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// Number of pages processed concurrently.
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,

    /// Concurrent per-block extraction calls within one page.
    #[arg(long, default_value_t = 8)]
    block_concurrency: usize,

    /// Geometry only: skip all VLM extraction.
    #[arg(long)]
    bbox_only: bool,

    /// Maximum rendered page dimension in pixels.
    #[arg(long, default_value_t = 2000)]
    max_pixels: u32,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "DOCBLOCKS_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "DOCBLOCKS_PROVIDER")]
    provider: Option<String>,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(clap::Args, Debug)]
struct DetectArgs {
    /// Input page image (jpg, png, gif).
    image: PathBuf,

    /// Layout-segmentation service endpoint.
    #[arg(long, env = "DOCBLOCKS_SEGMENTER_URL",
          default_value = "http://localhost:8000/predict")]
    segmenter_url: String,
}

#[derive(clap::Args, Debug)]
struct ExtractArgs {
    /// Input page image (jpg, png, gif).
    image: PathBuf,

    /// Layout-segmentation service endpoint.
    #[arg(long, env = "DOCBLOCKS_SEGMENTER_URL",
          default_value = "http://localhost:8000/predict")]
    segmenter_url: String,

    /// Geometry only: skip all VLM extraction.
    #[arg(long)]
    bbox_only: bool,

    /// Whole-page VLM mode: no layout service; the VLM discovers elements itself.
    #[arg(long, conflicts_with = "bbox_only")]
    vlm_only: bool,

    /// LLM model ID.
    #[arg(long, env = "DOCBLOCKS_MODEL")]
    model: Option<String>,

    /// LLM provider.
    #[arg(long, env = "DOCBLOCKS_PROVIDER")]
    provider: Option<String>,
}

#[derive(clap::Args, Debug)]
struct MergeArgs {
    /// Directory containing per-page markdown files (searched recursively).
    input_dir: PathBuf,

    /// Output merged markdown file.
    #[arg(short, long)]
    output: PathBuf,

    /// Shared media directory (default: `media/` next to the output file).
    #[arg(short, long)]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(args) => cmd_convert(args, cli.quiet).await,
        Command::Detect(args) => cmd_detect(args).await,
        Command::Extract(args) => cmd_extract(args).await,
        Command::Merge(args) => cmd_merge(args, cli.quiet),
    }
}

// ── convert ──────────────────────────────────────────────────────────────

async fn cmd_convert(args: ConvertArgs, quiet: bool) -> Result<()> {
    let page_count = docblocks::pipeline::render::pdf_page_count(&args.input)
        .await
        .context("Failed to open PDF")?;

    let selection = PageSelection::parse(&args.pages)?;
    let indices = selection.to_indices(page_count);
    if indices.is_empty() {
        bail!(
            "Page selection '{}' matches none of the document's {} pages",
            args.pages,
            page_count
        );
    }

    let rendered =
        docblocks::pipeline::render::render_pdf_pages(&args.input, &indices, args.max_pixels)
            .await
            .context("Failed to rasterise PDF pages")?;

    let out_dir = args.out.clone().unwrap_or_else(|| {
        args.input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output dir {}", out_dir.display()))?;

    let base = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());

    // Persist the page rasters; they are the coordinate space every bbox
    // refers to, and merge resolves crop references against them.
    for (idx, img) in &rendered {
        let png_path = out_dir.join(format!("{base}_page_{}.png", idx + 1));
        img.save(&png_path)
            .with_context(|| format!("Failed to write {}", png_path.display()))?;
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    let config = PipelineConfig::builder()
        .page_concurrency(args.concurrency)
        .block_concurrency(args.block_concurrency)
        .max_attempts(args.retries)
        .retry_backoff_ms(args.retry_backoff_ms)
        .build()?;

    let segmenter = Arc::new(
        HttpSegmenter::new(&args.segmenter_url).context("Failed to build segmenter client")?,
    );
    let pipeline = if args.bbox_only {
        // No provider needed when nothing routes to extraction.
        Pipeline::new(
            Arc::new(GatedSegmenter::new(segmenter, 1)),
            Arc::new(NoopExtractor),
            config,
        )
    } else {
        let mut config = config;
        config.model = args.model.clone();
        config.provider_name = args.provider.clone();
        Pipeline::with_vlm(segmenter, config)?
    };

    // ── Drive pages ──────────────────────────────────────────────────────
    let total = rendered.len();
    let show_progress = !quiet && !args.no_progress;
    let bar = if show_progress {
        let b = ProgressBar::new(total as u64);
        b.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        b.set_prefix("Extracting");
        b
    } else {
        ProgressBar::hidden()
    };

    let pipeline_ref = &pipeline;
    let base_ref = &base;
    let bbox_only = args.bbox_only;
    let mut pages = stream::iter(rendered.into_iter().map(|(idx, img)| async move {
        let name = format!("{base_ref}_page_{}", idx + 1);
        let result = pipeline_ref
            .process_image_with_retries(&format!("{name}.png"), &img, bbox_only)
            .await;
        (name, img, result)
    }))
    .buffer_unordered(args.concurrency);

    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut first_error: Option<String> = None;

    while let Some((name, img, result)) = pages.next().await {
        match result {
            Ok(page) => {
                let artifacts = assemble_page(&page, &img);

                let md_path = out_dir.join(format!("{name}.md"));
                std::fs::write(&md_path, format!("{}\n", artifacts.markdown))
                    .with_context(|| format!("Failed to write {}", md_path.display()))?;

                if !artifacts.crops.is_empty() {
                    let crop_dir = out_dir.join(&name);
                    std::fs::create_dir_all(&crop_dir)
                        .with_context(|| format!("Failed to create {}", crop_dir.display()))?;
                    for (label, crop) in &artifacts.crops {
                        let crop_path = crop_dir.join(format!("{label}.png"));
                        crop.save(&crop_path)
                            .with_context(|| format!("Failed to write {}", crop_path.display()))?;
                    }
                }

                bar.println(format!(
                    "  {} {}  {}  {}",
                    green("✓"),
                    name,
                    dim(&format!("{} blocks", page.blocks.len())),
                    dim(&format!("{} crops", artifacts.crops.len())),
                ));
                processed += 1;
            }
            Err(e) => {
                bar.println(format!("  {} {}  {}", red("✗"), name, red(&e.to_string())));
                first_error.get_or_insert_with(|| e.to_string());
                failed += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if processed == 0 {
        return Err(DocBlocksError::AllPagesFailed {
            total,
            attempts: args.retries,
            first_error: first_error.unwrap_or_else(|| "Unknown error".into()),
        }
        .into());
    }

    if !quiet {
        eprintln!(
            "{} {}/{} pages  →  {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&processed.to_string()),
            total,
            bold(&out_dir.display().to_string()),
        );
        if failed > 0 {
            eprintln!("   {} pages failed and were skipped", red(&failed.to_string()));
        }
    }

    Ok(())
}

// ── detect ───────────────────────────────────────────────────────────────

async fn cmd_detect(args: DetectArgs) -> Result<()> {
    let segmenter = Arc::new(
        HttpSegmenter::new(&args.segmenter_url).context("Failed to build segmenter client")?,
    );
    let pipeline = Pipeline::new(
        Arc::new(GatedSegmenter::new(segmenter, 1)),
        Arc::new(NoopExtractor),
        PipelineConfig::default(),
    );

    let source = file_name_of(&args.image);
    let response = pipeline
        .detections_response(&source, PageInput::Path(args.image))
        .await
        .context("Layout detection failed")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

// ── extract ──────────────────────────────────────────────────────────────

async fn cmd_extract(args: ExtractArgs) -> Result<()> {
    let mut config = PipelineConfig::default();
    config.model = args.model.clone();
    config.provider_name = args.provider.clone();

    let source = file_name_of(&args.image);

    let page = if args.vlm_only {
        let pipeline = Pipeline::with_vlm(Arc::new(NullSegmenter), config)?;
        pipeline
            .process_page_vlm_only(&source, PageInput::Path(args.image))
            .await
            .context("Whole-page extraction failed")?
    } else {
        let segmenter = Arc::new(
            HttpSegmenter::new(&args.segmenter_url)
                .context("Failed to build segmenter client")?,
        );
        let pipeline = if args.bbox_only {
            Pipeline::new(
                Arc::new(GatedSegmenter::new(segmenter, 1)),
                Arc::new(NoopExtractor),
                config,
            )
        } else {
            Pipeline::with_vlm(segmenter, config)?
        };
        pipeline
            .process_page(&source, PageInput::Path(args.image), args.bbox_only)
            .await
            .context("Extraction failed")?
    };

    let response = ObjectsResponse::from(&page);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

// ── merge ────────────────────────────────────────────────────────────────

fn cmd_merge(args: MergeArgs, quiet: bool) -> Result<()> {
    let media_dir = args.media_dir.clone().unwrap_or_else(|| {
        args.output
            .parent()
            .map(|p| p.join("media"))
            .unwrap_or_else(|| PathBuf::from("media"))
    });

    let count = merge_directory(&args.input_dir, &args.output, &media_dir)
        .context("Merge failed")?;

    if !quiet {
        eprintln!(
            "{} merged {} files  →  {}",
            green("✔"),
            bold(&count.to_string()),
            bold(&args.output.display().to_string()),
        );
    }
    Ok(())
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
