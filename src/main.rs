//! # Linkbrief CLI (`lbr`)
//!
//! The `lbr` binary processes one URL per invocation: classify it,
//! extract its content, synthesize an analysis, and optionally export
//! the result to a Capacities space.
//!
//! ## Usage
//!
//! ```bash
//! lbr --config ./config/linkbrief.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lbr classify <url>` | Print how the URL would be handled, offline |
//! | `lbr analyze <url>` | Run the full pipeline and print the analysis |
//!
//! ## Examples
//!
//! ```bash
//! # What would this URL be treated as?
//! lbr classify "https://youtu.be/dQw4w9WgXcQ"
//!
//! # Analyze a video, preferring Spanish captions
//! lbr analyze "https://www.youtube.com/watch?v=dQw4w9WgXcQ" --language es
//!
//! # Analyze a repository, machine-readable output
//! lbr analyze "https://github.com/rust-lang/mdBook" --json
//!
//! # Analyze and push the note to Capacities
//! lbr analyze "https://youtu.be/dQw4w9WgXcQ" --export
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use linkbrief::classify::{classify, SourceKind};
use linkbrief::config::{self, Config};
use linkbrief::export::{CapacitiesExporter, NoteExporter};
use linkbrief::models::{format_timestamp, AnalysisResult, DocumentKind};
use linkbrief::pipeline::Pipeline;

/// Linkbrief CLI, a URL content ingestion and synthesis pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/linkbrief.example.toml` for a full
/// example; a missing file falls back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "lbr",
    about = "Linkbrief: analyze a video or repository URL into a structured note",
    version,
    long_about = "Linkbrief classifies a URL as a YouTube video or GitHub repository, \
    extracts its transcript or tree and file contents, and uses a language model to \
    synthesize a summary, topic tags, and chapters or a structure digest. Results can \
    be exported to a Capacities space."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/linkbrief.toml`. Model, extraction, and
    /// export settings are read from this file.
    #[arg(long, global = true, default_value = "./config/linkbrief.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Show how a URL would be classified, without any network access.
    ///
    /// Prints the detected source kind and the extracted identifiers
    /// (video id, or repository owner and name).
    Classify {
        /// The URL to classify.
        url: String,
    },

    /// Run the full pipeline on one URL.
    ///
    /// Classifies the URL, extracts transcript or repository content,
    /// synthesizes the analysis with the configured language model, and
    /// prints the result. Use `--export` to also push a note to the
    /// configured Capacities space.
    Analyze {
        /// The URL to analyze.
        url: String,

        /// Preferred caption language (overrides the config).
        #[arg(long)]
        language: Option<String>,

        /// Export the finished analysis to Capacities.
        #[arg(long)]
        export: bool,

        /// Print the analysis as JSON instead of formatted text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // Classify is offline and needs no config.
    if let Commands::Classify { url } = &cli.command {
        run_classify(url);
        return Ok(());
    }

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::minimal()
    };

    match cli.command {
        Commands::Classify { .. } => unreachable!(),
        Commands::Analyze {
            url,
            language,
            export,
            json,
        } => {
            run_analyze(cfg, &url, language, export, json).await?;
        }
    }

    Ok(())
}

fn run_classify(url: &str) {
    match classify(url) {
        SourceKind::Video { video_id } => {
            println!("video (id: {})", video_id);
        }
        SourceKind::Repository { owner, repo } => {
            println!("repository ({}/{})", owner, repo);
        }
        SourceKind::Unrecognized => {
            println!("unrecognized");
        }
    }
}

async fn run_analyze(
    mut cfg: Config,
    url: &str,
    language: Option<String>,
    export: bool,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(language) = language {
        cfg.transcript.language = language;
    }

    let export_cfg = cfg.export.clone();
    let do_export = export || export_cfg.enabled;

    let pipeline = Pipeline::from_config(cfg)?;
    let result = pipeline.run(url).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if do_export {
        match CapacitiesExporter::new(&export_cfg) {
            Ok(exporter) => match exporter.export(&result).await {
                Ok(receipt) => match receipt.note_id {
                    Some(id) => println!("\nExported to {} (note {}).", receipt.service, id),
                    None => println!("\nExported to {}.", receipt.service),
                },
                // The analysis above is still valid; only the export failed.
                Err(e) => eprintln!("\nExport failed: {}", e),
            },
            Err(e) => eprintln!("\nExport not configured: {}", e),
        }
    }

    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!("{}", result.title);
    println!("{}", result.url);
    println!();
    println!("{}", result.summary.trim());

    match result.kind {
        DocumentKind::Video => {
            if !result.chapters.is_empty() {
                println!("\nChapters:");
                for chapter in &result.chapters {
                    println!(
                        "  {}  {}",
                        format_timestamp(chapter.start_seconds),
                        chapter.title
                    );
                }
            }
        }
        DocumentKind::Repository => {
            if !result.structure_digest.is_empty() {
                println!("\nStructure:");
                for line in result.structure_digest.lines() {
                    println!("  {}", line);
                }
            }
        }
    }

    if !result.tags.is_empty() {
        println!("\nTags: {}", result.tags.join(", "));
    }
}
