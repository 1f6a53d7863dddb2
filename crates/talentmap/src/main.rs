//! TalentMap CLI: a thin driver over the pipeline facade.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use talentmap::{render, Pipeline};
use talentmap_logging::{init_logging, LogConfig};
use talentmap_protocol::{Config, Mapping, OutputFormat};

#[derive(Parser)]
#[command(name = "talentmap", about = "Map HR exports onto target entity schemas", version)]
struct Cli {
    /// Mirror the log file's verbosity on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a file and show what the ingestor learned about it.
    Ingest {
        file: PathBuf,
    },
    /// Guess which target entity a file describes.
    Detect {
        file: PathBuf,
        /// Emit the detection result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Auto-map a file's columns onto an entity schema.
    Map {
        file: PathBuf,
        /// Target entity (employee, candidate, position). Detected when omitted.
        #[arg(long)]
        entity: Option<String>,
        /// Emit the resolution report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate a file against an entity using auto-mapped columns.
    Validate {
        file: PathBuf,
        #[arg(long)]
        entity: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Transform a file into the target CSV or XML artifact.
    Transform {
        file: PathBuf,
        #[arg(long)]
        entity: Option<String>,
        /// Output format: csv or xml.
        #[arg(long, default_value = "csv")]
        format: String,
        /// Destination path; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(LogConfig {
        app_name: "talentmap",
        verbose: cli.verbose,
    }) {
        eprintln!("warning: logging unavailable: {err:#}");
    }

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let pipeline = Pipeline::new(Config::from_env())?;

    match cli.command {
        Command::Ingest { file } => {
            let (_, metadata) = ingest_file(&pipeline, &file)?;
            println!("{}", render::render_metadata(&metadata));
        }
        Command::Detect { file, json } => {
            let (file_id, _) = ingest_file(&pipeline, &file)?;
            let detection = pipeline.detect_entity(&file_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detection)?);
            } else {
                println!("{}", render::render_detection(&detection));
            }
        }
        Command::Map { file, entity, json } => {
            let (file_id, _) = ingest_file(&pipeline, &file)?;
            let entity = resolve_entity(&pipeline, &file_id, entity)?;
            let report = pipeline.auto_map(&file_id, &entity)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", render::render_resolution(&report));
            }
        }
        Command::Validate { file, entity, json } => {
            let (file_id, _) = ingest_file(&pipeline, &file)?;
            let entity = resolve_entity(&pipeline, &file_id, entity)?;
            let mappings = auto_mappings(&pipeline, &file_id, &entity)?;
            let report = pipeline.validate(&file_id, &entity, &mappings)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", render::render_validation(&report));
            }
            if !report.is_valid {
                std::process::exit(1);
            }
        }
        Command::Transform {
            file,
            entity,
            format,
            output,
        } => {
            let format = OutputFormat::from_str(&format).map_err(anyhow::Error::msg)?;
            let (file_id, _) = ingest_file(&pipeline, &file)?;
            let entity = resolve_entity(&pipeline, &file_id, entity)?;
            let mappings = auto_mappings(&pipeline, &file_id, &entity)?;
            let bytes = pipeline.transform(&file_id, &entity, &mappings, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
    }
    Ok(())
}

fn ingest_file(
    pipeline: &Pipeline,
    path: &Path,
) -> Result<(talentmap_protocol::FileId, talentmap_protocol::ParseMetadata)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(pipeline.ingest(&bytes, &filename)?)
}

/// Use the given entity, or fall back to detection.
fn resolve_entity(
    pipeline: &Pipeline,
    file_id: &talentmap_protocol::FileId,
    entity: Option<String>,
) -> Result<String> {
    match entity {
        Some(name) => Ok(name),
        None => {
            let detection = pipeline.detect_entity(file_id)?;
            eprintln!(
                "no --entity given; detected {} (confidence {:.3})",
                detection.entity, detection.confidence
            );
            Ok(detection.entity)
        }
    }
}

fn auto_mappings(
    pipeline: &Pipeline,
    file_id: &talentmap_protocol::FileId,
    entity: &str,
) -> Result<Vec<Mapping>> {
    Ok(pipeline.auto_map(file_id, entity)?.mappings)
}
