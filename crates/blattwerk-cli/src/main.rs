// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk — document-scanning session engine
//
// Entry point. Initialises logging, builds an editing session from the
// input documents, and runs the requested operation.

use std::path::{Path, PathBuf};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{SessionConfig, TableOutcome};
use blattwerk_session::{tables, EditorSession};
use blattwerk_vision::{GeminiVision, ScriptedVision, VisionService};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blattwerk", version, about = "Scan-session tooling: crop, OCR, table scan, PDF export")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble the input documents into a single PDF.
    Export {
        /// Input documents (PDF, JPEG, PNG, TIFF, WebP), in page order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Path of the assembled PDF.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Auto-crop every page with the vision service, then export.
    Autocrop {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// OCR every page and print the extracted text.
    Ocr {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Scan every page for a table and emit the results as CSV.
    Tables {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Combine the per-page tables into one CSV, aligning headers.
        #[arg(long)]
        merge: bool,
        /// Write CSV here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::default();

    match cli.command {
        Command::Export { inputs, output } => {
            // Export never calls the vision service; an empty scripted one
            // satisfies the session without needing an API key.
            let mut session = EditorSession::new(ScriptedVision::new(), config);
            ingest_all(&mut session, &inputs).await?;
            let bytes = session.export(&output).await?;
            println!("{} page(s), {} bytes -> {}", session.pages().len(), bytes, output.display());
        }
        Command::Autocrop { inputs, output } => {
            let mut session = EditorSession::new(gemini(&config)?, config);
            ingest_all(&mut session, &inputs).await?;
            let staged = session.auto_crop_all().await;
            let committed = session.commit_staged_crops();
            tracing::info!(staged, committed, "auto-crop finished");
            let bytes = session.export(&output).await?;
            println!(
                "{} of {} page(s) cropped, {} bytes -> {}",
                committed,
                session.pages().len(),
                bytes,
                output.display()
            );
        }
        Command::Ocr { inputs } => {
            let mut session = EditorSession::new(gemini(&config)?, config);
            ingest_all(&mut session, &inputs).await?;
            session.ocr_all_pages().await;
            for record in session.pages().iter() {
                println!("=== {} ===", record.label);
                match &record.extracted_text {
                    Some(text) => println!("{}", text),
                    None => println!("(no text)"),
                }
            }
        }
        Command::Tables { inputs, merge, output } => {
            let mut session = EditorSession::new(gemini(&config)?, config);
            ingest_all(&mut session, &inputs).await?;
            let reports = session.scan_all_tables().await;
            for report in &reports {
                let status = match &report.outcome {
                    TableOutcome::Table(_) => "table".to_string(),
                    TableOutcome::NoTable => "no table".to_string(),
                    TableOutcome::Failed(err) => format!("failed: {}", err),
                };
                eprintln!("page {} ({}): {}", report.page_index + 1, report.label, status);
            }
            let csv_out = if merge {
                tables::merge_table_csv(&reports)?
            } else {
                let pages = tables::per_page_tables(&reports);
                if pages.is_empty() {
                    None
                } else {
                    Some(
                        pages
                            .iter()
                            .map(|(_, csv)| csv.trim_end())
                            .collect::<Vec<_>>()
                            .join("\n\n"),
                    )
                }
            };
            match csv_out {
                Some(csv) => emit(&csv, output.as_deref()).await?,
                None => eprintln!("no tables found"),
            }
        }
    }

    Ok(())
}

/// Build the Gemini collaborator from `GEMINI_API_KEY`.
fn gemini(config: &SessionConfig) -> Result<GeminiVision> {
    let key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| BlattwerkError::Vision("GEMINI_API_KEY is not set".into()))?;
    GeminiVision::new(key, config)
}

/// Read and rasterize each input in order, appending its pages.
async fn ingest_all<V: VisionService>(
    session: &mut EditorSession<V>,
    inputs: &[PathBuf],
) -> Result<()> {
    for path in inputs {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let count = session.ingest(&name, bytes).await?;
        tracing::info!(path = %path.display(), pages = count, "ingested");
    }
    Ok(())
}

async fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, text).await?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
