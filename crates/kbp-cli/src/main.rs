//! KBP CLI - Command-line interface
//!
//! Usage:
//!   kbp label --schema <file> --kb <file> --cache <dir> --output <file>
//!   kbp schema <file>
//!   kbp inspect <file>

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kbp_core::{
    AppConfig, CachedSentenceSource, JsonKnowledgeBase, LoggingConfig, Nationalities, SlotKind, SlotSchema,
};
use kbp_extractor::{output, BatchRunner, EntityPipeline};

#[derive(Parser)]
#[command(name = "kbp")]
#[command(about = "Distant-supervision instance labeling for slot filling")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label the cached corpora of every knowledge-base entity
    Label {
        /// Slot schema file
        #[arg(long)]
        schema: PathBuf,
        /// Knowledge base JSON file
        #[arg(long)]
        kb: PathBuf,
        /// Sentence cache directory (repeatable)
        #[arg(long, required = true)]
        cache: Vec<PathBuf>,
        /// Instance line output file
        #[arg(long)]
        output: PathBuf,
        /// JSON report with statistics and failures
        #[arg(long)]
        report: Option<PathBuf>,
        /// Full instances as JSON lines
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Country/nationality table
        #[arg(long)]
        nationalities: Option<PathBuf>,
        /// Worker count (overrides the configuration)
        #[arg(long)]
        workers: Option<usize>,
        /// Bind temporal expressions to instances
        #[arg(long)]
        temporal: bool,
        /// Emit every candidate unlabeled
        #[arg(long)]
        query: bool,
    },
    /// Validate and summarize a slot schema
    Schema {
        /// Slot schema file
        path: PathBuf,
    },
    /// Print per-label counts of an instance file
    Inspect {
        /// Instance line file
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("kbp={0},kbp_core={0},kbp_extractor={0}", logging.level).into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Label {
            schema,
            kb,
            cache,
            output: output_path,
            report,
            jsonl,
            nationalities,
            workers,
            temporal,
            query,
        } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            config.temporal.enabled |= temporal;
            config.matching.query_mode |= query;

            let schema = SlotSchema::from_file(&schema)
                .with_context(|| format!("loading schema {}", schema.display()))?;
            let kb = JsonKnowledgeBase::from_file(&kb)
                .with_context(|| format!("loading knowledge base {}", kb.display()))?;

            let mut pipeline = EntityPipeline::new(schema, config)?;
            if let Some(path) = nationalities {
                let table = Nationalities::from_file(&path)
                    .with_context(|| format!("loading nationalities {}", path.display()))?;
                pipeline = pipeline.with_nationalities(table);
            }

            let runner = BatchRunner::new(
                Arc::new(pipeline),
                Arc::new(CachedSentenceSource::new(cache)),
                Arc::new(kb),
            );
            let stop = runner.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing entities already running");
                    stop.store(true, Ordering::SeqCst);
                }
            });

            let batch = runner.run_all().await;

            let written = output::write_lines(BufWriter::new(File::create(&output_path)?), &batch.instances)?;
            tracing::info!(path = %output_path.display(), lines = written, "Wrote instances");

            if let Some(path) = jsonl {
                output::write_jsonl(BufWriter::new(File::create(&path)?), &batch.instances)?;
            }
            if let Some(path) = report {
                let summary = serde_json::json!({
                    "processed": batch.processed,
                    "skipped": batch.skipped,
                    "not_submitted": batch.not_submitted,
                    "failures": batch.failures,
                    "stats": batch.stats,
                });
                serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &summary)?;
            }

            println!("{}", batch.stats.report());
            println!(
                "Processed: {} | Skipped: {} | Not submitted: {}",
                batch.processed, batch.skipped, batch.not_submitted
            );
        }
        Commands::Schema { path } => {
            let schema = SlotSchema::from_file(&path)?;
            println!("Slots: {}", schema.len());
            for slot in schema.slots() {
                let kind = match slot.kind {
                    SlotKind::Single => "single",
                    SlotKind::List => "list",
                };
                println!(
                    "  {:<45} {:<6} NE: {}",
                    slot.name,
                    kind,
                    slot.ne_labels.iter().cloned().collect::<Vec<_>>().join("/")
                );
            }
            println!(
                "Valid NE labels: {}",
                schema.valid_ne_labels().iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Commands::Inspect { path } => {
            let records = output::read_lines(BufReader::new(File::open(&path)?))?;
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for record in &records {
                *counts.entry(record.label.clone()).or_default() += 1;
            }
            println!("Records: {}", records.len());
            for (label, count) in counts {
                println!("  {:<45} {:>8}", label, count);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_label_arguments() {
        let cli = Cli::try_parse_from([
            "kbp", "label", "--schema", "slots.tab", "--kb", "kb.json", "--cache", "a", "--cache", "b",
            "--output", "out.txt", "--temporal",
        ])
        .unwrap();
        match cli.command {
            Commands::Label { cache, temporal, query, .. } => {
                assert_eq!(cache, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert!(temporal);
                assert!(!query);
            }
            _ => panic!("expected label command"),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\nworkers = 7").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.batch.workers, 7);
    }
}
