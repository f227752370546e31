//! Command-line front end for lazy grid pipelines.
//!
//! - `lazygrid run` opens input files, applies a YAML/JSON recipe and
//!   writes the result
//! - `lazygrid inspect` prints what the engine reports about files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use grid_engine::CdoEngine;
use lazy_grid::{Dataset, Recipe, Session, SessionConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lazygrid")]
#[command(about = "Run operation recipes over gridded datasets")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a recipe to input files and write the result
    Run {
        /// Recipe file (.yaml, .yml or .json)
        #[arg(long)]
        recipe: PathBuf,

        /// Output file, or directory when the result has several files
        #[arg(short, long)]
        output: PathBuf,

        /// Run each step as soon as it is applied
        #[arg(long)]
        eager: bool,

        /// Process input files on a worker pool
        #[arg(long)]
        parallel: bool,

        /// Give every step its own engine call
        #[arg(long)]
        no_fuse: bool,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print variables, grid and time axis of files as JSON
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run {
            recipe,
            output,
            eager,
            parallel,
            no_fuse,
            inputs,
        } => {
            let mut config = SessionConfig::from_env();
            if eager {
                config.lazy = false;
            }
            if parallel {
                config.parallel = true;
            }
            if no_fuse {
                config.fuse = false;
            }
            let session = open_session(config)?;
            let result = run(&session, &recipe, &output, &inputs);
            session.cleanup();
            result
        }
        Command::Inspect { files } => {
            let session = open_session(SessionConfig::from_env())?;
            for file in &files {
                let info = session
                    .inspect(file)
                    .with_context(|| format!("Failed to inspect {}", file.display()))?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "path": file,
                        "info": info,
                    }))?
                );
            }
            Ok(())
        }
    }
}

fn open_session(config: SessionConfig) -> Result<Session> {
    let engine = Arc::new(CdoEngine::new(config.cdo_path.clone()));
    Ok(Session::new(config, engine)?)
}

fn run(session: &Session, recipe: &Path, output: &Path, inputs: &[PathBuf]) -> Result<()> {
    let recipe = Recipe::from_path(recipe)
        .with_context(|| format!("Failed to load recipe {}", recipe.display()))?;
    info!(steps = recipe.steps.len(), inputs = inputs.len(), "Applying recipe");

    let mut dataset = Dataset::open(session, inputs)?;
    dataset.apply_recipe(&recipe)?;
    dataset.run()?;

    for command in dataset.history() {
        info!(command = %command, "Executed");
    }

    let written = write_outputs(dataset.current(), output)?;
    info!(files = written.len(), output = %output.display(), "Wrote result");
    Ok(())
}

/// Copy result files out of the session's temp directory before they are
/// released: a single file to `output`, several into `output/part_<n>.nc`.
fn write_outputs(files: &[PathBuf], output: &Path) -> Result<Vec<PathBuf>> {
    let targets = match files {
        [] => bail!("Pipeline produced no files"),
        [_] => vec![output.to_path_buf()],
        _ => {
            std::fs::create_dir_all(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            (0..files.len())
                .map(|n| output.join(format!("part_{}.nc", n)))
                .collect()
        }
    };

    for (source, target) in files.iter().zip(&targets) {
        std::fs::copy(source, target).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), target.display())
        })?;
    }
    Ok(targets)
}
