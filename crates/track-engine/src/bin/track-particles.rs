use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use track_core::{TrackError, TrackResult};
use track_engine::config::load_config;
use track_engine::session::TrackSession;
use track_engine::sort::{SortEngine, SortOptions};
use track_io::locator::{find_disordered_files, sorted_path, track_species};

#[derive(Parser)]
#[command(
    name = "track-particles",
    version,
    about = "Sort, select and export tracked particles"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List species tracked in every results directory.
    Species {
        #[arg(short, long, num_args = 1.., required = true)]
        results: Vec<PathBuf>,
    },
    /// Build the sorted store if it does not exist yet.
    Sort {
        #[arg(short, long, num_args = 1.., required = true)]
        results: Vec<PathBuf>,
        #[arg(short, long)]
        species: String,
        #[arg(long)]
        chunk: Option<usize>,
    },
    /// Print the session summary.
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the number of selected particles.
    Select {
        #[arg(short, long)]
        config: PathBuf,
        /// Also print the identity of every selected particle.
        #[arg(long)]
        ids: bool,
    },
    Export {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, value_enum)]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Vtk,
    Xdmf,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = run_cli() {
        return Err(err.to_string());
    }
    Ok(())
}

fn run_cli() -> TrackResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Species { results } => {
            for species in track_species(&results)? {
                println!("{species}");
            }
        }
        Command::Sort {
            results,
            species,
            chunk,
        } => {
            let first = results
                .first()
                .ok_or_else(|| TrackError::Argument("no results directory given".into()))?;
            let output = sorted_path(first, &species);
            let files = find_disordered_files(&results, &species)?;
            let mut options = SortOptions::default();
            if let Some(chunk) = chunk.filter(|&c| c > 0) {
                options.chunk_size = chunk;
            }
            let built = SortEngine::new(files, &species, options).ensure(&output)?;
            if !built {
                println!("{} already exists", output.display());
            } else {
                println!("{}", output.display());
            }
        }
        Command::Info { config } => {
            let session = TrackSession::open(&load_config(&config)?)?;
            println!("{}", session.info());
            println!("timesteps: {}", session.times().len());
        }
        Command::Select { config, ids } => {
            let mut session = TrackSession::open(&load_config(&config)?)?;
            println!("{}", session.n_selected());
            if ids {
                for id in session.selected_ids()? {
                    println!("{id}");
                }
            }
        }
        Command::Export { config, format } => {
            let mut session = TrackSession::open(&load_config(&config)?)?;
            let result = match format {
                ExportFormat::Vtk => session.to_vtk(),
                ExportFormat::Xdmf => session.to_xdmf(),
            };
            match result {
                Ok(path) => println!("{}", path.display()),
                Err(err) if err.is_recoverable() => warn!(%err, "export skipped"),
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}
