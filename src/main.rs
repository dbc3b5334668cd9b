use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use midiprep::config::{AppConfig, FailurePolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "midiprep",
    version,
    about = "Turn a MIDI corpus into windowed feature tables and per-song PCA vectors"
)]
struct Cli {
    /// Config file (defaults to ~/.config/midiprep/config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base data directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Number of parallel workers (0 = auto-detect from config)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    jobs: usize,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract feature tables, then reduce them (default)
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        #[command(flatten)]
        reduce: ReduceArgs,
    },

    /// Extract one feature table per MIDI file
    Extract {
        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Reduce existing feature tables into the combined PCA table
    Reduce {
        #[command(flatten)]
        reduce: ReduceArgs,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(clap::Args, Default)]
struct ExtractArgs {
    /// Window size in MIDI ticks
    #[arg(long)]
    tick_window: Option<u64>,
}

#[derive(clap::Args, Default)]
struct ReduceArgs {
    /// Principal components kept per song
    #[arg(long)]
    components: Option<usize>,

    /// Feature columns kept per component
    #[arg(long)]
    column_cap: Option<usize>,

    /// What to do with a table that can't be reduced
    #[arg(long, value_enum)]
    on_error: Option<FailurePolicy>,
}

impl ExtractArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(w) = self.tick_window {
            config.extract.tick_window = w;
        }
    }
}

impl ReduceArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.components {
            config.reduce.components = n;
        }
        if let Some(n) = self.column_cap {
            config.reduce.column_cap = n;
        }
        if let Some(policy) = self.on_error {
            config.reduce.on_error = policy;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Explicit config file must load; the default location falls back to defaults
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path).context("Failed to load config")?,
        None => AppConfig::load(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if cli.jobs > 0 {
        config.workers = cli.jobs;
    }

    let command = cli.command.unwrap_or(Commands::Run {
        extract: ExtractArgs::default(),
        reduce: ReduceArgs::default(),
    });

    match command {
        Commands::Run { extract, reduce } => {
            extract.apply(&mut config);
            reduce.apply(&mut config);
            config.validate()?;
            run_extract(&config)?;
            run_reduce(&config)?;
        }

        Commands::Extract { extract } => {
            extract.apply(&mut config);
            config.validate()?;
            run_extract(&config)?;
        }

        Commands::Reduce { reduce } => {
            reduce.apply(&mut config);
            config.validate()?;
            run_reduce(&config)?;
        }

        Commands::ShowConfig => {
            let text = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", text);
        }
    }

    Ok(())
}

fn run_extract(config: &AppConfig) -> Result<()> {
    let midi_dir = config.midi_dir();
    let out_dir = config.representations_dir();
    log::info!("MIDI input: {}", midi_dir.display());
    log::info!("Feature tables: {}", out_dir.display());

    let result = midiprep::extractor::extract_directory(
        &midi_dir,
        &out_dir,
        &config.extract,
        config.resolve_workers(),
    )
    .context("Extraction failed")?;
    println!(
        "Extraction complete: {} songs extracted ({} windows), {} failed",
        result.extracted, result.windows, result.failed
    );
    Ok(())
}

fn run_reduce(config: &AppConfig) -> Result<()> {
    let tables_dir = config.representations_dir();
    let output = config.output_path();
    log::info!("Combined output: {}", output.display());

    let result = midiprep::reducer::reduce_directory(
        &tables_dir,
        &output,
        &config.reduce,
        config.resolve_workers(),
    )
    .context("Reduction failed")?;
    println!(
        "Reduction complete: {} songs reduced to {}-value vectors, {} failed",
        result.reduced, result.vector_len, result.failed
    );
    Ok(())
}
