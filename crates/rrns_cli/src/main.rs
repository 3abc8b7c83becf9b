//! RRNS CLI
//!
//! Drives the residue codec and batch pipeline from the command line.
//!
//! # Usage
//! ```bash
//! # Post-encryption staging codec over a dataset file
//! rrns run --dataset data/distances.txt --mode post --chunk-size 1000
//!
//! # Pre-encryption residue homomorphism over synthetic samples
//! rrns run --synthetic 200 --mode pre --base-low 1 --base-high 20
//!
//! # Inspect a modulus base
//! rrns base --low 20 --high 80
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use rand::{Rng, SeedableRng};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use rrns_core::{
    read_dataset, select_primes, BatchPipeline, ClearService, DirStore, InsertionMode,
    MemoryStore, PipelineConfig, RnsBase, RunReport, StagingStore,
};

#[derive(Parser)]
#[command(name = "rrns")]
#[command(about = "Redundant-RNS staging codec for homomorphic encryption pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch pipeline over a dataset
    Run {
        /// Dataset file of whitespace-separated numeric samples
        #[arg(long, conflicts_with = "synthetic")]
        dataset: Option<PathBuf>,

        /// Generate this many synthetic samples instead of reading a file
        #[arg(long)]
        synthetic: Option<usize>,

        /// Seed for synthetic sample generation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Samples per chunk
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Where the residue codec sits relative to encryption
        #[arg(long, value_enum, default_value = "post")]
        mode: ModeChoice,

        /// Lower bound (inclusive) of the prime range for the base
        #[arg(long, default_value = "20")]
        base_low: u64,

        /// Upper bound (exclusive) of the prime range for the base
        #[arg(long, default_value = "80")]
        base_high: u64,

        /// Stage artifacts under this directory instead of in memory
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },

    /// Print the primes in a range and the dynamic range they span
    Base {
        #[arg(long, default_value = "20")]
        low: u64,

        #[arg(long, default_value = "80")]
        high: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeChoice {
    /// Encode samples into residues, then encrypt each residue
    Pre,
    /// Encrypt chunks, then encode the ciphertext bytes
    Post,
}

impl From<ModeChoice> for InsertionMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Pre => InsertionMode::PreEncryption,
            ModeChoice::Post => InsertionMode::PostEncryption,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            dataset,
            synthetic,
            seed,
            chunk_size,
            mode,
            base_low,
            base_high,
            staging_dir,
        } => run(
            dataset,
            synthetic,
            seed,
            chunk_size,
            mode.into(),
            base_low,
            base_high,
            staging_dir,
        ),
        Commands::Base { low, high } => show_base(low, high),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    dataset: Option<PathBuf>,
    synthetic: Option<usize>,
    seed: u64,
    chunk_size: usize,
    mode: InsertionMode,
    base_low: u64,
    base_high: u64,
    staging_dir: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let samples = match (dataset, synthetic) {
        (Some(path), _) => read_dataset(&path)?,
        (None, Some(count)) => synthesize(count, seed),
        (None, None) => return Err("provide --dataset <path> or --synthetic <n>".into()),
    };

    let base = RnsBase::from_range(base_low, base_high)?;
    println!(
        "base: {} moduli in [{base_low}, {base_high}), dynamic range {}",
        base.len(),
        base.product()
    );

    let config = PipelineConfig { chunk_size, mode };
    let service = ClearService::new();

    let report = match staging_dir {
        Some(dir) => {
            let store = DirStore::new(&dir)?;
            run_pipeline(config, base, service, store, &samples)?
        }
        None => run_pipeline(config, base, service, MemoryStore::new(), &samples)?,
    };

    print_report(&report);
    Ok(())
}

fn run_pipeline<T: StagingStore>(
    config: PipelineConfig,
    base: RnsBase,
    service: ClearService,
    store: T,
    samples: &[i64],
) -> Result<RunReport, Box<dyn Error>> {
    let mut pipeline = BatchPipeline::new(config, base, service, store);
    Ok(pipeline.run(samples)?)
}

fn synthesize(count: usize, seed: u64) -> Vec<i64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    // Stay below the default plaintext modulus so slot values are exact.
    (0..count).map(|_| rng.gen_range(0..65536)).collect()
}

fn print_report(report: &RunReport) {
    println!("mode:            {:?}", report.mode);
    println!("samples:         {}", report.samples);
    println!("chunks:          {}", report.chunks);
    println!("pairs:           {}", report.pairs);
    println!("verified pairs:  {}", report.verified_pairs);
    match report.truncated_chunk {
        Some(i) => println!("truncated:       chunk {i} left unpaired"),
        None => println!("truncated:       none"),
    }
}

fn show_base(low: u64, high: u64) -> Result<(), Box<dyn Error>> {
    let primes = select_primes(low, high);
    if primes.is_empty() {
        println!("no primes in [{low}, {high})");
        return Ok(());
    }

    println!("primes in [{low}, {high}): {primes:?}");
    let base = RnsBase::new(primes)?;
    println!("dynamic range: {}", base.product());
    Ok(())
}
