//! Headless Domination match runner.
//!
//! # Usage
//!
//! ```bash
//! # One match on a generated field
//! cargo run -p domination_headless -- run --red capture --blue random --seed 7
//!
//! # One match on a hand-drawn field with RON settings, saving the replay
//! cargo run -p domination_headless -- run --field arena.txt --settings match.ron --replay out.replay
//!
//! # Batch of matches for agent comparison
//! cargo run -p domination_headless -- batch --red capture --blue random --count 500 --output results/
//!
//! # Play back a replay and check its final hash
//! cargo run -p domination_headless -- replay --file out.replay --verify
//!
//! # Generate a field and print it in the text format
//! cargo run -p domination_headless -- field --seed 3 --width 31 --height 20
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domination_core::field::Field;
use domination_core::field_generator::{generate, FieldGeneratorConfig};
use domination_core::replay::ReplayData;
use domination_core::settings::Settings;
use domination_core::simulation::Game;
use domination_headless::{
    agents,
    batch::{run_batch, verify_determinism, BatchConfig},
    match_runner::{play, run_match, MatchConfig},
    MatchError,
};

#[derive(Parser)]
#[command(name = "domination")]
#[command(about = "Headless Domination match runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single match
    Run {
        /// Red agent (noop, random, capture)
        #[arg(long, default_value = "capture")]
        red: String,

        /// Blue agent (noop, random, capture)
        #[arg(long, default_value = "random")]
        blue: String,

        /// Settings file (RON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Field file in the text format; generated when omitted
        #[arg(short, long)]
        field: Option<PathBuf>,

        /// Match seed (overrides the settings file)
        #[arg(long)]
        seed: Option<u64>,

        /// Step limit (overrides the settings file)
        #[arg(long)]
        steps: Option<u32>,

        /// Save a replay of the match
        #[arg(short, long)]
        replay: Option<PathBuf>,
    },

    /// Run a batch of matches in parallel
    Batch {
        /// Red agent
        #[arg(long, default_value = "capture")]
        red: String,

        /// Blue agent
        #[arg(long, default_value = "random")]
        blue: String,

        /// Number of matches
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel matches (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Seed of the first match
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Settings file (RON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Re-run the first match this many times and compare hashes
        #[arg(long)]
        verify_runs: Option<u32>,
    },

    /// Play back a recorded match
    Replay {
        /// Replay file path
        #[arg(short, long)]
        file: PathBuf,

        /// Fail unless the replay reproduces its recorded hash
        #[arg(long)]
        verify: bool,
    },

    /// Generate a field and print it
    Field {
        /// Generator seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Width in tiles (odd)
        #[arg(long, default_value = "39")]
        width: usize,

        /// Height in tiles
        #[arg(long, default_value = "24")]
        height: usize,

        /// Spawns per team
        #[arg(long, default_value = "5")]
        spawns: usize,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr (stdout is for results)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let outcome = match cli.command {
        Commands::Run {
            red,
            blue,
            settings,
            field,
            seed,
            steps,
            replay,
        } => cmd_run(&red, &blue, settings, field, seed, steps, replay),
        Commands::Batch {
            red,
            blue,
            count,
            parallel,
            output,
            seed,
            settings,
            verify_runs,
        } => cmd_batch(red, blue, count, parallel, output, seed, settings, verify_runs),
        Commands::Replay { file, verify } => cmd_replay(file, verify),
        Commands::Field {
            seed,
            width,
            height,
            spawns,
            output,
        } => cmd_field(seed, width, height, spawns, output),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "Command failed");
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings, MatchError> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

/// Run a single match
fn cmd_run(
    red: &str,
    blue: &str,
    settings: Option<PathBuf>,
    field: Option<PathBuf>,
    seed: Option<u64>,
    steps: Option<u32>,
    replay: Option<PathBuf>,
) -> Result<(), MatchError> {
    let mut settings = load_settings(settings)?;
    if let Some(seed) = seed {
        settings.seed = seed;
    }
    if let Some(steps) = steps {
        settings.max_steps = steps;
    }

    let mut config = MatchConfig::new(
        settings.clone(),
        agents::factory(red, settings.seed)?,
        agents::factory(blue, settings.seed.rotate_left(32))?,
    );
    if let Some(path) = field {
        let text = std::fs::read_to_string(&path).map_err(|e| MatchError::io(&path, e))?;
        config = config.with_field(Arc::new(Field::parse(&text, settings.tilesize)?));
    }
    if replay.is_some() {
        config = config.with_recording();
    }

    tracing::info!(red, blue, seed = settings.seed, "Starting match");
    let mut result = run_match(&config)?;

    if let (Some(path), Some(data)) = (replay, result.replay.take()) {
        data.save(&path)?;
        eprintln!("Replay saved to: {}", path.display());
    }

    eprintln!("{} vs {}: {:?} after {} steps", result.red, result.blue, result.winner, result.steps);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Run a batch of matches
fn cmd_batch(
    red: String,
    blue: String,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    settings: Option<PathBuf>,
    verify_runs: Option<u32>,
) -> Result<(), MatchError> {
    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        red = %red,
        blue = %blue,
        count = count,
        parallel = parallel,
        seed = seed,
        output = %output.display(),
        cpus_available = num_cpus,
        "Batch configuration"
    );

    std::fs::create_dir_all(&output).map_err(|e| MatchError::io(&output, e))?;

    let config = BatchConfig {
        red,
        blue,
        game_count: count,
        parallel_games: parallel,
        seed_start: seed,
        settings: load_settings(settings)?,
        output_dir: output.clone(),
    };

    if let Some(runs) = verify_runs {
        if verify_determinism(&config, 0, runs)? {
            eprintln!("PASS: All {runs} runs produced identical results");
        } else {
            eprintln!("FAIL: Non-determinism detected!");
            std::process::exit(1);
        }
    }

    let results = run_batch(config);
    let results_path = output.join("batch_results.json");
    results.save(&results_path)?;

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Matches played: {}", summary.games);
    if !results.errors.is_empty() {
        eprintln!("Matches FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "{} wins: {}, {} wins: {}, draws: {}",
        results.config.red, summary.red_wins, results.config.blue, summary.blue_wins, summary.draws
    );
    eprintln!("Mean score: {:.3}", summary.mean_score);
    eprintln!("Agent faults: red {}, blue {}", summary.red_errors, summary.blue_errors);

    for error in results.errors.iter().take(10) {
        eprintln!("  Match {} (seed {}): {}", error.game_index, error.seed, error.message);
    }
    if results.errors.len() > 10 {
        eprintln!("  ... and {} more failures", results.errors.len() - 10);
    }

    eprintln!("\nResults saved to: {}", results_path.display());
    Ok(())
}

/// Play back a recorded match
fn cmd_replay(file: PathBuf, verify: bool) -> Result<(), MatchError> {
    tracing::info!("Loading replay: {}", file.display());
    let replay = ReplayData::load(&file)?;

    eprintln!("Loaded replay:");
    eprintln!("  Teams: {} vs {}", replay.name_red, replay.name_blue);
    eprintln!("  Seed: {}", replay.settings.seed);
    eprintln!("  Duration: {} steps", replay.duration());

    let expected = replay.final_hash;
    let mut game = Game::from_replay(replay)?;
    let result = play(&mut game)?;

    eprintln!("Replay complete at step {}", result.steps);
    eprintln!("  Expected hash: {expected:016x}");
    eprintln!("  Actual hash:   {:016x}", result.state_hash);
    if verify {
        if result.state_hash == expected {
            eprintln!("PASS: Replay verification successful");
        } else {
            eprintln!("FAIL: Replay produced different hash!");
            std::process::exit(1);
        }
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Generate a field and print it
fn cmd_field(
    seed: u64,
    width: usize,
    height: usize,
    spawns: usize,
    output: Option<PathBuf>,
) -> Result<(), MatchError> {
    let config = FieldGeneratorConfig {
        width,
        height,
        num_spawns: spawns,
        ..FieldGeneratorConfig::default()
    }
    .with_seed(seed);
    let field = generate(&config)?;
    let text = field.to_string();

    match output {
        Some(path) => {
            std::fs::write(&path, &text).map_err(|e| MatchError::io(&path, e))?;
            eprintln!("Field saved to: {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
