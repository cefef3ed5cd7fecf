//! Headless match runner for agent testing and tournaments.
//!
//! This crate drives the Domination engine without any graphics:
//!
//! - **Single matches**: play one match and hand the result to a ranking
//!   sink ([`match_runner`])
//! - **Batches**: run many seeded matches in parallel and summarize wins,
//!   draws and agent faults ([`batch`])
//! - **Demo agents**: `noop`, `random` and `capture` ([`agents`])
//!
//! # Example
//!
//! ```bash
//! # One match on a generated field, saving the replay
//! cargo run -p domination_headless -- run --red capture --blue random --replay match.replay
//!
//! # 200 matches, results as JSON
//! cargo run -p domination_headless -- batch --red capture --blue random --count 200
//!
//! # Verify a replay reproduces its recorded final hash
//! cargo run -p domination_headless -- replay --file match.replay --verify
//! ```

pub mod agents;
pub mod batch;
pub mod error;
pub mod match_runner;

pub use batch::{run_batch, BatchConfig, BatchResults, BatchSummary};
pub use error::{MatchError, Result};
pub use match_runner::{
    run_match, InMemorySink, MatchConfig, MatchResult, RankingSink, Standing, Winner,
};
