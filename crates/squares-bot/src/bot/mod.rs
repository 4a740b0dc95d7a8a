mod candidate;
mod evaluator;
mod params;
mod player;
mod pool;
mod search;
mod strategy;

pub use candidate::{
    CandidateTally, CellCandidate, RoundReport, accumulate_probabilities, round_awards,
};
pub use evaluator::CellCandidateEvaluator;
pub use params::{AWARD_TABLE_LEN, EngineParams, Linear};
pub use player::SquaresPlayer;
pub use pool::WorkerPool;
pub use search::{Budget, MonteCarloSearch};
pub use strategy::{Decision, Strategy};

use squares_core::model::board::BoardError;
use squares_core::model::deck_tracker::DeckError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("board error: {0}")]
    Board(#[from] BoardError),
    #[error("deck error: {0}")]
    Deck(#[from] DeckError),
    #[error("worker {slot} failed: {message}")]
    WorkerFailed { slot: usize, message: String },
    #[error("no candidate cell available")]
    NoCandidates,
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}
