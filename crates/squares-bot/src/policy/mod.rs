mod heuristic;
mod monte_carlo;

pub use heuristic::HeuristicPolicy;
pub use monte_carlo::MonteCarloPolicy;

use crate::bot::EngineError;
use squares_core::model::board::Cell;
use squares_core::model::card::Card;

/// Unified interface for placement agents (rules only or full search)
pub trait Policy: Send {
    /// Label used in reports
    fn name(&self) -> &str;

    /// Forget the current game
    fn reset(&mut self);

    /// Place `card` and return the chosen cell
    fn choose(&mut self, card: Card, millis_remaining: u64) -> Result<Cell, EngineError>;
}
