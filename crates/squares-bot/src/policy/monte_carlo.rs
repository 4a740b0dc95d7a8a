use super::Policy;
use crate::bot::{EngineError, EngineParams, SquaresPlayer};
use squares_core::model::board::{Board, Cell};
use squares_core::model::card::Card;
use squares_core::model::points::PointSystem;

/// Adapter exposing the full search player through the Policy trait
pub struct MonteCarloPolicy {
    name: String,
    player: SquaresPlayer,
}

impl MonteCarloPolicy {
    pub fn new(
        name: impl Into<String>,
        points: PointSystem,
        params: EngineParams,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            name: name.into(),
            player: SquaresPlayer::with_seed(points, params, seed)?,
        })
    }

    pub fn board(&self) -> &Board {
        self.player.board()
    }
}

impl Policy for MonteCarloPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.player.reset();
    }

    fn choose(&mut self, card: Card, millis_remaining: u64) -> Result<Cell, EngineError> {
        self.player.decide(card, millis_remaining)
    }
}
