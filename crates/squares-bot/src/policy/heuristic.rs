use super::Policy;
use crate::bot::{Decision, EngineError, EngineParams, Strategy};
use squares_core::model::board::{Board, Cell};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::points::PointSystem;
use tracing::{Level, event};

/// Rules-only agent: takes the forced cell or the best-quality candidate
/// without any simulation.
pub struct HeuristicPolicy {
    name: String,
    board: Board,
    deck: DeckTracker,
    strategy: Strategy,
    points: PointSystem,
}

impl HeuristicPolicy {
    pub fn new(name: impl Into<String>, points: PointSystem, params: EngineParams) -> Self {
        Self {
            name: name.into(),
            board: Board::new(),
            deck: DeckTracker::new(),
            strategy: Strategy::new(params),
            points,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }
}

impl Policy for HeuristicPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.board.clear();
        self.deck.clear();
    }

    fn choose(&mut self, card: Card, _millis_remaining: u64) -> Result<Cell, EngineError> {
        let decision = self
            .strategy
            .play(card, &mut self.board, &mut self.deck, &self.points)?;
        let (cell, candidates) = match decision {
            Decision::Resolved(cell) => (cell, 1),
            Decision::Undecided(candidates) => {
                let cell = candidates
                    .first()
                    .map(|c| c.cell())
                    .ok_or(EngineError::NoCandidates)?;
                self.board.put_card(card, cell.row, cell.col)?;
                self.deck.deal(card)?;
                (cell, candidates.len())
            }
        };
        log_choice(&self.name, card, cell, candidates);
        Ok(cell)
    }
}

fn log_choice(name: &str, card: Card, cell: Cell, candidates: usize) {
    if !tracing::enabled!(Level::INFO) {
        return;
    }
    event!(
        target: "squares_bot::decide",
        Level::INFO,
        agent = name,
        card = %card,
        row = cell.row,
        col = cell.col,
        candidates,
        forced = candidates == 1,
        reason = "heuristic",
    );
}

#[cfg(test)]
mod tests {
    use super::HeuristicPolicy;
    use crate::bot::EngineParams;
    use crate::policy::Policy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use squares_core::model::deck_tracker::DeckTracker;
    use squares_core::model::points::PointSystem;

    #[test]
    fn fills_the_board_in_twenty_five_moves() {
        let mut policy =
            HeuristicPolicy::new("rules", PointSystem::american(), EngineParams::default());
        let order = DeckTracker::new().shuffled(&mut StdRng::seed_from_u64(12));
        let mut cells = Vec::new();
        for card in order.into_iter().take(25) {
            let cell = policy.choose(card, 0).expect("choose");
            assert!(!cells.contains(&cell));
            cells.push(cell);
        }
        assert!(policy.board().is_full());
        policy.reset();
        assert!(policy.board().is_empty());
        assert_eq!(policy.name(), "rules");
    }
}
