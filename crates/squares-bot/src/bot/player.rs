use super::EngineError;
use super::candidate::CellCandidate;
use super::evaluator::CellCandidateEvaluator;
use super::params::EngineParams;
use super::pool::WorkerPool;
use super::search::{Budget, MonteCarloSearch};
use super::strategy::{Decision, Strategy};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use squares_core::model::board::{Board, Cell};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::points::PointSystem;
use std::time::Instant;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Forced,
    NoTime,
    Local,
    Parallel,
}

impl Resolution {
    const fn as_str(self) -> &'static str {
        match self {
            Resolution::Forced => "forced",
            Resolution::NoTime => "no_time",
            Resolution::Local => "local_search",
            Resolution::Parallel => "parallel_search",
        }
    }
}

/// Poker Squares player: owns the live board and deck and places one card
/// per `decide` call within the time it is given.
pub struct SquaresPlayer {
    board: Board,
    deck: DeckTracker,
    strategy: Strategy,
    evaluator: CellCandidateEvaluator,
    pool: Option<WorkerPool>,
    points: PointSystem,
    params: EngineParams,
    rng: StdRng,
}

impl SquaresPlayer {
    pub fn new(points: PointSystem, params: EngineParams) -> Result<Self, EngineError> {
        Self::with_rng(points, params, StdRng::from_entropy())
    }

    pub fn with_seed(
        points: PointSystem,
        params: EngineParams,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Self::with_rng(points, params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(points: PointSystem, params: EngineParams, rng: StdRng) -> Result<Self, EngineError> {
        let workers = params.resolved_workers();
        let pool = if workers >= 2 && params.deterministic_rounds.is_none() {
            Some(WorkerPool::new(workers, points, params)?)
        } else {
            None
        };
        Ok(Self {
            board: Board::new(),
            deck: DeckTracker::new(),
            strategy: Strategy::new(params),
            evaluator: CellCandidateEvaluator::new(points, params),
            pool,
            points,
            params,
            rng,
        })
    }

    pub fn reset(&mut self) {
        self.board.clear();
        self.deck.clear();
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn deck(&self) -> &DeckTracker {
        &self.deck
    }

    pub fn points(&self) -> &PointSystem {
        &self.points
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::workers)
    }

    /// Chooses a cell for `card`, places it on the player's own board and
    /// returns the cell.
    pub fn decide(&mut self, card: Card, millis_remaining: u64) -> Result<Cell, EngineError> {
        let started = Instant::now();
        let empty_cells = self.board.number_of_empty_cells();
        let decision = self
            .strategy
            .play(card, &mut self.board, &mut self.deck, &self.points)?;
        let candidates = match decision {
            Decision::Resolved(cell) => {
                log_decision(card, cell, 1, 0, started, Resolution::Forced);
                return Ok(cell);
            }
            Decision::Undecided(candidates) => candidates,
        };
        let candidate_count = candidates.len();

        let budget = match self.params.deterministic_rounds {
            Some(rounds) => Some(Budget::rounds(rounds)),
            None => self
                .params
                .move_quota(empty_cells, millis_remaining)
                .map(|quota| Budget::timed(quota, self.params.max_rounds)),
        };
        let (cell, rounds, resolution) = match budget {
            None => (top_cell(&candidates)?, 0, Resolution::NoTime),
            Some(budget) => self.search(card, candidates, &budget)?,
        };

        self.board.put_card(card, cell.row, cell.col)?;
        if let Err(err) = self.deck.deal(card) {
            self.board.retract_last_play()?;
            return Err(err.into());
        }
        log_decision(card, cell, candidate_count, rounds, started, resolution);
        Ok(cell)
    }

    fn search(
        &mut self,
        card: Card,
        candidates: Vec<CellCandidate>,
        budget: &Budget,
    ) -> Result<(Cell, usize, Resolution), EngineError> {
        let mut search = MonteCarloSearch::new(candidates, self.params);
        let parallel = budget.is_timed()
            && self.board.number_of_empty_cells() > self.params.parallel_min_empty_cells;
        let resolution = match self.pool.as_mut() {
            Some(pool) if parallel => {
                pool.run(&mut search, &self.board, &self.deck, card, budget, &mut self.rng)?;
                Resolution::Parallel
            }
            _ => {
                let seed = self.rng.next_u64();
                self.evaluator
                    .init(&self.board, &self.deck, card, search.candidates(), seed);
                search.run_local(&mut self.evaluator, budget)?;
                Resolution::Local
            }
        };
        let winner = search.select_winner().ok_or(EngineError::NoCandidates)?;
        Ok((winner.cell(), search.rounds_done(), resolution))
    }
}

fn top_cell(candidates: &[CellCandidate]) -> Result<Cell, EngineError> {
    candidates
        .first()
        .map(CellCandidate::cell)
        .ok_or(EngineError::NoCandidates)
}

fn log_decision(
    card: Card,
    cell: Cell,
    candidates: usize,
    rounds: usize,
    started: Instant,
    resolution: Resolution,
) {
    if !tracing::enabled!(Level::INFO) {
        return;
    }
    event!(
        target: "squares_bot::decide",
        Level::INFO,
        card = %card,
        row = cell.row,
        col = cell.col,
        candidates,
        rounds,
        elapsed_ms = started.elapsed().as_millis() as u64,
        forced = matches!(resolution, Resolution::Forced),
        reason = resolution.as_str(),
    );
}

#[cfg(test)]
mod tests {
    use super::SquaresPlayer;
    use crate::bot::params::EngineParams;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use squares_core::model::board::Cell;
    use squares_core::model::card::Card;
    use squares_core::model::deck_tracker::DeckTracker;
    use squares_core::model::points::PointSystem;

    #[test]
    fn ace_of_spades_opens_at_row_zero_column_three() {
        let mut player =
            SquaresPlayer::with_seed(PointSystem::american(), EngineParams::deterministic(5), 1)
                .expect("player");
        let cell = player.decide("AS".parse().expect("card"), 1_000).expect("decide");
        assert_eq!(cell, Cell::new(0, 3));
        assert_eq!(player.board().number_of_cards(), 1);
        assert_eq!(player.deck().len(), 51);
    }

    #[test]
    fn without_time_the_top_candidate_is_played() {
        let params = EngineParams {
            workers: Some(0),
            ..EngineParams::default()
        };
        let mut player =
            SquaresPlayer::with_seed(PointSystem::american(), params, 3).expect("player");
        let order = DeckTracker::new().shuffled(&mut StdRng::seed_from_u64(8));
        for card in order.into_iter().take(25) {
            player.decide(card, 0).expect("decide");
        }
        assert!(player.board().is_full());
        assert!(player.board().poker_hand_score(player.points()).is_ok());
    }

    #[test]
    fn reset_starts_a_new_game() {
        let mut player =
            SquaresPlayer::with_seed(PointSystem::british(), EngineParams::deterministic(2), 9)
                .expect("player");
        for card in Card::all().take(3) {
            player.decide(card, 1_000).expect("decide");
        }
        player.reset();
        assert!(player.board().is_empty());
        assert_eq!(player.deck().len(), 52);
        assert_eq!(player.workers(), 0);
    }
}
