use super::EngineError;
use super::candidate::{CellCandidate, RoundReport, round_awards};
use super::params::EngineParams;
use super::strategy::{Decision, Strategy};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use squares_core::model::board::{Board, Cell};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::points::PointSystem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branching {
    Sampled,
    Greedy,
    Top(usize),
    Exhaustive,
}

/// Runs shuffle rounds for one decision on a private copy of the game.
#[derive(Debug, Clone)]
pub struct CellCandidateEvaluator {
    board: Board,
    deck: DeckTracker,
    strategy: Strategy,
    points: PointSystem,
    params: EngineParams,
    rng: SmallRng,
    card: Option<Card>,
    candidates: Vec<CellCandidate>,
}

impl CellCandidateEvaluator {
    pub fn new(points: PointSystem, params: EngineParams) -> Self {
        Self {
            board: Board::new(),
            deck: DeckTracker::new(),
            strategy: Strategy::new(params),
            points,
            params,
            rng: SmallRng::seed_from_u64(0),
            card: None,
            candidates: Vec::new(),
        }
    }

    /// Copies the live game and the root candidates for a new decision.
    pub fn init(
        &mut self,
        board: &Board,
        deck: &DeckTracker,
        card: Card,
        candidates: &[CellCandidate],
        seed: u64,
    ) {
        self.board.copy_from(board);
        self.deck.copy_from(deck);
        self.card = Some(card);
        self.candidates.clear();
        self.candidates.extend_from_slice(candidates);
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Narrows the root candidates to those still alive in `live`.
    pub fn sync_candidates(&mut self, live: &[CellCandidate]) {
        self.candidates
            .retain(|c| live.iter().any(|other| other.id() == c.id()));
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn deck(&self) -> &DeckTracker {
        &self.deck
    }

    pub fn candidates(&self) -> &[CellCandidate] {
        &self.candidates
    }

    /// One Monte-Carlo trial: every root candidate is played out against the
    /// same random ordering of the undealt cards. Scores land in each
    /// candidate's `score`.
    pub fn shuffle_round(&mut self, round_deadline: Option<Instant>) -> Result<(), EngineError> {
        let card = self.card.ok_or(EngineError::NoCandidates)?;
        let future_len = self.board.number_of_empty_cells().saturating_sub(1);
        let mut future = self.deck.without(card).shuffled(&mut self.rng);
        future.truncate(future_len);

        self.deck.deal(card)?;
        for idx in 0..self.candidates.len() {
            let cell = self.candidates[idx].cell();
            self.board.put_card(card, cell.row, cell.col)?;
            let score = self.finish_play(&future, round_deadline);
            self.board.retract_last_play()?;
            self.candidates[idx].score = score?;
        }
        self.deck.put_back(card)?;
        Ok(())
    }

    /// Up to `rounds` shuffle rounds, stopping early when `stop` is raised.
    pub fn run_job(
        &mut self,
        stop: &AtomicBool,
        rounds: usize,
        round_deadline: Option<Instant>,
    ) -> Result<RoundReport, EngineError> {
        let mut report = RoundReport::for_candidates(&self.candidates);
        let award = self.params.award(self.candidates.len());
        let mut scores = Vec::with_capacity(self.candidates.len());
        for _ in 0..rounds {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            self.shuffle_round(round_deadline)?;
            scores.clear();
            scores.extend(self.candidates.iter().map(|c| c.score));
            let awards = round_awards(&scores, award);
            report.record(&scores, &awards);
        }
        Ok(report)
    }

    fn finish_play(
        &mut self,
        cards: &[Card],
        round_deadline: Option<Instant>,
    ) -> Result<i32, EngineError> {
        let Some((&card, rest)) = cards.split_first() else {
            return Ok(self.board.poker_hand_score(&self.points)?);
        };
        let decision = self
            .strategy
            .play(card, &mut self.board, &mut self.deck, &self.points)?;
        let candidates = match decision {
            Decision::Resolved(_) => {
                let score = self.finish_play(rest, round_deadline);
                self.retract()?;
                return score;
            }
            Decision::Undecided(candidates) => candidates,
        };

        match self.branching(cards.len(), &candidates, round_deadline) {
            Branching::Sampled => {
                let pick = self.rng.r#gen::<f64>();
                let idx = candidates
                    .partition_point(|c| c.probability < pick)
                    .min(candidates.len() - 1);
                self.finish_at(card, candidates[idx].cell(), rest, round_deadline)
            }
            Branching::Greedy => self.finish_at(card, candidates[0].cell(), rest, round_deadline),
            Branching::Top(keep) => {
                self.finish_candidates(card, &candidates[..keep], rest, round_deadline)
            }
            Branching::Exhaustive => {
                self.finish_candidates(card, &candidates, rest, round_deadline)
            }
        }
    }

    fn branching(
        &self,
        remaining: usize,
        candidates: &[CellCandidate],
        round_deadline: Option<Instant>,
    ) -> Branching {
        let params = &self.params;
        let late = round_deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if remaining >= params.sample_threshold || late {
            return Branching::Sampled;
        }
        if remaining < params.exhaustive_threshold {
            return Branching::Exhaustive;
        }
        if candidates[1].quality < params.clear_favourite_quality {
            return Branching::Greedy;
        }
        if remaining > params.exhaustive_threshold {
            return Branching::Top(2);
        }
        let cliff = candidates
            .iter()
            .skip(1)
            .position(|c| c.quality < params.clear_favourite_quality)
            .map_or(candidates.len(), |pos| pos + 1);
        Branching::Top(cliff.clamp(2, 4).min(candidates.len()))
    }

    fn finish_at(
        &mut self,
        card: Card,
        cell: Cell,
        rest: &[Card],
        round_deadline: Option<Instant>,
    ) -> Result<i32, EngineError> {
        self.place(card, cell)?;
        let score = self.finish_play(rest, round_deadline);
        self.retract()?;
        score
    }

    fn finish_candidates(
        &mut self,
        card: Card,
        candidates: &[CellCandidate],
        rest: &[Card],
        round_deadline: Option<Instant>,
    ) -> Result<i32, EngineError> {
        let mut best = i32::MIN;
        for candidate in candidates {
            let score = self.finish_at(card, candidate.cell(), rest, round_deadline)?;
            best = best.max(score);
        }
        Ok(best)
    }

    fn place(&mut self, card: Card, cell: Cell) -> Result<(), EngineError> {
        self.board.put_card(card, cell.row, cell.col)?;
        self.deck.deal(card)?;
        Ok(())
    }

    fn retract(&mut self) -> Result<(), EngineError> {
        let play = self.board.retract_last_play()?;
        self.deck.put_back(play.card)?;
        Ok(())
    }
}
