use super::EngineError;
use super::candidate::{CellCandidate, RoundReport, round_awards};
use super::evaluator::CellCandidateEvaluator;
use super::params::EngineParams;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tracing::debug;

/// Time and round limits for one decision's search.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    start: Instant,
    deadline: Option<Instant>,
    max_rounds: usize,
}

impl Budget {
    pub fn timed(quota_ms: u64, max_rounds: usize) -> Self {
        let start = Instant::now();
        Self {
            start,
            deadline: Some(start + Duration::from_millis(quota_ms)),
            max_rounds,
        }
    }

    /// Round-count budget with no clock involvement.
    pub fn rounds(rounds: usize) -> Self {
        Self {
            start: Instant::now(),
            deadline: None,
            max_rounds: rounds,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn is_timed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Deadline for the next round. Until `target_rounds` are done, the time
    /// left is shared out among the rounds still wanted, `parallelism` at a
    /// time; afterwards rounds may run to the decision deadline.
    pub fn round_deadline(
        &self,
        rounds_done: usize,
        target_rounds: usize,
        parallelism: usize,
    ) -> Option<Instant> {
        let deadline = self.deadline?;
        if rounds_done >= target_rounds {
            return Some(deadline);
        }
        let now = Instant::now();
        let left = deadline.saturating_duration_since(now);
        let share = left.mul_f64(parallelism.max(1) as f64 / (target_rounds - rounds_done) as f64);
        Some((now + share).min(deadline))
    }
}

/// Canonical candidate statistics for one decision. Only the deciding
/// thread mutates it; workers contribute `RoundReport`s.
#[derive(Debug, Clone)]
pub struct MonteCarloSearch {
    candidates: Vec<CellCandidate>,
    params: EngineParams,
    rounds: usize,
    pruned: usize,
}

impl MonteCarloSearch {
    pub fn new(candidates: Vec<CellCandidate>, params: EngineParams) -> Self {
        Self {
            candidates,
            params,
            rounds: 0,
            pruned: 0,
        }
    }

    pub fn candidates(&self) -> &[CellCandidate] {
        &self.candidates
    }

    pub fn live_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn rounds_done(&self) -> usize {
        self.rounds
    }

    pub fn pruned_count(&self) -> usize {
        self.pruned
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Folds one round of scores, aligned with the live candidates.
    pub fn fold_round(&mut self, scores: &[i32]) {
        let mut report = RoundReport::for_candidates(&self.candidates);
        let awards = round_awards(scores, self.params.award(self.candidates.len()));
        report.record(scores, &awards);
        self.merge_report(&report);
    }

    /// Adds a worker's sums. Tallies for candidates already pruned are
    /// ignored.
    pub fn merge_report(&mut self, report: &RoundReport) {
        for candidate in &mut self.candidates {
            if let Some(tally) = report.tally(candidate.id()) {
                candidate.absorb(tally);
            }
        }
        self.rounds += report.rounds as usize;
    }

    /// Scales qualities so the leader sits at 1.0, then drops candidates that
    /// fell to `prune_epsilon` or below. The leader always survives. Returns
    /// how many were dropped.
    pub fn renormalize_and_prune(&mut self) -> usize {
        let Some(leader) = self
            .candidates
            .iter()
            .enumerate()
            .reduce(|best, next| if next.1.quality > best.1.quality { next } else { best })
            .map(|(idx, _)| idx)
        else {
            return 0;
        };
        let max = self.candidates[leader].quality;
        if max > 0.0 {
            for candidate in &mut self.candidates {
                candidate.quality /= max;
            }
        }

        let epsilon = self.params.prune_epsilon;
        let before = self.candidates.len();
        let mut dropped = Vec::new();
        let mut idx = 0;
        self.candidates.retain(|candidate| {
            let keep = idx == leader || candidate.quality > epsilon;
            idx += 1;
            if !keep {
                dropped.push(candidate.cell());
            }
            keep
        });
        let removed = before - self.candidates.len();
        if removed > 0 {
            self.pruned += removed;
            debug!(
                target: "squares_bot::search",
                rounds = self.rounds,
                removed,
                live = self.candidates.len(),
                dropped = ?dropped,
                "pruned candidates"
            );
        }
        removed
    }

    pub fn should_stop(&self, budget: &Budget) -> bool {
        self.candidates.len() <= 1 || self.rounds >= budget.max_rounds() || budget.expired()
    }

    /// Best average score, unless the quality leader trails it by no more than
    /// `winner_blend_margin`.
    pub fn select_winner(&self) -> Option<&CellCandidate> {
        let mut by_average: Option<&CellCandidate> = None;
        let mut by_quality: Option<&CellCandidate> = None;
        for candidate in &self.candidates {
            if by_average.is_none_or(|best| candidate.average_score > best.average_score) {
                by_average = Some(candidate);
            }
            if by_quality.is_none_or(|best| candidate.quality > best.quality) {
                by_quality = Some(candidate);
            }
        }
        match (by_average, by_quality) {
            (Some(avg), Some(qual))
                if avg.id() != qual.id()
                    && avg.average_score - qual.average_score <= self.params.winner_blend_margin =>
            {
                Some(qual)
            }
            (avg, _) => avg,
        }
    }

    /// Single-threaded search loop on one evaluator until the budget runs out
    /// or a single candidate is left.
    pub fn run_local(
        &mut self,
        evaluator: &mut CellCandidateEvaluator,
        budget: &Budget,
    ) -> Result<(), EngineError> {
        let stop = AtomicBool::new(false);
        while !self.should_stop(budget) {
            let round_deadline =
                budget.round_deadline(self.rounds, self.params.target_rounds, 1);
            let report = evaluator.run_job(&stop, 1, round_deadline)?;
            self.merge_report(&report);
            if self.renormalize_and_prune() > 0 {
                evaluator.sync_candidates(&self.candidates);
            }
        }
        debug!(
            target: "squares_bot::search",
            mode = "local",
            rounds = self.rounds,
            live = self.candidates.len(),
            pruned = self.pruned,
            elapsed_ms = budget.elapsed_ms(),
            "search finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Budget, MonteCarloSearch};
    use crate::bot::candidate::{CandidateTally, CellCandidate, RoundReport};
    use crate::bot::params::EngineParams;
    use squares_core::model::board::Cell;
    use std::time::{Duration, Instant};

    fn candidates(qualities: &[f64]) -> Vec<CellCandidate> {
        qualities
            .iter()
            .enumerate()
            .map(|(idx, q)| CellCandidate::new(Cell::new(0, idx), *q))
            .collect()
    }

    fn report(entries: &[(usize, i64, f64)], rounds: u64) -> RoundReport {
        RoundReport {
            tallies: entries
                .iter()
                .map(|(id, score_sum, award_sum)| CandidateTally {
                    id: *id,
                    score_sum: *score_sum,
                    award_sum: *award_sum,
                    rounds,
                })
                .collect(),
            rounds,
        }
    }

    #[test]
    fn fold_round_rewards_above_mean() {
        let mut search = MonteCarloSearch::new(candidates(&[1.0, 1.0, 1.0]), EngineParams::default());
        search.fold_round(&[30, 10, 20]);
        let award = EngineParams::default().award(3);
        let cans = search.candidates();
        assert!((cans[0].quality - (1.0 + award)).abs() < 1e-12);
        assert!((cans[1].quality - (1.0 - award)).abs() < 1e-12);
        assert!((cans[2].quality - 1.0).abs() < 1e-12);
        assert_eq!(cans[0].total_score, 30);
        assert_eq!(search.rounds_done(), 1);
    }

    #[test]
    fn merge_is_commutative() {
        let a = report(&[(0, 40, 0.2), (1, 10, -0.2), (2, 25, 0.0)], 2);
        let b = report(&[(0, 5, -0.1), (1, 50, 0.1), (2, 30, 0.0)], 3);
        let mut left = MonteCarloSearch::new(candidates(&[1.0, 0.9, 0.8]), EngineParams::default());
        let mut right = left.clone();
        left.merge_report(&a);
        left.merge_report(&b);
        right.merge_report(&b);
        right.merge_report(&a);
        for (l, r) in left.candidates().iter().zip(right.candidates()) {
            assert_eq!(l.total_score, r.total_score);
            assert_eq!(l.rounds, r.rounds);
            assert!((l.quality - r.quality).abs() < 1e-12);
        }
        assert_eq!(left.rounds_done(), right.rounds_done());
    }

    #[test]
    fn pruned_candidates_ignore_late_reports() {
        let mut search =
            MonteCarloSearch::new(candidates(&[1.0, 0.005, 0.5]), EngineParams::default());
        assert_eq!(search.renormalize_and_prune(), 1);
        assert_eq!(search.live_count(), 2);
        search.merge_report(&report(&[(1, 99, 5.0), (0, 1, 0.0)], 1));
        assert!(search.candidates().iter().all(|c| c.id() != 1));
        assert_eq!(search.candidates()[0].total_score, 1);
    }

    #[test]
    fn leader_survives_when_every_quality_is_negative() {
        let mut search =
            MonteCarloSearch::new(candidates(&[-2.0, -1.0, -3.0]), EngineParams::default());
        assert_eq!(search.renormalize_and_prune(), 2);
        assert_eq!(search.live_count(), 1);
        assert_eq!(search.candidates()[0].col, 1);
        assert!((search.candidates()[0].quality + 1.0).abs() < 1e-12);
    }

    #[test]
    fn winner_prefers_quality_leader_within_margin() {
        let mut cans = candidates(&[1.0, 0.6]);
        cans[0].average_score = 40.0;
        cans[1].average_score = 40.1;
        let search = MonteCarloSearch::new(cans.clone(), EngineParams::default());
        assert_eq!(search.select_winner().map(|c| c.col), Some(0));

        cans[1].average_score = 45.0;
        let search = MonteCarloSearch::new(cans, EngineParams::default());
        assert_eq!(search.select_winner().map(|c| c.col), Some(1));
    }

    #[test]
    fn stop_conditions() {
        let params = EngineParams::default();
        let search = MonteCarloSearch::new(candidates(&[1.0, 0.5]), params);
        assert!(!search.should_stop(&Budget::rounds(3)));
        assert!(search.should_stop(&Budget::rounds(0)));
        assert!(search.should_stop(&Budget::timed(0, 100)));
        let single = MonteCarloSearch::new(candidates(&[1.0]), params);
        assert!(single.should_stop(&Budget::rounds(3)));
    }

    #[test]
    fn round_deadline_shares_time_until_target() {
        let budget = Budget::timed(1_000, 100);
        let deadline = budget.deadline().expect("timed");
        let early = budget.round_deadline(0, 100, 4).expect("timed");
        assert!(early < deadline);
        assert!(early <= Instant::now() + Duration::from_millis(41));
        assert_eq!(budget.round_deadline(100, 100, 4), Some(deadline));
        assert_eq!(Budget::rounds(5).round_deadline(0, 100, 1), None);
    }
}
