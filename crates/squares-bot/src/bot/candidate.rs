use squares_core::model::board::Cell;

/// A placement under consideration for the incoming card, together with the
/// statistics the search accumulates for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CellCandidate {
    pub row: usize,
    pub col: usize,
    pub quality: f64,
    /// Cumulative share of quality up to and including this candidate.
    pub probability: f64,
    /// Terminal score of the most recent rollout.
    pub score: i32,
    pub total_score: i64,
    pub average_score: f64,
    pub rounds: u64,
}

impl CellCandidate {
    pub fn new(cell: Cell, quality: f64) -> Self {
        Self {
            row: cell.row,
            col: cell.col,
            quality,
            probability: 0.0,
            score: 0,
            total_score: 0,
            average_score: 0.0,
            rounds: 0,
        }
    }

    pub const fn cell(&self) -> Cell {
        Cell::new(self.row, self.col)
    }

    pub const fn id(&self) -> usize {
        self.cell().id()
    }

    pub(crate) fn absorb(&mut self, tally: &CandidateTally) {
        self.total_score += tally.score_sum;
        self.quality += tally.award_sum;
        self.rounds += tally.rounds;
        if self.rounds > 0 {
            self.average_score = self.total_score as f64 / self.rounds as f64;
        }
    }
}

/// Fills in the cumulative probability field from the current qualities.
pub fn accumulate_probabilities(candidates: &mut [CellCandidate]) {
    let total: f64 = candidates.iter().map(|c| c.quality.max(0.0)).sum();
    let count = candidates.len();
    let mut running = 0.0;
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        running += candidate.quality.max(0.0);
        candidate.probability = if total > 0.0 {
            running / total
        } else {
            (idx + 1) as f64 / count as f64
        };
    }
    if let Some(last) = candidates.last_mut() {
        last.probability = 1.0;
    }
}

/// Quality awards for one round: `+award` above the round mean, `-award`
/// below it, nothing when the round did not separate the candidates.
pub fn round_awards(scores: &[i32], award: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().copied().min().unwrap_or(0);
    let max = scores.iter().copied().max().unwrap_or(0);
    if f64::from(max - min) <= 1e-6 {
        return vec![0.0; scores.len()];
    }
    let mean = scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
    scores
        .iter()
        .map(|score| {
            let score = f64::from(*score);
            if score > mean {
                award
            } else if score < mean {
                -award
            } else {
                0.0
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateTally {
    pub id: usize,
    pub score_sum: i64,
    pub award_sum: f64,
    pub rounds: u64,
}

/// Per-candidate sums produced by one worker job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    pub tallies: Vec<CandidateTally>,
    pub rounds: u64,
}

impl RoundReport {
    pub fn for_candidates(candidates: &[CellCandidate]) -> Self {
        Self {
            tallies: candidates
                .iter()
                .map(|c| CandidateTally {
                    id: c.id(),
                    score_sum: 0,
                    award_sum: 0.0,
                    rounds: 0,
                })
                .collect(),
            rounds: 0,
        }
    }

    /// Adds one round of scores and awards, aligned with the tallies.
    pub fn record(&mut self, scores: &[i32], awards: &[f64]) {
        for ((tally, score), award) in self.tallies.iter_mut().zip(scores).zip(awards) {
            tally.score_sum += i64::from(*score);
            tally.award_sum += award;
            tally.rounds += 1;
        }
        self.rounds += 1;
    }

    pub fn tally(&self, id: usize) -> Option<&CandidateTally> {
        self.tallies.iter().find(|tally| tally.id == id)
    }
}
