/// Straight line through two points, evaluated outside the segment as well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Linear {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn eval(&self, x: f64) -> f64 {
        if (self.x1 - self.x0).abs() < f64::EPSILON {
            return self.y0;
        }
        self.y0 + (x - self.x0) * (self.y1 - self.y0) / (self.x1 - self.x0)
    }
}

/// Number of entries in the per-candidate-count award table.
pub const AWARD_TABLE_LEN: usize = 26;

/// Tunable engine parameters for shortlisting, rollouts and time allocation.
///
/// Defaults are the values the player was tuned with under the American
/// point system. `from_env` applies `SQ_*` overrides on top of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    // === Shortlist ===
    /// Maximum candidates kept after scoring (default: 7)
    pub candidates_limit: usize,

    /// Candidates scoring further than this below the best are dropped (default: 10.0)
    pub max_quality_difference: f64,

    /// Lower end of the rescaled quality range before normalisation (default: 1.0)
    pub quality_low: f64,

    /// Upper end of the rescaled quality range; the best candidate maps here (default: 2.0)
    pub quality_high: f64,

    // === Monte-Carlo search ===
    /// Candidates at or below this renormalised quality are pruned (default: 0.01)
    pub prune_epsilon: f64,

    /// Per-round quality award indexed by live candidate count
    /// (default: 0.01 at two candidates down to 0.002 at seven and beyond)
    pub award_table: [f64; AWARD_TABLE_LEN],

    /// Rounds the adaptive round quota aims to complete (default: 300)
    pub target_rounds: usize,

    /// Hard cap on rounds per decision (default: 10000)
    pub max_rounds: usize,

    /// Fixed round count that replaces the clock entirely (default: None)
    pub deterministic_rounds: Option<usize>,

    /// Leader by quality wins over leader by average within this margin (default: 0.25)
    pub winner_blend_margin: f64,

    // === Rollouts ===
    /// Remaining cards at or above which rollouts sample one branch (default: 10)
    pub sample_threshold: usize,

    /// Remaining cards below which rollouts branch on every candidate (default: 6)
    pub exhaustive_threshold: usize,

    /// Runner-up quality below which the favourite is played greedily (default: 0.97)
    pub clear_favourite_quality: f64,

    // === Workers ===
    /// Worker count override; `None` uses cores - 1 (default: None)
    pub workers: Option<usize>,

    /// Shuffle rounds per submitted worker job (default: 1)
    pub rounds_per_job: usize,

    /// Time allowed for in-flight jobs to report after stopping (default: 20)
    pub drain_grace_ms: u64,

    /// Parallel search only runs with more empty cells than this (default: 5)
    pub parallel_min_empty_cells: usize,

    // === Time quota ===
    /// Milliseconds held back per empty cell (default: 50)
    pub contingency_per_empty_cell: i64,

    /// Constant added to the held-back time (default: -90)
    pub contingency_offset: i64,

    /// Share of spare time spent on a move, by empty cell count (default: (2, 1.0) to (15, 0.4))
    pub quota_line: Linear,
}

fn default_award_table() -> [f64; AWARD_TABLE_LEN] {
    let line = Linear::new(2.0, 0.01, 7.0, 0.002);
    core::array::from_fn(|count| line.eval(count as f64).clamp(0.002, 0.01))
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            candidates_limit: 7,
            max_quality_difference: 10.0,
            quality_low: 1.0,
            quality_high: 2.0,
            prune_epsilon: 0.01,
            award_table: default_award_table(),
            target_rounds: 300,
            max_rounds: 10_000,
            deterministic_rounds: None,
            winner_blend_margin: 0.25,
            sample_threshold: 10,
            exhaustive_threshold: 6,
            clear_favourite_quality: 0.97,
            workers: None,
            rounds_per_job: 1,
            drain_grace_ms: 20,
            parallel_min_empty_cells: 5,
            contingency_per_empty_cell: 50,
            contingency_offset: -90,
            quota_line: Linear::new(2.0, 1.0, 15.0, 0.4),
        }
    }
}

impl EngineParams {
    pub fn from_env() -> Self {
        Self::from_reader(|key| std::env::var(key).ok())
    }

    /// Same defaults with a fixed round count and a single thread.
    pub fn deterministic(rounds: usize) -> Self {
        Self {
            deterministic_rounds: Some(rounds.max(1)),
            workers: Some(0),
            ..Self::default()
        }
    }

    pub(crate) fn from_reader<F>(mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut usize_var = |key: &str, min: usize| {
            read(key)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|value| *value >= min)
        };
        let workers = usize_var("SQ_WORKERS", 0).or(defaults.workers);
        let candidates_limit =
            usize_var("SQ_CANDIDATES_LIMIT", 1).unwrap_or(defaults.candidates_limit);
        let target_rounds = usize_var("SQ_TARGET_ROUNDS", 1).unwrap_or(defaults.target_rounds);
        let max_rounds = usize_var("SQ_MAX_ROUNDS", 1).unwrap_or(defaults.max_rounds);
        let deterministic_rounds =
            usize_var("SQ_DETERMINISTIC_ROUNDS", 1).or(defaults.deterministic_rounds);
        let sample_threshold =
            usize_var("SQ_SAMPLE_THRESHOLD", 1).unwrap_or(defaults.sample_threshold);
        let exhaustive_threshold =
            usize_var("SQ_EXHAUSTIVE_THRESHOLD", 1).unwrap_or(defaults.exhaustive_threshold);

        let max_quality_difference = read("SQ_MAX_QUALITY_DIFFERENCE")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(defaults.max_quality_difference);

        Self {
            candidates_limit,
            max_quality_difference,
            target_rounds,
            max_rounds,
            deterministic_rounds,
            sample_threshold,
            exhaustive_threshold,
            workers,
            ..defaults
        }
    }

    pub fn award(&self, candidate_count: usize) -> f64 {
        self.award_table[candidate_count.min(AWARD_TABLE_LEN - 1)]
    }

    /// Milliseconds held back on a move with `empty_cells` cells left.
    pub fn contingency(&self, empty_cells: usize) -> i64 {
        self.contingency_per_empty_cell * empty_cells as i64 + self.contingency_offset
    }

    /// Milliseconds to spend on this move, or `None` when below the contingency.
    pub fn move_quota(&self, empty_cells: usize, millis_remaining: u64) -> Option<u64> {
        let spare = millis_remaining as i64 - self.contingency(empty_cells);
        if spare < 0 {
            return None;
        }
        let share = self.quota_line.eval(empty_cells as f64);
        Some(((spare as f64 * share).floor() as u64).max(1))
    }

    /// Worker threads to use when no explicit count is configured.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|cores| cores.get().saturating_sub(1))
                .unwrap_or(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineParams, Linear};
    use std::collections::HashMap;

    #[test]
    fn linear_passes_through_both_points() {
        let line = Linear::new(2.0, 1.0, 15.0, 0.4);
        assert!((line.eval(2.0) - 1.0).abs() < 1e-12);
        assert!((line.eval(15.0) - 0.4).abs() < 1e-12);
        assert!(line.eval(20.0) < 0.4);
    }

    #[test]
    fn awards_shrink_as_candidates_grow() {
        let params = EngineParams::default();
        assert!((params.award(2) - 0.01).abs() < 1e-12);
        assert!(params.award(3) > params.award(5));
        assert!((params.award(7) - 0.002).abs() < 1e-12);
        assert!((params.award(7) - params.award(100)).abs() < 1e-12);
    }

    #[test]
    fn quota_respects_contingency() {
        let params = EngineParams::default();
        assert_eq!(params.contingency(10), 410);
        assert_eq!(params.move_quota(10, 400), None);
        let quota = params.move_quota(2, 1_000).expect("quota");
        assert_eq!(quota, 990);
        let early = params.move_quota(24, 10_000).expect("quota");
        assert!(early < 10_000 - 1_110);
        assert_eq!(params.move_quota(2, 10), Some(1));
    }

    #[test]
    fn from_env_default_fallbacks() {
        let params = EngineParams::from_reader(|_| None);
        assert_eq!(params, EngineParams::default());
    }

    #[test]
    fn from_env_respects_overrides_and_rejects_garbage() {
        let mut vars = HashMap::new();
        vars.insert("SQ_WORKERS".to_string(), "3".to_string());
        vars.insert("SQ_CANDIDATES_LIMIT".to_string(), "0".to_string());
        vars.insert("SQ_MAX_QUALITY_DIFFERENCE".to_string(), "4.5".to_string());
        vars.insert("SQ_DETERMINISTIC_ROUNDS".to_string(), "40".to_string());
        vars.insert("SQ_SAMPLE_THRESHOLD".to_string(), "many".to_string());

        let params = EngineParams::from_reader(|key| vars.get(key).cloned());
        assert_eq!(params.workers, Some(3));
        assert_eq!(params.candidates_limit, 7);
        assert!((params.max_quality_difference - 4.5).abs() < f64::EPSILON);
        assert_eq!(params.deterministic_rounds, Some(40));
        assert_eq!(params.sample_threshold, 10);
    }
}
