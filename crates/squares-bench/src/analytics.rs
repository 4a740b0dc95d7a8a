use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Serialize;
use squares_core::model::hand::PokerHand;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::config::{AgentKind, BenchmarkConfig};
use crate::runner::{DecisionSummary, GameResult};

const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("baseline agent '{0}' not present in benchmark results")]
    MissingBaseline(String),
    #[error("agent '{0}' defined in results but missing from configuration")]
    UnknownAgent(String),
    #[error("baseline '{0}' missing for game {1}")]
    MissingBaselineGame(String, String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub struct AnalyticsCollector {
    baseline: String,
    agents: HashMap<String, AgentAccumulator>,
    comparisons: HashMap<String, ComparisonAccumulator>,
    agent_order: Vec<String>,
    time_budget_ms: u64,
}

impl AnalyticsCollector {
    pub fn new(config: &BenchmarkConfig) -> Result<Self, AnalyticsError> {
        let baseline = config
            .metrics
            .baseline
            .clone()
            .ok_or_else(|| AnalyticsError::MissingBaseline("<unset>".into()))?;

        let mut agents = HashMap::new();
        let mut order = Vec::new();
        for agent in &config.agents {
            agents.insert(
                agent.name.clone(),
                AgentAccumulator::new(agent.name.clone(), agent.kind),
            );
            order.push(agent.name.clone());
        }

        Ok(Self {
            baseline,
            agents,
            comparisons: HashMap::new(),
            agent_order: order,
            time_budget_ms: config.games.time_budget_ms,
        })
    }

    pub fn record_game(
        &mut self,
        game_index: usize,
        results: &[GameResult],
    ) -> Result<(), AnalyticsError> {
        let game_id = format!("G{game_index:05}");

        let best_score = results.iter().map(|r| r.score).max().unwrap_or(0);

        let baseline_score = results
            .iter()
            .find(|r| r.agent_name == self.baseline)
            .map(|r| f64::from(r.score))
            .ok_or_else(|| {
                AnalyticsError::MissingBaselineGame(self.baseline.clone(), game_id.clone())
            })?;

        for result in results {
            let acc = self
                .agents
                .get_mut(&result.agent_name)
                .ok_or_else(|| AnalyticsError::UnknownAgent(result.agent_name.clone()))?;
            acc.record_game(result, result.score == best_score);
        }

        for result in results {
            if result.agent_name == self.baseline {
                continue;
            }
            self.comparisons
                .entry(result.agent_name.clone())
                .or_insert_with(ComparisonAccumulator::new)
                .record(f64::from(result.score) - baseline_score);
        }

        Ok(())
    }

    pub fn finalize(mut self) -> Result<AnalyticsSummary, AnalyticsError> {
        if !self.agents.contains_key(&self.baseline) {
            return Err(AnalyticsError::MissingBaseline(self.baseline));
        }

        let mut reports = Vec::new();
        for name in &self.agent_order {
            if let Some(acc) = self.agents.remove(name) {
                reports.push(acc.into_report());
            }
        }

        let comparisons = reports
            .iter()
            .map(|report| {
                let (p_value, sample_size) = if report.name == self.baseline {
                    (1.0, report.games)
                } else {
                    self.comparisons
                        .remove(&report.name)
                        .map_or((1.0, 0), ComparisonAccumulator::wilcoxon_signed_rank)
                };
                ComparisonReport {
                    agent: report.name.clone(),
                    p_value,
                    sample_size,
                }
            })
            .collect();

        Ok(AnalyticsSummary {
            baseline: self.baseline,
            agents: reports,
            comparisons,
            time_budget_ms: self.time_budget_ms,
        }
        .enrich())
    }
}

struct AgentAccumulator {
    name: String,
    kind: AgentKind,
    scores: Vec<f64>,
    wins: u32,
    over_budget: u32,
    hand_counts: [u32; PokerHand::COUNT],
    total_latency_ms: f64,
    total_decisions: u64,
}

impl AgentAccumulator {
    fn new(name: String, kind: AgentKind) -> Self {
        Self {
            name,
            kind,
            scores: Vec::new(),
            wins: 0,
            over_budget: 0,
            hand_counts: [0; PokerHand::COUNT],
            total_latency_ms: 0.0,
            total_decisions: 0,
        }
    }

    fn record_game(&mut self, result: &GameResult, is_winner: bool) {
        self.scores.push(f64::from(result.score));
        if is_winner {
            self.wins += 1;
        }
        for hand in &result.hands {
            self.hand_counts[hand.index()] += 1;
        }
        self.record_latency(&result.metrics);
    }

    fn record_latency(&mut self, metrics: &DecisionSummary) {
        if metrics.over_budget {
            self.over_budget += 1;
        }
        self.total_latency_ms += metrics.total_ms;
        self.total_decisions += u64::from(metrics.decisions);
    }

    fn into_report(self) -> AgentReport {
        let games = self.scores.len();
        let avg_score = if games == 0 {
            0.0
        } else {
            self.scores.iter().sum::<f64>() / games as f64
        };
        let best = self.scores.iter().copied().fold(f64::NAN, f64::max);
        let worst = self.scores.iter().copied().fold(f64::NAN, f64::min);

        let average_ms_per_decision = if self.total_decisions == 0 {
            0.0
        } else {
            self.total_latency_ms / self.total_decisions as f64
        };

        let hands_per_game = self.hand_counts.map(|count| {
            if games == 0 {
                0.0
            } else {
                f64::from(count) / games as f64
            }
        });

        AgentReport {
            name: self.name,
            kind: self.kind,
            games,
            avg_score,
            ci95: confidence_interval(&self.scores),
            best: if best.is_nan() { 0.0 } else { best },
            worst: if worst.is_nan() { 0.0 } else { worst },
            wins: self.wins as usize,
            over_budget_games: self.over_budget as usize,
            hands_per_game,
            average_ms_per_decision,
            delta_vs_baseline: 0.0,
        }
    }
}

#[derive(Clone)]
struct ComparisonAccumulator {
    diffs: Vec<f64>,
}

impl ComparisonAccumulator {
    fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    fn record(&mut self, diff: f64) {
        self.diffs.push(diff);
    }

    /// Two-sided Wilcoxon signed-rank test on the paired score differences,
    /// normal approximation with tie correction.
    fn wilcoxon_signed_rank(self) -> (f64, usize) {
        let mut paired: Vec<(f64, f64)> = self
            .diffs
            .into_iter()
            .filter(|d| d.abs() > f64::EPSILON)
            .map(|d| (d.abs(), d.signum()))
            .collect();
        let n = paired.len();
        if n == 0 {
            return (1.0, 0);
        }
        paired.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut w_plus = 0.0;
        let mut w_minus = 0.0;
        let mut tie_adjustment = 0.0;
        let mut i = 0;
        while i < n {
            let mut j = i;
            while j + 1 < n && (paired[j + 1].0 - paired[i].0).abs() < 1e-12 {
                j += 1;
            }
            let rank = (i + j + 2) as f64 / 2.0;
            for (_, sign) in &paired[i..=j] {
                if *sign > 0.0 {
                    w_plus += rank;
                } else {
                    w_minus += rank;
                }
            }
            if j > i {
                let c = (j - i + 1) as f64;
                tie_adjustment += (c.powi(3) - c) / 48.0;
            }
            i = j + 1;
        }

        let w = f64::min(w_plus, w_minus);
        let n_f = n as f64;
        let mean_w = n_f * (n_f + 1.0) / 4.0;
        let variance_w = n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 24.0 - tie_adjustment;
        if variance_w <= 0.0 {
            return (1.0, n);
        }

        let z = ((w - mean_w).abs() - 0.5) / variance_w.sqrt();
        let Ok(normal) = Normal::new(0.0, 1.0) else {
            return (1.0, n);
        };
        let p = 2.0 * (1.0 - normal.cdf(z));
        (p.clamp(0.0, 1.0), n)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub baseline: String,
    pub agents: Vec<AgentReport>,
    pub comparisons: Vec<ComparisonReport>,
    pub time_budget_ms: u64,
}

impl AnalyticsSummary {
    pub fn enrich(mut self) -> Self {
        let baseline_avg = self
            .agents
            .iter()
            .find(|agent| agent.name == self.baseline)
            .map(|agent| agent.avg_score)
            .unwrap_or(0.0);

        for agent in &mut self.agents {
            agent.delta_vs_baseline = agent.avg_score - baseline_avg;
        }

        self
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Poker Squares Benchmark Summary\n\n");
        let _ = writeln!(
            out,
            "Baseline: `{}`. Game clock: {} ms per agent.\n",
            self.baseline, self.time_budget_ms
        );
        out.push_str("| Agent | Kind | Games | Avg Score | Δ vs baseline | 95% CI | Best | Worst | Win % | Avg ms/decision | Over Budget | p-value |\n");
        out.push_str("|-------|------|-------|-----------|----------------|--------|------|-------|-------|------------------|-------------|---------|\n");

        for agent in &self.agents {
            let p_value = self
                .comparisons
                .iter()
                .find(|c| c.agent == agent.name)
                .map(|c| c.p_value)
                .unwrap_or(1.0);
            let win_rate = if agent.games == 0 {
                0.0
            } else {
                agent.wins as f64 / agent.games as f64
            };

            let _ = writeln!(
                out,
                "| {name} | {kind:?} | {games} | {avg:.2} | {delta:+.2} | [{ci_low:.2}, {ci_high:.2}] | {best:.0} | {worst:.0} | {win:.1}% | {latency:.2} | {over} | {pval:.3} |",
                name = agent.name,
                kind = agent.kind,
                games = agent.games,
                avg = agent.avg_score,
                delta = agent.delta_vs_baseline,
                ci_low = agent.ci95.0,
                ci_high = agent.ci95.1,
                best = agent.best,
                worst = agent.worst,
                win = win_rate * 100.0,
                latency = agent.average_ms_per_decision,
                over = agent.over_budget_games,
                pval = p_value,
            );
        }

        out.push_str("\n## Hands per game\n\n| Agent |");
        for hand in PokerHand::ALL {
            let _ = write!(out, " {} |", hand.name());
        }
        out.push_str("\n|-------|");
        out.push_str(&"------|".repeat(PokerHand::COUNT));
        out.push('\n');
        for agent in &self.agents {
            let _ = write!(out, "| {} |", agent.name);
            for value in agent.hands_per_game {
                let _ = write!(out, " {value:.2} |");
            }
            out.push('\n');
        }

        out
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        fs::write(path.as_ref(), self.render_markdown()).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub name: String,
    pub kind: AgentKind,
    pub games: usize,
    pub avg_score: f64,
    pub ci95: (f64, f64),
    pub best: f64,
    pub worst: f64,
    pub wins: usize,
    pub over_budget_games: usize,
    pub hands_per_game: [f64; PokerHand::COUNT],
    pub average_ms_per_decision: f64,
    #[serde(skip)]
    pub delta_vs_baseline: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub agent: String,
    pub p_value: f64,
    pub sample_size: usize,
}

fn confidence_interval(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    if samples.len() == 1 {
        return (mean, mean);
    }
    let variance = samples
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (samples.len() as f64 - 1.0);
    let std_error = (variance / samples.len() as f64).sqrt();
    let z = Normal::new(0.0, 1.0)
        .map(|normal| normal.inverse_cdf(0.5 + CONFIDENCE_LEVEL / 2.0))
        .unwrap_or(1.96);
    let margin = z * std_error;
    (mean - margin, mean + margin)
}

#[cfg(test)]
mod tests {
    use super::{ComparisonAccumulator, confidence_interval};

    #[test]
    fn interval_brackets_the_mean() {
        let (low, high) = confidence_interval(&[10.0, 20.0, 30.0, 40.0]);
        assert!(low < 25.0 && 25.0 < high);
        // s = 12.91, se = 6.455, z = 1.96
        assert!((high - 25.0 - 1.959964 * 6.454972).abs() < 1e-3);
        assert_eq!(confidence_interval(&[7.0]), (7.0, 7.0));
        assert_eq!(confidence_interval(&[]), (0.0, 0.0));
    }

    #[test]
    fn wilcoxon_separates_consistent_gains_from_noise() {
        let mut gains = ComparisonAccumulator::new();
        for diff in 1..=20 {
            gains.record(f64::from(diff));
        }
        let (p, n) = gains.wilcoxon_signed_rank();
        assert_eq!(n, 20);
        assert!(p < 0.01);

        let mut noise = ComparisonAccumulator::new();
        for diff in [3.0, -3.0, 5.0, -5.0, 2.0, -2.0, 0.0] {
            noise.record(diff);
        }
        let (p, n) = noise.wilcoxon_signed_rank();
        assert_eq!(n, 6);
        assert!(p > 0.5);
    }
}
