use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;
use squares_bot::bot::{EngineError, EngineParams};
use squares_bot::policy::{HeuristicPolicy, MonteCarloPolicy, Policy};
use squares_core::model::board::{Board, BoardError, Cell, NUMBER_OF_CELLS};
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::hand::PokerHand;
use squares_core::model::points::PointSystem;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError};
use crate::config::{AgentConfig, AgentKind, AgentParams, BenchmarkConfig, ResolvedOutputs};
use crate::logging::TELEMETRY_FILE;

/// Referee for Poker Squares benchmarks: deals every agent the same cards,
/// checks each placement on its own board and scores the result.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    agents: Vec<AgentBlueprint>,
    points: PointSystem,
    logging_enabled: bool,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub games_played: usize,
    pub agents: usize,
    pub rows_written: usize,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub telemetry_path: Option<PathBuf>,
}

impl BenchmarkRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let base_seed = config.games.seed.unwrap_or(0);
        let agents = AgentBlueprint::from_configs(&config.agents, base_seed)?;

        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            points: config.points(),
            config,
            outputs,
            agents,
        })
    }

    /// Execute the benchmark, streaming JSONL rows to disk.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;

        let mut policies = self
            .agents
            .iter()
            .map(|agent| agent.spawn_policy(self.points))
            .collect::<Result<Vec<_>, _>>()?;

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut rng = StdRng::seed_from_u64(self.config.games.seed.unwrap_or(0));
        let mut rows_written = 0usize;
        let mut analytics = AnalyticsCollector::new(&self.config)?;

        for game_index in 0..self.config.games.count {
            let game_seed = rng.next_u64();
            let deal = deal_cards(game_seed);

            let mut results = Vec::with_capacity(policies.len());
            for (agent, policy) in self.agents.iter().zip(policies.iter_mut()) {
                results.push(self.play_game(game_index, agent, policy.as_mut(), &deal)?);
            }

            analytics.record_game(game_index, &results)?;
            rows_written +=
                write_game_rows(&mut writer, &self.config, game_index, game_seed, &deal, &results)?;
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;

        let telemetry_path = self
            .logging_enabled
            .then(|| self.outputs.telemetry_dir().join(TELEMETRY_FILE));

        Ok(RunSummary {
            games_played: self.config.games.count,
            agents: self.agents.len(),
            rows_written,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            telemetry_path,
        })
    }

    fn play_game(
        &self,
        game_index: usize,
        agent: &AgentBlueprint,
        policy: &mut dyn Policy,
        deal: &[Card],
    ) -> Result<GameResult, RunnerError> {
        policy.reset();
        let mut board = Board::new();
        let mut clock = GameClock::new(self.config.games.time_budget_ms);

        for &card in deal {
            let start = Instant::now();
            let cell = policy
                .choose(card, clock.remaining_ms())
                .map_err(|source| RunnerError::Agent {
                    name: agent.name.clone(),
                    source,
                })?;
            let elapsed_ms = clock.record(start.elapsed());

            board
                .put_card(card, cell.row, cell.col)
                .map_err(|source| RunnerError::IllegalMove {
                    name: agent.name.clone(),
                    card,
                    cell,
                    source,
                })?;

            if self.logging_enabled && tracing::enabled!(Level::DEBUG) {
                event!(
                    target: "squares_bench::play",
                    Level::DEBUG,
                    run_id = %self.config.run_id,
                    game_index = game_index as u32,
                    agent = %agent.name,
                    card = %card,
                    row = cell.row,
                    col = cell.col,
                    elapsed_ms
                );
            }
        }

        let score = board.poker_hand_score(&self.points)?;
        let hands = board.line_hands().ok_or(BoardError::NotFull {
            cards: board.number_of_cards(),
        })?;
        let metrics = clock.finalize();

        if self.logging_enabled && tracing::enabled!(Level::INFO) {
            event!(
                target: "squares_bench::game",
                Level::INFO,
                run_id = %self.config.run_id,
                game_index = game_index as u32,
                agent = %agent.name,
                score,
                decisions = metrics.decisions,
                total_ms = metrics.total_ms,
                over_budget = metrics.over_budget
            );
        }

        Ok(GameResult {
            agent_name: agent.name.clone(),
            kind: agent.kind,
            score,
            hands,
            metrics,
        })
    }
}

/// The first 25 cards of a seeded shuffle: one game's worth.
pub fn deal_cards(seed: u64) -> Vec<Card> {
    let mut cards = DeckTracker::new().shuffled(&mut StdRng::seed_from_u64(seed));
    cards.truncate(NUMBER_OF_CELLS);
    cards
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_game_rows(
    writer: &mut BufWriter<File>,
    config: &BenchmarkConfig,
    game_index: usize,
    game_seed: u64,
    deal: &[Card],
    results: &[GameResult],
) -> Result<usize, RunnerError> {
    let game_id = format!("G{game_index:05}");
    let deal = deal
        .iter()
        .map(Card::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    let mut rows_written = 0usize;
    for result in results {
        let row = GameLogRow {
            run_id: &config.run_id,
            game_id: &game_id,
            game_index,
            game_seed,
            deal: &deal,
            agent: &result.agent_name,
            kind: result.kind,
            score: result.score,
            hands: &result.hands,
            decisions: result.metrics.decisions,
            ms_per_decision: result.metrics.avg_ms_per_decision,
            total_ms: result.metrics.total_ms,
            over_budget: result.metrics.over_budget,
        };

        serde_json::to_writer(&mut *writer, &row)?;
        writer.write_all(b"\n")?;
        rows_written += 1;
    }

    Ok(rows_written)
}

/// Wall clock one agent spends on one game.
struct GameClock {
    budget_ms: u64,
    total: Duration,
    decisions: u32,
}

impl GameClock {
    fn new(budget_ms: u64) -> Self {
        Self {
            budget_ms,
            total: Duration::ZERO,
            decisions: 0,
        }
    }

    fn remaining_ms(&self) -> u64 {
        self.budget_ms
            .saturating_sub(self.total.as_millis() as u64)
    }

    fn record(&mut self, duration: Duration) -> f64 {
        self.total += duration;
        self.decisions += 1;
        duration.as_secs_f64() * 1000.0
    }

    fn finalize(self) -> DecisionSummary {
        let total_ms = self.total.as_secs_f64() * 1000.0;
        let avg_ms_per_decision = if self.decisions == 0 {
            0.0
        } else {
            total_ms / f64::from(self.decisions)
        };

        DecisionSummary {
            decisions: self.decisions,
            avg_ms_per_decision,
            total_ms,
            over_budget: self.total > Duration::from_millis(self.budget_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionSummary {
    pub decisions: u32,
    pub avg_ms_per_decision: f64,
    pub total_ms: f64,
    /// The agent ran past the game clock. The score still counts.
    pub over_budget: bool,
}

#[derive(Debug, Clone)]
pub struct GameResult {
    pub agent_name: String,
    pub kind: AgentKind,
    pub score: i32,
    pub hands: [PokerHand; 10],
    pub metrics: DecisionSummary,
}

#[derive(Serialize)]
struct GameLogRow<'a> {
    run_id: &'a str,
    game_id: &'a str,
    game_index: usize,
    game_seed: u64,
    deal: &'a str,
    agent: &'a str,
    kind: AgentKind,
    score: i32,
    hands: &'a [PokerHand],
    decisions: u32,
    ms_per_decision: f64,
    total_ms: f64,
    over_budget: bool,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid params for agent '{name}': {message}")]
    AgentParams { name: String, message: String },
    #[error("agent '{name}' failed: {source}")]
    Agent {
        name: String,
        #[source]
        source: EngineError,
    },
    #[error("agent '{name}' placed {card} on {cell}: {source}")]
    IllegalMove {
        name: String,
        card: Card,
        cell: Cell,
        #[source]
        source: BoardError,
    },
    #[error("scoring failed: {0}")]
    Board(#[from] BoardError),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize log row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

struct AgentBlueprint {
    name: String,
    kind: AgentKind,
    params: EngineParams,
    seed: u64,
}

impl AgentBlueprint {
    fn from_configs(configs: &[AgentConfig], base_seed: u64) -> Result<Vec<Self>, RunnerError> {
        let defaults = EngineParams::from_env();
        configs
            .iter()
            .enumerate()
            .map(|(idx, config)| {
                Self::from_config(config, defaults, base_seed.wrapping_add(idx as u64))
            })
            .collect()
    }

    fn from_config(
        config: &AgentConfig,
        defaults: EngineParams,
        fallback_seed: u64,
    ) -> Result<Self, RunnerError> {
        let overrides =
            AgentParams::from_value(&config.params).map_err(|err| RunnerError::AgentParams {
                name: config.name.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            params: overrides.apply(defaults),
            seed: overrides.seed.unwrap_or(fallback_seed),
        })
    }

    fn spawn_policy(&self, points: PointSystem) -> Result<Box<dyn Policy>, RunnerError> {
        let policy: Box<dyn Policy> = match self.kind {
            AgentKind::Heuristic => {
                Box::new(HeuristicPolicy::new(self.name.clone(), points, self.params))
            }
            AgentKind::MonteCarlo => Box::new(
                MonteCarloPolicy::new(self.name.clone(), points, self.params, self.seed).map_err(
                    |source| RunnerError::Agent {
                        name: self.name.clone(),
                        source,
                    },
                )?,
            ),
        };
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::{GameClock, deal_cards};
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn deals_are_seeded_and_distinct() {
        let deal = deal_cards(42);
        assert_eq!(deal.len(), 25);
        assert_eq!(deal, deal_cards(42));
        assert_ne!(deal, deal_cards(43));
        let unique: HashSet<_> = deal.iter().map(|card| card.id()).collect();
        assert_eq!(unique.len(), 25);
    }

    #[test]
    fn clock_counts_down_and_flags_overruns() {
        let mut clock = GameClock::new(100);
        clock.record(Duration::from_millis(30));
        assert_eq!(clock.remaining_ms(), 70);
        clock.record(Duration::from_millis(90));
        assert_eq!(clock.remaining_ms(), 0);
        let summary = clock.finalize();
        assert_eq!(summary.decisions, 2);
        assert!(summary.over_budget);
        assert!((summary.avg_ms_per_decision - 60.0).abs() < 1e-9);
    }
}
