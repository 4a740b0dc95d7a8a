use super::EngineError;
use super::candidate::RoundReport;
use super::evaluator::CellCandidateEvaluator;
use super::params::EngineParams;
use super::search::{Budget, MonteCarloSearch};
use rand::RngCore;
use squares_core::model::board::Board;
use squares_core::model::card::Card;
use squares_core::model::deck_tracker::DeckTracker;
use squares_core::model::points::PointSystem;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct WorkerMessage {
    slot: usize,
    generation: u64,
    evaluator: Box<CellCandidateEvaluator>,
    result: Result<RoundReport, String>,
}

/// Fixed set of evaluators run on a dedicated rayon pool. Evaluators move
/// into jobs by value and come back through the completion channel.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    slots: Vec<Option<Box<CellCandidateEvaluator>>>,
    busy: Vec<bool>,
    stop: Arc<AtomicBool>,
    sender: Sender<WorkerMessage>,
    receiver: Receiver<WorkerMessage>,
    generation: u64,
    points: PointSystem,
    params: EngineParams,
    #[cfg(test)]
    panic_slot: Option<usize>,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        points: PointSystem,
        params: EngineParams,
    ) -> Result<Self, EngineError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("squares-worker-{idx}"))
            .build()
            .map_err(|err| EngineError::PoolBuild(err.to_string()))?;
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            pool,
            slots: (0..workers)
                .map(|_| Some(Box::new(CellCandidateEvaluator::new(points, params))))
                .collect(),
            busy: vec![false; workers],
            stop: Arc::new(AtomicBool::new(true)),
            sender,
            receiver,
            generation: 0,
            points,
            params,
            #[cfg(test)]
            panic_slot: None,
        })
    }

    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    /// Evaluators currently parked in the pool.
    pub fn idle_workers(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Runs `search` on every worker until its budget is spent, then stops the
    /// workers and waits a short grace period for jobs still in flight.
    pub fn run<R: RngCore>(
        &mut self,
        search: &mut MonteCarloSearch,
        board: &Board,
        deck: &DeckTracker,
        card: Card,
        budget: &Budget,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        self.generation += 1;
        self.stop = Arc::new(AtomicBool::new(false));
        self.busy.fill(false);
        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(Box::new(CellCandidateEvaluator::new(self.points, self.params)));
            }
        }

        for slot in 0..self.slots.len() {
            if let Some(evaluator) = self.slots[slot].as_mut() {
                evaluator.init(board, deck, card, search.candidates(), rng.next_u64());
            }
            self.submit(slot, search, budget);
        }

        let outcome = self.collect(search, budget);
        self.stop.store(true, Ordering::Relaxed);
        let drained = self.drain(search);
        outcome?;
        drained?;

        debug!(
            target: "squares_bot::search",
            mode = "parallel",
            workers = self.slots.len(),
            rounds = search.rounds_done(),
            live = search.live_count(),
            pruned = search.pruned_count(),
            elapsed_ms = budget.elapsed_ms(),
            "search finished"
        );
        Ok(())
    }

    fn submit(&mut self, slot: usize, search: &MonteCarloSearch, budget: &Budget) {
        let Some(mut evaluator) = self.slots[slot].take() else {
            return;
        };
        evaluator.sync_candidates(search.candidates());
        let parallelism = self.slots.len();
        let round_deadline = budget.round_deadline(
            search.rounds_done(),
            self.params.target_rounds,
            parallelism,
        );
        let rounds = self.params.rounds_per_job.max(1);
        let stop = Arc::clone(&self.stop);
        let sender = self.sender.clone();
        let generation = self.generation;
        #[cfg(test)]
        let crash = self.panic_slot == Some(slot);
        #[cfg(not(test))]
        let crash = false;
        self.busy[slot] = true;
        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                if crash {
                    panic!("evaluator {slot} crashed");
                }
                evaluator.run_job(&stop, rounds, round_deadline)
            }));
            let result = match outcome {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(err)) => Err(err.to_string()),
                Err(payload) => Err(panic_message(payload)),
            };
            let _ = sender.send(WorkerMessage {
                slot,
                generation,
                evaluator,
                result,
            });
        });
    }

    fn in_flight(&self) -> usize {
        self.busy.iter().filter(|busy| **busy).count()
    }

    fn collect(&mut self, search: &mut MonteCarloSearch, budget: &Budget) -> Result<(), EngineError> {
        while !search.should_stop(budget) {
            let wait = budget.remaining().unwrap_or(Duration::from_secs(60));
            let message = match self.receiver.recv_timeout(wait) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let Some((slot, report)) = self.accept(message)? else {
                continue;
            };
            search.merge_report(&report);
            search.renormalize_and_prune();
            if !search.should_stop(budget) {
                self.submit(slot, search, budget);
            }
        }
        Ok(())
    }

    fn drain(&mut self, search: &mut MonteCarloSearch) -> Result<(), EngineError> {
        let grace_end = Instant::now() + Duration::from_millis(self.params.drain_grace_ms);
        let mut failure = None;
        while self.in_flight() > 0 {
            let wait = grace_end.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                break;
            }
            match self.receiver.recv_timeout(wait) {
                Ok(message) => match self.accept(message) {
                    Ok(Some((_, report))) => search.merge_report(&report),
                    Ok(None) => {}
                    Err(err) => failure = failure.or(Some(err)),
                },
                Err(_) => break,
            }
        }
        if search.rounds_done() > 0 {
            search.renormalize_and_prune();
        }

        let abandoned = self.in_flight();
        if abandoned > 0 {
            warn!(
                target: "squares_bot::pool",
                generation = self.generation,
                abandoned,
                "worker jobs abandoned after grace period"
            );
        }
        failure.map_or(Ok(()), Err)
    }

    /// Houses the returning evaluator and hands back its report when it
    /// belongs to the current decision.
    fn accept(
        &mut self,
        message: WorkerMessage,
    ) -> Result<Option<(usize, RoundReport)>, EngineError> {
        let WorkerMessage {
            slot,
            generation,
            evaluator,
            result,
        } = message;
        if generation != self.generation {
            if self.slots[slot].is_none() && !self.busy[slot] {
                self.slots[slot] = Some(evaluator);
            }
            debug!(
                target: "squares_bot::pool",
                slot,
                generation,
                current = self.generation,
                "stale worker result discarded"
            );
            return Ok(None);
        }
        self.busy[slot] = false;
        self.slots[slot] = Some(evaluator);
        match result {
            Ok(report) => {
                debug!(
                    target: "squares_bot::pool",
                    slot,
                    rounds = report.rounds,
                    "worker job finished"
                );
                Ok(Some((slot, report)))
            }
            Err(message) => Err(EngineError::WorkerFailed { slot, message }),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "worker panicked".to_string()
}
