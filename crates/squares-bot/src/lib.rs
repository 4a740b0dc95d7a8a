pub mod bot;
pub mod policy;

pub use bot::{
    Budget, CellCandidate, CellCandidateEvaluator, Decision, EngineError, EngineParams,
    MonteCarloSearch, SquaresPlayer, Strategy, WorkerPool,
};
pub use policy::{HeuristicPolicy, MonteCarloPolicy, Policy};
