pub mod chain;
pub mod graph_builder;
pub mod orchestrator;
pub mod summary;

#[cfg(test)]
mod testing;

pub use chain::{Chain, ChainError};
pub use graph_builder::{build_graph, BuiltGraph, PageAnalysis};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, PageDigest, ResearchError, ResearchOutcome, RunState,
    RunStats, StageError,
};
