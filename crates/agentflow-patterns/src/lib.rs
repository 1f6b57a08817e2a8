// ABOUTME: Orchestration patterns for LLM workflows: chains, routers, guardrails, evaluator loops, orchestrators.
// ABOUTME: Also hosts the crew runner (agents + tasks) and the built-in tools those patterns call.

pub mod chaining;
pub mod crew;
pub mod error;
pub mod evaluator;
pub mod extract;
pub mod orchestrator;
pub mod parallel;
pub mod routing;
pub mod tools;

pub use error::PatternError;
