//! The screening pipeline engine: run records, control signals, events,
//! history and the orchestrator that drives the stages.

pub mod control;
pub mod error;
pub mod events;
pub mod handlers;
pub mod history;
pub mod orchestrator;
pub mod report;
pub mod run;

pub use error::PipelineError;
pub use orchestrator::{Orchestrator, OrchestratorSettings, Stages};
pub use report::RunReportArchive;
