//! # coexnet
//!
//! The async half of coexnet - THE BINARY.
//!
//! - `backend`: the remote coexpression service and the factor chooser
//! - `orchestrator`: drives `coexnet-core` against the backend
//! - `prompt`: questions the pipeline asks the user
//! - `config`: TOML configuration with environment overrides
//! - `cli`: clap commands
//!
//! The binary is a thin wrapper around `cli::execute`; the library target
//! exists so the orchestrator can be tested against an in-memory backend.

pub mod backend;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod prompt;

pub use backend::{BackendError, CoexpressionBackend, DiffExResult, FactorChooser, HttpBackend};
pub use orchestrator::{
    GraphUpdate, RequestKind, SearchEvent, SearchOrchestrator, SearchReport, SearchRequest,
};
