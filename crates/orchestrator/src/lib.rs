//! Autonomous conversation test orchestrator.
//!
//! Simulates multi-turn customer conversations against a support agent and
//! scores the agent's behaviour.
//!
//! # Modules
//! - `adapter`: Target adapter trait and HTTP implementation
//! - `persona`: Persona generator trait, scripted generator, openings
//! - `policy`: Termination policy and optional resolution judge
//! - `runner`: Single-conversation turn loop
//! - `aggregator`: Suite statistics
//! - `suite`: Sequential suite orchestration
//! - `registry`: Active test registry
//! - `service`: Fire-and-track suite launcher
//! - `store`: Report persistence
//! - `reporter`: Text rendering

pub mod adapter;
pub mod aggregator;
pub mod delay;
pub mod persona;
pub mod policy;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod service;
pub mod store;
pub mod suite;

pub use adapter::{HttpTargetAdapter, TargetAdapter};
pub use persona::{PersonaGenerator, ScriptedPersonaGenerator};
pub use policy::{ResolutionJudge, TerminationPolicy};
pub use registry::{InMemoryTestRegistry, TestRegistry, TestState};
pub use runner::ConversationRunner;
pub use service::SuiteService;
pub use store::{InMemoryReportStore, JsonFileReportStore, ReportStore};
pub use suite::{Collaborators, SuiteOrchestrator};
