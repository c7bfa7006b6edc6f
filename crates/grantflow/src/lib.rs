pub mod artifact;
pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod events;
pub mod finance;
pub mod milestone;
pub mod notify;
pub mod presentation;
pub mod proposal;
pub mod render;
pub mod sanitize;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::ArtifactStore;
pub use audit::AuditRecorder;
pub use config::{load_config, EngineConfig};
pub use context::{ActorContext, ActorRole};
pub use db::Database;
pub use error::{GrantflowError, InfraError, Result, StateConflictError, ValidationError};
pub use evaluation::EvaluationService;
pub use events::EventDispatcher;
pub use finance::FinanceService;
pub use milestone::MilestoneService;
pub use notify::Notifier;
pub use presentation::PresentationService;
pub use proposal::ProposalService;
pub use render::{PlainTextRenderer, RenderBoundary};
pub use workflow::{Stage, WorkflowEngine};
