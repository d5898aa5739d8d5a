pub mod ai_source;
pub mod api;
pub mod config;
pub mod database;
pub mod dedup;
pub mod errors;
pub mod import;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod review;
pub mod sampling;
pub mod session;

pub use database::{Database, QuestionFilter, WriteOp};
pub use errors::{classify_store_error, CorpusError, ErrorContext};
pub use import::ImportService;
pub use models::*;
pub use review::ReviewSelector;
pub use sampling::{ExamComposer, SamplingEngine};
pub use session::{SessionPhase, SessionStateMachine, ValidationOutcome};
