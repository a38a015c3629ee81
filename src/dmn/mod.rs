pub mod evaluation;
pub mod feel;
pub mod model;
pub mod parser;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use evaluation::DecisionEvaluator;
pub use feel::{FeelExpression, Scope, UnaryTests};
pub use model::{Decision, DecisionLogic, DecisionTable, Definitions, HitPolicy};
pub use parser::{parse_decision, parse_definitions};
pub use service::DecisionService;
pub use storage::{LoadedResource, ResourceInfo, ResourceStore};
