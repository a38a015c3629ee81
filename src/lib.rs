pub mod config;
pub mod dmn;
pub mod errors;
pub mod scenario;
pub mod types;

// Re-export commonly used types
pub use dmn::DecisionService;
pub use errors::{ErrorKind, ServiceError};
pub use types::*;
