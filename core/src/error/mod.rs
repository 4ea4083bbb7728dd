#[allow(clippy::module_inception)]
pub mod error;
pub mod backend;
pub mod executor;
pub mod protocol;

pub use backend::{BackendError, TransientKind};
pub use error::{CliError, RouterError};
pub use executor::WorkflowError;
pub use protocol::ErrorCode;
