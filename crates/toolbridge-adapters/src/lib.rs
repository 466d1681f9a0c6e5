//! Tool adapters for toolbridge -- the mise version manager and GitHub
//! standup reports.
//!
//! Each adapter implements the [`Adapter`] trait defined in [`traits`],
//! providing a uniform interface for tool discovery and execution.

pub mod error;
pub mod mise;
pub mod standup;
pub mod traits;

pub use error::{AdapterError, Result};
pub use mise::{MiseAdapter, MiseConfig};
pub use standup::{StandupAdapter, StandupConfig};
pub use traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};
