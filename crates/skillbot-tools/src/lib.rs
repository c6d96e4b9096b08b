//! skillbot-tools: Tool registry, argument validation and the built-in tools.
//!
//! Provides:
//! - The [`AgentTool`] trait and a name-keyed [`ToolRegistry`]
//! - Declared input schemas with validation before dispatch
//! - A [`Workspace`] root that file and shell tools cannot leave
//! - The shell execution hook with timeout and process-group kill

pub mod error;
pub mod registry;
pub mod schema;
pub mod shell;
pub mod tools;
pub mod workspace;

pub use error::{RegistryError, ToolError};
pub use registry::{AgentTool, Observation, ToolDefinition, ToolRegistry};
pub use schema::{InputSchema, ParamKind, ParamSpec};
pub use shell::{ShellHook, ShellOutput, ShellSettings};
pub use tools::standard_registry;
pub use workspace::Workspace;
