//! Built-in tools.

pub mod fs;
pub mod shell;

use std::sync::Arc;

use crate::error::RegistryError;
use crate::registry::ToolRegistry;
use crate::shell::{ShellHook, ShellSettings};
use crate::workspace::Workspace;

pub use fs::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use shell::RunShellCommandTool;

/// Registry holding every built-in tool, all rooted at `workspace`.
pub fn standard_registry(
    workspace: Workspace,
    shell: ShellSettings,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(WriteFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(ListFilesTool::new(workspace.clone())))?;
    registry.register(Arc::new(RunShellCommandTool::new(ShellHook::new(
        workspace, shell,
    ))))?;
    Ok(registry)
}
