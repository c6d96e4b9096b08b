//! `run_shell_command`, the model-facing wrapper around [`ShellHook`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::registry::{AgentTool, Observation};
use crate::schema::{InputSchema, ParamKind};
use crate::shell::ShellHook;

pub struct RunShellCommandTool {
    hook: ShellHook,
    schema: InputSchema,
}

impl RunShellCommandTool {
    pub fn new(hook: ShellHook) -> Self {
        let schema = InputSchema::new()
            .required(
                "command",
                ParamKind::String,
                "Command to run. Without 'args' it is interpreted by sh -c.",
            )
            .optional(
                "args",
                ParamKind::StringArray,
                "Arguments; when present the command is executed directly.",
            )
            .optional(
                "working_dir",
                ParamKind::String,
                "Working directory relative to the workspace root.",
            )
            .optional(
                "timeout_secs",
                ParamKind::Integer,
                "Timeout in seconds, capped by the configured maximum.",
            );
        Self { hook, schema }
    }
}

#[async_trait]
impl AgentTool for RunShellCommandTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Run a shell command inside the workspace and return its exit code, stdout and stderr."
    }

    fn input_schema(&self) -> &InputSchema {
        &self.schema
    }

    async fn execute(
        &self,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Observation, ToolError> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("missing required parameter 'command'".into()))?;
        let argv: Vec<String> = args
            .get("args")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let working_dir = args.get("working_dir").and_then(Value::as_str);
        let timeout = args
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);

        let output = self
            .hook
            .run(command, &argv, working_dir, timeout, cancel)
            .await?;

        let text = output.render(self.hook.settings().max_output_bytes);
        Ok(Observation::text(text).with_details(json!({
            "exit_code": output.exit_code,
            "truncated": output.truncated,
            "pipe_held_open": output.pipe_held_open,
        })))
    }
}
