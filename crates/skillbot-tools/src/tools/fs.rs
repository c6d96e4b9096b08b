//! `read_file`, `write_file` and `list_files`, all confined to the workspace.

use std::io::ErrorKind;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::registry::{AgentTool, Observation};
use crate::schema::{InputSchema, ParamKind};
use crate::workspace::Workspace;

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing required parameter '{key}'")))
}

pub struct ReadFileTool {
    workspace: Workspace,
    schema: InputSchema,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            schema: InputSchema::new().required(
                "path",
                ParamKind::String,
                "Path of the file to read, relative to the workspace root.",
            ),
        }
    }
}

#[async_trait]
impl AgentTool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the workspace and return its contents."
    }

    fn input_schema(&self) -> &InputSchema {
        &self.schema
    }

    async fn execute(
        &self,
        args: Value,
        _cancel: &CancellationToken,
    ) -> Result<Observation, ToolError> {
        let raw = str_arg(&args, "path")?;
        let path = self.workspace.resolve(raw)?;

        let meta = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound(raw.to_string()),
            ErrorKind::PermissionDenied => ToolError::NotReadable(raw.to_string()),
            _ => ToolError::Io(format!("{raw}: {e}")),
        })?;
        if meta.is_dir() {
            return Err(ToolError::NotReadable(format!("{raw} is a directory")));
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound(raw.to_string()),
            ErrorKind::PermissionDenied => ToolError::NotReadable(raw.to_string()),
            ErrorKind::InvalidData => ToolError::NotReadable(format!("{raw} is not valid UTF-8")),
            _ => ToolError::Io(format!("{raw}: {e}")),
        })?;

        Ok(Observation::text(content).with_details(json!({
            "path": self.workspace.display(&path),
            "bytes": meta.len(),
        })))
    }
}

pub struct WriteFileTool {
    workspace: Workspace,
    schema: InputSchema,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            schema: InputSchema::new()
                .required(
                    "path",
                    ParamKind::String,
                    "Path of the file to write, relative to the workspace root.",
                )
                .required("content", ParamKind::String, "Full new content of the file."),
        }
    }
}

#[async_trait]
impl AgentTool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a text file in the workspace. Missing parent directories are created."
    }

    fn input_schema(&self) -> &InputSchema {
        &self.schema
    }

    async fn execute(
        &self,
        args: Value,
        _cancel: &CancellationToken,
    ) -> Result<Observation, ToolError> {
        let raw = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let path = self.workspace.resolve(raw)?;

        if path.is_dir() {
            return Err(ToolError::Io(format!("{raw} is a directory")));
        }
        let map_err = |e: std::io::Error| match e.kind() {
            ErrorKind::PermissionDenied => ToolError::PermissionDenied(raw.to_string()),
            _ => ToolError::Io(format!("{raw}: {e}")),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_err)?;
        }
        tokio::fs::write(&path, content).await.map_err(map_err)?;

        let shown = self.workspace.display(&path);
        Ok(
            Observation::text(format!("Wrote {} bytes to {shown}", content.len()))
                .with_details(json!({ "path": shown, "bytes": content.len() })),
        )
    }
}

pub struct ListFilesTool {
    workspace: Workspace,
    schema: InputSchema,
}

impl ListFilesTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            schema: InputSchema::new().optional(
                "path",
                ParamKind::String,
                "Directory to list, relative to the workspace root (default: the root).",
            ),
        }
    }
}

#[async_trait]
impl AgentTool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories end with '/'."
    }

    fn input_schema(&self) -> &InputSchema {
        &self.schema
    }

    async fn execute(
        &self,
        args: Value,
        _cancel: &CancellationToken,
    ) -> Result<Observation, ToolError> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = self.workspace.resolve(raw)?;

        let meta = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound(raw.to_string()),
            ErrorKind::PermissionDenied => ToolError::PermissionDenied(raw.to_string()),
            _ => ToolError::Io(format!("{raw}: {e}")),
        })?;
        if !meta.is_dir() {
            return Err(ToolError::NotADirectory(raw.to_string()));
        }

        let io_err = |e: std::io::Error| match e.kind() {
            ErrorKind::PermissionDenied => ToolError::PermissionDenied(raw.to_string()),
            _ => ToolError::Io(format!("{raw}: {e}")),
        };
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await.map_err(io_err)?;
        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let text = if entries.is_empty() {
            "(empty directory)".to_string()
        } else {
            entries.join("\n")
        };
        Ok(Observation::text(text).with_details(json!({
            "path": self.workspace.display(&path),
            "entries": entries,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello").unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), "pub fn x() {}").unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();
        (tmp, ws)
    }

    async fn call(tool: &dyn AgentTool, args: Value) -> Result<Observation, ToolError> {
        tool.execute(args, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_tmp, ws) = setup();
        let tool = ReadFileTool::new(ws);
        let obs = call(&tool, json!({"path": "README.md"})).await.unwrap();
        assert_eq!(obs.text, "hello");
        assert_eq!(obs.details.unwrap()["bytes"], 5);
    }

    #[tokio::test]
    async fn test_read_file_errors() {
        let (_tmp, ws) = setup();
        let tool = ReadFileTool::new(ws);
        assert_eq!(
            call(&tool, json!({"path": "missing.txt"})).await.unwrap_err(),
            ToolError::NotFound("missing.txt".into())
        );
        assert!(matches!(
            call(&tool, json!({"path": "src"})).await.unwrap_err(),
            ToolError::NotReadable(_)
        ));
        assert!(matches!(
            call(&tool, json!({"path": "../outside"})).await.unwrap_err(),
            ToolError::PathEscape(_)
        ));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let (tmp, ws) = setup();
        let tool = WriteFileTool::new(ws);
        let obs = call(&tool, json!({"path": "out/notes.txt", "content": "abc"}))
            .await
            .unwrap();
        assert_eq!(obs.text, "Wrote 3 bytes to out/notes.txt");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("out/notes.txt")).unwrap(),
            "abc"
        );
    }

    #[tokio::test]
    async fn test_write_file_outside_root_rejected() {
        let (_tmp, ws) = setup();
        let tool = WriteFileTool::new(ws);
        let err = call(&tool, json!({"path": "../../evil.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_file_through_dangling_link_rejected() {
        let (tmp, ws) = setup();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&target, tmp.path().join("evil")).unwrap();

        let tool = WriteFileTool::new(ws);
        let err = call(&tool, json!({"path": "evil", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_list_files_sorted_with_dir_suffix() {
        let (_tmp, ws) = setup();
        let tool = ListFilesTool::new(ws);
        let obs = call(&tool, json!({})).await.unwrap();
        assert_eq!(obs.text, "README.md\nsrc/");

        let obs = call(&tool, json!({"path": "src"})).await.unwrap();
        assert_eq!(obs.text, "lib.rs");
    }

    #[tokio::test]
    async fn test_list_files_errors() {
        let (_tmp, ws) = setup();
        let tool = ListFilesTool::new(ws);
        assert_eq!(
            call(&tool, json!({"path": "nope"})).await.unwrap_err(),
            ToolError::NotFound("nope".into())
        );
        assert_eq!(
            call(&tool, json!({"path": "README.md"})).await.unwrap_err(),
            ToolError::NotADirectory("README.md".into())
        );
    }
}
