//! File operation connector.
//!
//! Every path is resolved against a fixed base directory. Absolute paths
//! and `..` components are rejected, so a workflow can never touch files
//! outside that directory.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use weaver_workflow::{
    ActionConnector, ActionNodeConfig, ConnectorError, FileOperationKind, RunContext,
};

/// Runs `file_operation` actions inside a base directory.
#[derive(Debug, Clone)]
pub struct FileConnector {
    root: PathBuf,
}

impl FileConnector {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a relative path onto the root.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for empty or absolute paths and for paths
    /// that step outside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ConnectorError> {
        let relative = Path::new(path.trim());
        if relative.as_os_str().is_empty() {
            return Err(ConnectorError::InvalidConfig {
                reason: "file path is empty".to_string(),
            });
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ConnectorError::InvalidConfig {
                        reason: format!("path escapes the file root: {path}"),
                    });
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ConnectorError {
    ConnectorError::Io {
        reason: format!("{}: {e}", path.display()),
    }
}

#[async_trait]
impl ActionConnector for FileConnector {
    async fn execute(
        &self,
        config: &ActionNodeConfig,
        ctx: &RunContext,
    ) -> Result<JsonValue, ConnectorError> {
        let ActionNodeConfig::FileOperation {
            operation,
            path,
            contents,
        } = config
        else {
            return Err(ConnectorError::Unsupported {
                subtype: config.subtype(),
            });
        };

        let relative = ctx.render(path);
        let full = self.resolve(&relative)?;
        let contents = contents.as_deref().map(|c| ctx.render(c));
        debug!(?operation, path = %relative, "running file operation");

        match operation {
            FileOperationKind::Read => {
                let text = tokio::fs::read_to_string(&full)
                    .await
                    .map_err(|e| io_error(&full, e))?;
                Ok(json!({ "path": relative, "contents": text }))
            }
            FileOperationKind::Write | FileOperationKind::Append => {
                let contents = contents.ok_or_else(|| ConnectorError::InvalidConfig {
                    reason: "contents are required to write a file".to_string(),
                })?;
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| io_error(parent, e))?;
                }
                let append = matches!(operation, FileOperationKind::Append);
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(append)
                    .truncate(!append)
                    .open(&full)
                    .await
                    .map_err(|e| io_error(&full, e))?;
                file.write_all(contents.as_bytes())
                    .await
                    .map_err(|e| io_error(&full, e))?;
                file.flush().await.map_err(|e| io_error(&full, e))?;
                Ok(json!({ "path": relative, "bytes_written": contents.len() }))
            }
            FileOperationKind::Delete => {
                tokio::fs::remove_file(&full)
                    .await
                    .map_err(|e| io_error(&full, e))?;
                Ok(json!({ "path": relative, "deleted": true }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(operation: FileOperationKind, path: &str, contents: Option<&str>) -> ActionNodeConfig {
        ActionNodeConfig::FileOperation {
            operation,
            path: path.to_string(),
            contents: contents.map(str::to_string),
        }
    }

    #[test]
    fn resolve_rejects_escapes() {
        let connector = FileConnector::new("/srv/files");
        assert_eq!(
            connector.resolve("reports/today.txt").expect("relative"),
            PathBuf::from("/srv/files/reports/today.txt")
        );
        assert!(connector.resolve("../etc/passwd").is_err());
        assert!(connector.resolve("a/../../b").is_err());
        assert!(connector.resolve("/etc/passwd").is_err());
        assert!(connector.resolve("  ").is_err());
    }

    #[tokio::test]
    async fn write_append_read_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = FileConnector::new(dir.path());
        let ctx = RunContext::new(json!({ "day": "monday" }));

        let written = connector
            .execute(
                &op(FileOperationKind::Write, "out/{{input.day}}.txt", Some("hello ")),
                &ctx,
            )
            .await
            .expect("write");
        assert_eq!(written["path"], "out/monday.txt");
        assert_eq!(written["bytes_written"], 6);

        connector
            .execute(
                &op(FileOperationKind::Append, "out/monday.txt", Some("{{input.day}}")),
                &ctx,
            )
            .await
            .expect("append");

        let read = connector
            .execute(&op(FileOperationKind::Read, "out/monday.txt", None), &ctx)
            .await
            .expect("read");
        assert_eq!(read["contents"], "hello monday");

        connector
            .execute(&op(FileOperationKind::Delete, "out/monday.txt", None), &ctx)
            .await
            .expect("delete");
        assert!(!dir.path().join("out/monday.txt").exists());
    }

    #[tokio::test]
    async fn missing_file_and_traversal_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = FileConnector::new(dir.path());
        let ctx = RunContext::default();

        assert!(matches!(
            connector
                .execute(&op(FileOperationKind::Read, "nope.txt", None), &ctx)
                .await,
            Err(ConnectorError::Io { .. })
        ));
        assert!(matches!(
            connector
                .execute(&op(FileOperationKind::Write, "../x", Some("x")), &ctx)
                .await,
            Err(ConnectorError::InvalidConfig { .. })
        ));
    }
}
