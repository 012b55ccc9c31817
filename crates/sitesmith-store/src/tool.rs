use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use sitesmith_core::config::GatewayConfig;
use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::traits::Tool;
use sitesmith_core::types::{ToolContext, ToolResult};

use crate::request::{FileOperation, FileRequest};
use crate::store::{FileOutcome, SiteStore};

pub const TOOL_NAME: &str = "manage_site_files";

/// Create, edit, read, or delete files of a generated site.
pub struct ManageSiteFilesTool {
    store: Arc<SiteStore>,
    gateway: GatewayConfig,
    max_old_string_len: usize,
}

impl ManageSiteFilesTool {
    pub fn new(store: Arc<SiteStore>, gateway: GatewayConfig, max_old_string_len: usize) -> Self {
        Self {
            store,
            gateway,
            max_old_string_len,
        }
    }

    /// Run a validated request against the store.
    pub async fn apply(&self, req: &FileRequest) -> FileOutcome {
        let (site, path) = (&req.site_id, req.file_path.as_str());
        match &req.operation {
            FileOperation::Create { content } => self.store.create(site, path, Some(content)).await,
            FileOperation::Edit {
                old_string,
                new_string,
            } => self.store.edit(site, path, old_string, new_string).await,
            FileOperation::Read => self.store.read(site, path).await,
            FileOperation::Delete => self.store.delete(site, path).await,
        }
    }

    /// Parse, validate, and run raw tool arguments, producing the JSON result object.
    ///
    /// Malformed arguments are a `ToolValidation` error; store failures such as
    /// a missing file come back as a result with `success: false`.
    pub async fn handle(&self, input: serde_json::Value) -> Result<serde_json::Value> {
        let req = FileRequest::parse(input, self.max_old_string_len).map_err(|error| {
            warn!(error = %error, "Rejected manage_site_files call");
            SitesmithError::ToolValidation(error)
        })?;

        let outcome = self.apply(&req).await;
        debug!(
            operation = req.operation_name(),
            site_id = %req.site_id,
            path = %req.file_path,
            success = outcome.success,
            "manage_site_files"
        );

        let mut result = json!({
            "operation": req.operation_name(),
            "site_id": req.site_id,
            "file_path": req.file_path,
            "url": self.gateway.site_url(req.site_id.as_str()),
        });
        if let (Some(obj), Ok(serde_json::Value::Object(fields))) =
            (result.as_object_mut(), serde_json::to_value(&outcome))
        {
            obj.extend(fields);
        }
        Ok(result)
    }
}

impl Tool for ManageSiteFilesTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Manage files in generated sites. Create new files, edit existing files (replace strings), \
         read file content, or delete files. Use this to update or modify existing generated sites. \
         When creating large files, create a basic structure first, then use edit_file to add \
         content incrementally."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["create_file", "edit_file", "read_file", "delete_file"],
                    "description": "File operation to perform: create_file, edit_file (replace strings), read_file, or delete_file"
                },
                "site_id": {
                    "type": "string",
                    "description": "Unique site identifier (timestamp format: YYYYMMDD_HHMMSS_ffffff)"
                },
                "file_path": {
                    "type": "string",
                    "description": "Relative path to file within site directory (e.g., 'index.html', 'styles.css')"
                },
                "content": {
                    "type": "string",
                    "description": "File content for create_file operation. Required for create_file."
                },
                "old_string": {
                    "type": "string",
                    "description": format!(
                        "String to find and replace in edit_file operation. Required for edit_file. \
                         Keep this SHORT (under {} characters): a unique comment, a single line, or a short unique string. \
                         For large replacements, break into multiple smaller edits.",
                        self.max_old_string_len
                    )
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string for edit_file operation. Required for edit_file."
                }
            },
            "required": ["operation", "site_id", "file_path"]
        })
    }

    fn execute(
        &self,
        mut input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            // Calls made on behalf of a workflow run default to that run's site.
            if let (Some(task), Some(obj)) = (ctx.task_id, input.as_object_mut()) {
                obj.entry("site_id").or_insert_with(|| json!(task));
            }
            let result = self.handle(input).await?;
            let success = result["success"].as_bool().unwrap_or(false);
            let text = serde_json::to_string_pretty(&result)?;
            Ok(ToolResult {
                content: text,
                is_error: !success,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesmith_core::types::TaskId;

    fn tool(dir: &std::path::Path) -> ManageSiteFilesTool {
        ManageSiteFilesTool::new(Arc::new(SiteStore::new(dir)), GatewayConfig::default(), 200)
    }

    #[tokio::test]
    async fn test_create_and_edit_through_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());

        let created = tool
            .execute(
                json!({"operation": "create_file", "site_id": "s1", "file_path": "index.html", "content": "<p>hi</p>"}),
                ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(!created.is_error);
        let v: serde_json::Value = serde_json::from_str(&created.content).unwrap();
        assert_eq!(v["url"], "http://localhost:8000/sites/s1");
        assert_eq!(v["message"], "File 'index.html' created successfully");

        let edited = tool
            .handle(json!({"operation": "edit_file", "site_id": "s1", "file_path": "index.html",
                           "old_string": "hi", "new_string": "hello"}))
            .await
            .unwrap();
        assert_eq!(edited["success"], true);
        assert_eq!(edited["occurrences"], 1);

        let store = SiteStore::new(dir.path());
        assert_eq!(
            store.read_to_string(&TaskId::new("s1"), "index.html").await.as_deref(),
            Some("<p>hello</p>")
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());

        let err = tool
            .execute(json!({"operation": "edit_file", "site_id": "s1"}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SitesmithError::ToolValidation(_)));

        let err = tool
            .execute(
                json!({"operation": "rename_file", "site_id": "s1", "file_path": "index.html"}),
                ToolContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SitesmithError::ToolValidation(m) if m == "Unknown operation: rename_file"));
    }

    #[tokio::test]
    async fn test_store_failure_is_a_result_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());

        let result = tool
            .execute(
                json!({"operation": "read_file", "site_id": "s1", "file_path": "missing.html"}),
                ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(result.is_error);
        let v: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "File not found: missing.html");
    }

    #[tokio::test]
    async fn test_site_id_defaults_to_calling_task() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());
        let ctx = ToolContext {
            task_id: Some(TaskId::new("run_7")),
        };

        let result = tool
            .execute(
                json!({"operation": "create_file", "file_path": "index.html", "content": "x"}),
                ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error, "{}", result.content);
        assert!(dir.path().join("run_7").join("index.html").exists());
    }

    #[tokio::test]
    async fn test_read_result_includes_content() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());
        tool.handle(json!({"operation": "create_file", "site_id": "s2", "file_path": "a.txt", "content": "abc"}))
            .await
            .unwrap();

        let read = tool
            .handle(json!({"operation": "read_file", "site_id": "s2", "file_path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "abc");
        assert_eq!(read["message"], "Read 3 characters from 'a.txt'");
    }
}
