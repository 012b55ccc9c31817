use serde::Deserialize;

use sitesmith_core::types::TaskId;

/// A validated site file operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Create { content: String },
    Edit { old_string: String, new_string: String },
    Read,
    Delete,
}

/// A validated `manage_site_files` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRequest {
    pub site_id: TaskId,
    pub file_path: String,
    pub operation: FileOperation,
}

#[derive(Deserialize)]
struct RawRequest {
    operation: Option<String>,
    site_id: Option<String>,
    file_path: Option<String>,
    content: Option<String>,
    old_string: Option<String>,
    new_string: Option<String>,
}

impl FileRequest {
    /// Parse and validate raw tool arguments.
    ///
    /// Returns the message to report back to the caller on failure.
    pub fn parse(input: serde_json::Value, max_old_string_len: usize) -> Result<Self, String> {
        let raw: RawRequest =
            serde_json::from_value(input).map_err(|e| format!("Invalid arguments: {e}"))?;

        let (Some(operation), Some(site_id), Some(file_path)) = (
            raw.operation.filter(|s| !s.is_empty()),
            raw.site_id.filter(|s| !s.is_empty()),
            raw.file_path.filter(|s| !s.is_empty()),
        ) else {
            return Err("Missing required arguments: operation, site_id and file_path are required. \
                 If the arguments were large, create a small skeleton first and add content with edit_file."
                .to_string());
        };

        let operation = match operation.as_str() {
            "create_file" => FileOperation::Create {
                content: raw.content.ok_or(
                    "content parameter is required for create_file operation".to_string(),
                )?,
            },
            "edit_file" => {
                let (Some(old_string), Some(new_string)) = (raw.old_string, raw.new_string) else {
                    return Err(
                        "old_string and new_string parameters are required for edit_file operation"
                            .to_string(),
                    );
                };
                let len = old_string.chars().count();
                if len > max_old_string_len {
                    return Err(format!(
                        "old_string is too long ({len} characters). Keep it under \
                         {max_old_string_len} characters; use a short unique line or comment, \
                         or split the edit into several smaller edits."
                    ));
                }
                FileOperation::Edit {
                    old_string,
                    new_string,
                }
            }
            "read_file" => FileOperation::Read,
            "delete_file" => FileOperation::Delete,
            other => return Err(format!("Unknown operation: {other}")),
        };

        Ok(Self {
            site_id: TaskId(site_id),
            file_path,
            operation,
        })
    }

    pub fn operation_name(&self) -> &'static str {
        match self.operation {
            FileOperation::Create { .. } => "create_file",
            FileOperation::Edit { .. } => "edit_file",
            FileOperation::Read => "read_file",
            FileOperation::Delete => "delete_file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_create() {
        let req = FileRequest::parse(
            json!({"operation": "create_file", "site_id": "s1", "file_path": "index.html", "content": "x"}),
            200,
        )
        .unwrap();
        assert_eq!(req.site_id.as_str(), "s1");
        assert_eq!(req.operation, FileOperation::Create { content: "x".into() });
        assert_eq!(req.operation_name(), "create_file");
    }

    #[test]
    fn test_missing_required_fields() {
        let err = FileRequest::parse(json!({"operation": "read_file"}), 200).unwrap_err();
        assert!(err.starts_with("Missing required arguments"));
    }

    #[test]
    fn test_create_without_content() {
        let err = FileRequest::parse(
            json!({"operation": "create_file", "site_id": "s1", "file_path": "a.html"}),
            200,
        )
        .unwrap_err();
        assert_eq!(err, "content parameter is required for create_file operation");
    }

    #[test]
    fn test_edit_old_string_limit() {
        let long = "x".repeat(201);
        let err = FileRequest::parse(
            json!({"operation": "edit_file", "site_id": "s1", "file_path": "a.html",
                   "old_string": long, "new_string": "y"}),
            200,
        )
        .unwrap_err();
        assert!(err.contains("too long (201 characters)"));

        let ok = FileRequest::parse(
            json!({"operation": "edit_file", "site_id": "s1", "file_path": "a.html",
                   "old_string": "x".repeat(200), "new_string": "y"}),
            200,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_operation() {
        let err = FileRequest::parse(
            json!({"operation": "rename_file", "site_id": "s1", "file_path": "a.html"}),
            200,
        )
        .unwrap_err();
        assert_eq!(err, "Unknown operation: rename_file");
    }
}
