use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::types::TaskId;

use crate::store::SiteStore;

pub const METADATA_FILE: &str = "metadata.json";

/// Record written beside a site's artifacts, describing the run that built it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteMetadata {
    pub site_id: TaskId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub requirements: String,
    pub site_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_preferences: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_step: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub verification_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SiteMetadata {
    pub fn new(
        site_id: TaskId,
        requirements: impl Into<String>,
        site_type: impl Into<String>,
        style_preferences: Option<String>,
    ) -> Self {
        Self {
            site_id,
            created_at: Utc::now(),
            completed_at: None,
            requirements: requirements.into(),
            site_type: site_type.into(),
            style_preferences,
            final_step: None,
            attempts: 0,
            verification_passed: false,
            last_error: None,
        }
    }
}

impl SiteStore {
    /// Write (or overwrite) the metadata record of a site.
    pub async fn write_metadata(&self, meta: &SiteMetadata) -> Result<()> {
        let path = self
            .resolve(&meta.site_id, METADATA_FILE)
            .map_err(SitesmithError::Store)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(meta)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    pub async fn read_metadata(&self, task: &TaskId) -> Option<SiteMetadata> {
        let path = self.resolve(task, METADATA_FILE).ok()?;
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metadata_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteStore::new(dir.path());
        let task = TaskId::new("20250101_000000_000001");

        assert!(store.read_metadata(&task).await.is_none());

        let mut meta = SiteMetadata::new(task.clone(), "A landing page", "landing", None);
        meta.attempts = 2;
        meta.final_step = Some("verified".into());
        store.write_metadata(&meta).await.unwrap();

        let loaded = store.read_metadata(&task).await.unwrap();
        assert_eq!(loaded, meta);

        let raw = std::fs::read_to_string(dir.path().join(task.as_str()).join(METADATA_FILE)).unwrap();
        assert!(raw.contains("\"requirements\": \"A landing page\""));
    }
}
