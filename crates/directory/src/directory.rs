//! Directory snapshots and providers.

use crate::error::DirectoryResult;
use crate::types::Application;
use async_trait::async_trait;
use std::sync::Arc;

/// Immutable list of directory applications, taken once per resolution.
#[derive(Debug, Clone, Default)]
pub struct AppDirectory {
    apps: Arc<[Application]>,
}

impl AppDirectory {
    pub fn new(apps: Vec<Application>) -> Self {
        Self { apps: apps.into() }
    }

    pub fn applications(&self) -> &[Application] {
        &self.apps
    }

    pub fn by_app_id(&self, app_id: &str) -> Option<&Application> {
        self.apps.iter().find(|a| a.app_id == app_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Application> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Look up by name first, then by app id.
    pub fn by_name_or_id(&self, key: &str) -> Option<&Application> {
        self.by_name(key).or_else(|| self.by_app_id(key))
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Source of directory applications.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn applications(&self) -> DirectoryResult<Vec<Application>>;

    /// Take an immutable snapshot.
    async fn snapshot(&self) -> DirectoryResult<AppDirectory> {
        Ok(AppDirectory::new(self.applications().await?))
    }
}

/// Fixed directory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    apps: Vec<Application>,
}

impl StaticDirectory {
    pub fn new(apps: Vec<Application>) -> Self {
        Self { apps }
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectory {
    async fn applications(&self) -> DirectoryResult<Vec<Application>> {
        Ok(self.apps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_snapshot_lookup() {
        let provider = StaticDirectory::new(vec![
            Application::new("charts-id", "Charts"),
            Application::new("news-id", "News"),
        ]);
        let dir = provider.snapshot().await.unwrap();

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.by_name("News").unwrap().app_id, "news-id");
        assert_eq!(dir.by_name_or_id("charts-id").unwrap().name, "Charts");
        assert!(dir.by_app_id("Charts").is_none());
    }
}
