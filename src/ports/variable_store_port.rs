//! Project variable persistence port.

use crate::domain::error::ProjectStoreError;
use crate::domain::lru::CacheStats;
use crate::domain::project_vars::ProjectVariables;
use std::path::Path;
use std::sync::Arc;

pub trait VariableStorePort: Send + Sync {
    /// Cached load; reloads when the file changed since it was cached.
    fn load(&self, path: &Path) -> Result<Arc<ProjectVariables>, ProjectStoreError>;

    /// Write atomically and refresh the cache entry.
    fn save(&self, path: &Path, variables: &ProjectVariables) -> Result<(), ProjectStoreError>;

    fn stats(&self) -> CacheStats;
}
