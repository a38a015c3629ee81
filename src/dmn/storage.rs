use crate::config::ServiceConfig;
use crate::errors::ServiceError;
use globset::Glob;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DMN_EXTENSION: &str = "dmn";

/// Raw content of a DMN resource, read in full and already closed.
#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub decision_id: String,
    pub path: PathBuf,
    pub content: String,
    /// `sha256:<hex>` of `content`
    pub digest: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub decision_id: String,
    pub file_path: String,
    pub size: u64,
}

/// Looks up `<decision-id>.dmn` files across an ordered list of directories.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    resource_directories: Vec<PathBuf>,
    max_resource_size: u64,
}

impl ResourceStore {
    pub fn new(resource_directory: PathBuf) -> Self {
        Self::with_directories(vec![resource_directory])
    }

    pub fn with_directories(directories: Vec<PathBuf>) -> Self {
        Self {
            resource_directories: directories,
            max_resource_size: ServiceConfig::default().max_resource_size,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            resource_directories: config.resource_directories.clone(),
            max_resource_size: config.max_resource_size,
        }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.resource_directories
    }

    /// Reject ids that would escape the resource directories
    pub fn validate_decision_id(decision_id: &str) -> Result<(), ServiceError> {
        if decision_id.trim().is_empty() {
            return Err(ServiceError::ParserError(
                "Decision id must not be empty".to_string(),
            ));
        }
        if decision_id.contains('/') || decision_id.contains('\\') || decision_id.contains("..") {
            return Err(ServiceError::ParserError(format!(
                "Decision id '{decision_id}' must not contain path separators or '..'"
            )));
        }
        Ok(())
    }

    /// Path of the first `<decision_id>.dmn` found, in directory order
    pub fn resolve(&self, decision_id: &str) -> Result<PathBuf, ServiceError> {
        Self::validate_decision_id(decision_id)?;
        let file_name = format!("{decision_id}.{DMN_EXTENSION}");

        self.resource_directories
            .iter()
            .map(|directory| directory.join(&file_name))
            .find(|path| path.is_file())
            .ok_or_else(|| ServiceError::ResourceNotFound(file_name))
    }

    pub fn read(&self, decision_id: &str) -> Result<LoadedResource, ServiceError> {
        let path = self.resolve(decision_id)?;
        let content = self.read_bounded(&path, decision_id)?;
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())));

        tracing::debug!(
            decision = decision_id,
            path = %path.display(),
            bytes = content.len(),
            "loaded DMN resource"
        );

        Ok(LoadedResource {
            decision_id: decision_id.to_string(),
            path,
            content,
            digest,
        })
    }

    // The handle is dropped when this returns, on success and on every error path
    fn read_bounded(&self, path: &Path, decision_id: &str) -> Result<String, ServiceError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ServiceError::ResourceNotFound(format!("{decision_id}.{DMN_EXTENSION}")),
            _ => ServiceError::Io(e),
        })?;

        let size = file.metadata()?.len();
        if size > self.max_resource_size {
            return Err(ServiceError::EvaluationFailure(format!(
                "Resource {} is {size} bytes, above the {} byte limit",
                path.display(),
                self.max_resource_size
            )));
        }

        let mut content = String::with_capacity(size as usize);
        file.take(self.max_resource_size + 1)
            .read_to_string(&mut content)?;
        if content.len() as u64 > self.max_resource_size {
            return Err(ServiceError::EvaluationFailure(format!(
                "Resource {} grew above the {} byte limit while reading",
                path.display(),
                self.max_resource_size
            )));
        }
        Ok(content)
    }

    /// All `.dmn` resources, optionally filtered by a glob on the decision id.
    ///
    /// Directories are walked recursively. When two directories hold the same
    /// id the first one wins, matching [`resolve`](Self::resolve) for
    /// top-level files.
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<ResourceInfo>, ServiceError> {
        let matcher = filter
            .map(|pattern| Glob::new(pattern).map(|glob| glob.compile_matcher()))
            .transpose()?;

        let mut resources = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for directory in &self.resource_directories {
            if !directory.is_dir() {
                continue;
            }

            for entry in WalkDir::new(directory).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|ext| ext.to_str()) != Some(DMN_EXTENSION)
                {
                    continue;
                }
                let Some(decision_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                    continue;
                };
                if matcher.as_ref().is_some_and(|m| !m.is_match(decision_id)) {
                    continue;
                }

                if let Some(first_path) = seen.get(decision_id) {
                    tracing::warn!(
                        decision = decision_id,
                        ignored = %path.display(),
                        first = %first_path.display(),
                        "duplicate DMN resource ignored"
                    );
                    continue;
                }

                seen.insert(decision_id.to_string(), path.to_path_buf());
                resources.push(ResourceInfo {
                    decision_id: decision_id.to_string(),
                    file_path: path.to_string_lossy().to_string(),
                    size: entry.metadata()?.len(),
                });
            }
        }

        resources.sort_by(|a, b| a.decision_id.cmp(&b.decision_id));
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_decision_id() {
        assert!(ResourceStore::validate_decision_id("wa-task-configuration-ia-asylum").is_ok());
        assert!(ResourceStore::validate_decision_id("").is_err());
        assert!(ResourceStore::validate_decision_id("../secret").is_err());
        assert!(ResourceStore::validate_decision_id("nested/table").is_err());
    }

    #[test]
    fn test_read_computes_digest() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("table.dmn"), "<definitions/>").unwrap();

        let store = ResourceStore::new(temp_dir.path().to_path_buf());
        let resource = store.read("table").unwrap();
        assert_eq!(resource.content, "<definitions/>");
        assert!(resource.digest.starts_with("sha256:"));
        assert_eq!(resource.digest.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_missing_resource() {
        let temp_dir = TempDir::new().unwrap();
        let store = ResourceStore::new(temp_dir.path().to_path_buf());
        let err = store.read("absent").unwrap_err();
        assert!(matches!(err, ServiceError::ResourceNotFound(ref name) if name == "absent.dmn"));
    }

    #[test]
    fn test_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("big.dmn"), "x".repeat(64)).unwrap();

        let config = ServiceConfig {
            resource_directories: vec![temp_dir.path().to_path_buf()],
            max_resource_size: 16,
            ..ServiceConfig::default()
        };
        let err = ResourceStore::from_config(&config).read("big").unwrap_err();
        assert!(matches!(err, ServiceError::EvaluationFailure(_)));
    }
}
