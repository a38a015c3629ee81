use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directories searched, in order, for `<decision-id>.dmn` resources
    pub resource_directories: Vec<PathBuf>,
    /// Maximum size of a single DMN resource (in bytes)
    pub max_resource_size: u64,
    /// Maximum number of parsed decisions to cache (0 disables the cache)
    pub decision_cache_size: usize,
}

impl ServiceConfig {
    pub fn with_resource_directories(directories: Vec<PathBuf>) -> Self {
        Self {
            resource_directories: directories,
            ..Self::default()
        }
    }

    /// `~/.dmn-task-config/resources`, or a relative path when there is no home directory
    pub fn default_resource_directory() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dmn-task-config")
            .join("resources")
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            resource_directories: vec![PathBuf::from("resources")],
            max_resource_size: 5 * 1024 * 1024, // 5MB
            decision_cache_size: 64,
        }
    }
}
