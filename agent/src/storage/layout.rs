//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory
    pub fn root(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Persisted identity and lock state document
    pub fn state_file(&self) -> File {
        self.root().file("state.json")
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        self.root().file("settings.json")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        self.root().subdir("logs")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), AgentError> {
        self.root().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/lockagent");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lockagent");

        Self::new(base_dir)
    }
}
