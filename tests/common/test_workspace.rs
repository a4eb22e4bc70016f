//! TestWorkspace builder for integration testing
//!
//! Creates a throwaway workspace directory and a matching daemon
//! configuration that points at it.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use workspace_sync::config::DaemonConfig;

/// Builder for creating test workspace structures
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create a new empty test workspace
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the workspace root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of an entry as clients see it
    pub fn client_path(&self, relative_path: &str) -> String {
        self.path().join(relative_path).to_string_lossy().to_string()
    }

    /// Add a file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add an empty directory
    pub fn add_dir(&self, relative_path: &str) -> &Self {
        fs::create_dir_all(self.dir.path().join(relative_path)).expect("Failed to create dir");
        self
    }

    /// Delete a file
    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.dir.path().join(relative_path)).expect("Failed to remove file");
        self
    }

    /// Read a file back
    pub fn read_file(&self, relative_path: &str) -> String {
        fs::read_to_string(self.dir.path().join(relative_path)).expect("Failed to read file")
    }

    /// A small web project with dependency and build directories
    pub fn with_web_project(&self) -> &Self {
        self.add_file("src/app.ts", "export const app = 1;\n")
            .add_file("src/components/Button.tsx", "export function Button() {}\n")
            .add_file("package.json", "{\"name\":\"demo\"}\n")
            .add_file("README.md", "# demo\n")
            .add_file("node_modules/react/index.js", "module.exports = {};\n")
            .add_file(".next/build-manifest.json", "{}\n")
            .add_file(".git/HEAD", "ref: refs/heads/main\n")
    }

    /// Daemon configuration serving this workspace, without a dev server
    pub fn config(&self) -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.workspace_root = PathBuf::from(self.path());
        config.process.enabled = false;
        config.watcher.debounce_ms = 50;
        config
    }

    /// Configuration that runs `sh -c <script>` as the dev server
    #[cfg(unix)]
    pub fn config_with_script(&self, script: &str, flush_interval_secs: u64) -> DaemonConfig {
        let mut config = self.config();
        config.process.enabled = true;
        config.process.command = "sh".to_string();
        config.process.args = vec!["-c".to_string(), script.to_string()];
        config.process.flush_interval_secs = flush_interval_secs;
        config
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
