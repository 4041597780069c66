//! The build workspace: one directory, wiped and recreated for every job.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

const BUILD_DIR: &str = "build";
pub const SOURCE_FILE: &str = "resume.tex";
pub const ARTIFACT_FILE: &str = "resume.pdf";
pub const LOG_FILE: &str = "resume.log";

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(work_root: &Path) -> Self {
        Self {
            dir: work_root.join(BUILD_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.join(SOURCE_FILE)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Deletes everything left by the previous job, recreates the directory
    /// and writes `source_text` as the job's only file.
    pub async fn reset(&self, source_text: &str) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("Removed previous workspace {}", self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.source_path(), source_text).await
    }

    /// Copies the artifact to `<output_dir>/resume.pdf`. The workspace copy stays
    /// in place until the next job resets the workspace.
    pub async fn relocate_artifact(&self, output_dir: &Path) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;
        let target = output_dir.join(ARTIFACT_FILE);
        tokio::fs::copy(self.artifact_path(), &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_removes_previous_job_files() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path());

        workspace.reset("first").await.unwrap();
        tokio::fs::write(workspace.artifact_path(), b"%PDF-old").await.unwrap();
        tokio::fs::write(workspace.dir().join("resume.aux"), b"stale").await.unwrap();

        workspace.reset("second").await.unwrap();

        let mut entries = tokio::fs::read_dir(workspace.dir()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![SOURCE_FILE.to_string()]);
        let source = tokio::fs::read_to_string(workspace.source_path()).await.unwrap();
        assert_eq!(source, "second");
    }

    #[tokio::test]
    async fn test_relocate_copies_and_keeps_workspace_copy() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(&root.path().join("work"));
        workspace.reset("src").await.unwrap();
        tokio::fs::write(workspace.artifact_path(), b"%PDF-1.4").await.unwrap();

        let out = root.path().join("out");
        let target = workspace.relocate_artifact(&out).await.unwrap();

        assert_eq!(target, out.join(ARTIFACT_FILE));
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"%PDF-1.4");
        assert!(workspace.artifact_path().exists());
    }
}
