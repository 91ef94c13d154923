use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use uuid::Uuid;

pub const ARTIFACT_PREFIX: &str = "fskhttp-";
pub const ARTIFACT_SUFFIX: &str = ".wav";

/// A uniquely named audio file owned by a single request. The file, if it
/// exists, is removed when the artifact is dropped.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Reserves a fresh path in `dir` without creating the file.
    pub fn allocate(dir: &Path) -> Self {
        let name = format!("{ARTIFACT_PREFIX}{}{ARTIFACT_SUFFIX}", Uuid::new_v4().simple());
        Self {
            path: dir.join(name),
        }
    }

    /// Creates a new artifact in `dir` holding `bytes`.
    pub async fn persist(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        let artifact = Self::allocate(dir);
        tokio::fs::write(&artifact.path, bytes).await?;
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the contents when the file exists and is non-empty.
    pub async fn read_non_empty(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed temporary artifact {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "could not remove temporary artifact {}: {err}",
                self.path.display()
            ),
        }
    }
}

/// True when `name` follows the artifact naming convention.
pub fn is_artifact_name(name: &str) -> bool {
    name.len() > ARTIFACT_PREFIX.len() + ARTIFACT_SUFFIX.len()
        && name.starts_with(ARTIFACT_PREFIX)
        && name.ends_with(ARTIFACT_SUFFIX)
}
