//! Per-job workspaces.
//!
//! Every job runs in a fresh directory `<jobs_root>/<job-id>/`. The engine
//! writes its artifact there, and the resolver only ever searches there, so
//! concurrent jobs cannot pick up each other's output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::JobId;
use crate::error::WorkspaceError;

/// A directory owned by a single job. Removed on drop unless retained.
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: JobId,
    path: PathBuf,
    retain: bool,
}

impl JobWorkspace {
    /// Creates the workspace directory for `job_id` under `jobs_root`.
    pub fn create(jobs_root: &Path, job_id: &JobId, retain: bool) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(jobs_root).map_err(|source| WorkspaceError::CreateRoot {
            path: jobs_root.to_path_buf(),
            source,
        })?;

        let path = jobs_root.join(job_id.as_str());
        let path = std::path::absolute(&path).unwrap_or(path);

        // create_dir (not create_dir_all) so a colliding id is an error
        fs::create_dir(&path).map_err(|source| WorkspaceError::Create {
            path: path.clone(),
            source,
        })?;

        debug!("Created workspace {} for {}", path.display(), job_id);

        Ok(Self {
            job_id: job_id.clone(),
            path,
            retain,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Absolute path of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the directory will be left on disk.
    pub fn is_retained(&self) -> bool {
        self.retain
    }

    /// Removes the workspace now, reporting failures instead of logging them.
    pub fn remove(mut self) -> Result<(), WorkspaceError> {
        let result = self.remove_dir();
        self.retain = true;
        result
    }

    fn remove_dir(&self) -> Result<(), WorkspaceError> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Removed workspace {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.retain {
            return;
        }
        if let Err(e) = self.remove_dir() {
            warn!("{}", e);
        }
    }
}
