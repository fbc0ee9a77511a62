//! On-disk layout of the storage root.
//!
//! ```text
//! {root}/{project}/current                 -> deployments/{deployment_id}/
//! {root}/{project}/deployments/{deployment_id}/...
//! {root}/{project}/commits/{commit_hash}   -> ../deployments/{deployment_id}/
//! ```

use std::path::{Path, PathBuf};

use crate::ids::{CommitHash, DeploymentId, ProjectName};

const DEPLOYMENTS_DIR: &str = "deployments";
const COMMITS_DIR: &str = "commits";
const CURRENT_LINK: &str = "current";

/// The storage root shared by every project.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Anchor the layout at `root`. Relative roots are resolved against the
    /// working directory once, here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project(&self, project: &ProjectName) -> ProjectPaths {
        ProjectPaths {
            project_dir: self.root.join(project.as_str()),
        }
    }
}

/// Locations belonging to one project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    project_dir: PathBuf,
}

impl ProjectPaths {
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.project_dir.join(DEPLOYMENTS_DIR)
    }

    pub fn commits_dir(&self) -> PathBuf {
        self.project_dir.join(COMMITS_DIR)
    }

    pub fn current_link(&self) -> PathBuf {
        self.project_dir.join(CURRENT_LINK)
    }

    pub fn deployment(&self, id: &DeploymentId) -> PathBuf {
        self.deployments_dir().join(id.as_str())
    }

    pub fn commit_link(&self, hash: &CommitHash) -> PathBuf {
        self.commits_dir().join(hash.as_str())
    }
}

/// Target stored in the `current` link, relative to the project directory.
pub fn current_target(id: &DeploymentId) -> PathBuf {
    PathBuf::from(format!("{DEPLOYMENTS_DIR}/{id}/"))
}

/// Target stored in a commit link, relative to the commits directory.
pub fn commit_target(id: &DeploymentId) -> PathBuf {
    PathBuf::from(format!("../{DEPLOYMENTS_DIR}/{id}/"))
}
