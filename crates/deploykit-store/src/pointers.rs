//! Commit aliases and the `current` pointer.
//!
//! Both are relative symbolic links into the project's deployments directory:
//!
//! - `commits/{hash}` -> `../deployments/{id}/`
//! - `current`        -> `deployments/{id}/`
//!
//! A link is replaced by creating the new link under a hidden temporary name
//! and renaming it over the old one, so a reader sees either the old or the
//! new target, never a missing alias. Two writers racing on the same alias
//! are not ordered: the last rename wins.

use std::fs;
use std::io;
use std::os::unix::fs::{symlink, MetadataExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deployments::read_names;
use crate::error::Result;
use crate::ids::{CommitHash, DeploymentId, ProjectName, COMMIT_HASH_LEN};
use crate::paths::{commit_target, current_target, Layout, ProjectPaths};

/// What an alias currently refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// No alias exists.
    Missing,
    /// The alias exists but its deployment was deleted.
    Dangling(DeploymentId),
    /// The alias points at an existing deployment.
    Live(DeploymentId),
}

impl AliasTarget {
    pub fn deployment_id(&self) -> Option<&DeploymentId> {
        match self {
            AliasTarget::Missing => None,
            AliasTarget::Dangling(id) | AliasTarget::Live(id) => Some(id),
        }
    }
}

/// One row of a commit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAlias {
    pub commit_hash: CommitHash,
    pub deployment_id: DeploymentId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Maintains commit aliases and the current pointer of each project.
#[derive(Debug, Clone)]
pub struct PointerManager {
    layout: Layout,
}

impl PointerManager {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Point `commit_hash` at `deployment_id`, replacing any previous alias.
    ///
    /// The deployment the alias used to point at is kept.
    pub fn alias_commit(
        &self,
        project: &ProjectName,
        commit_hash: &CommitHash,
        deployment_id: &DeploymentId,
    ) -> Result<()> {
        let paths = self.layout.project(project);
        fs::create_dir_all(paths.commits_dir())?;
        replace_link(&commit_target(deployment_id), &paths.commit_link(commit_hash))?;

        info!(
            project = %project,
            commit_hash = %commit_hash,
            deployment_id = %deployment_id,
            "commit aliased"
        );
        Ok(())
    }

    /// Make `deployment_id` the live deployment.
    ///
    /// Returns `false` and changes nothing if the deployment does not exist.
    pub fn switch_current(&self, project: &ProjectName, deployment_id: &DeploymentId) -> Result<bool> {
        let paths = self.layout.project(project);
        if !paths.deployment(deployment_id).is_dir() {
            return Ok(false);
        }

        replace_link(&current_target(deployment_id), &paths.current_link())?;

        info!(project = %project, deployment_id = %deployment_id, "current deployment switched");
        Ok(true)
    }

    pub fn resolve_current(&self, project: &ProjectName) -> Result<AliasTarget> {
        let paths = self.layout.project(project);
        resolve(&paths, &paths.current_link())
    }

    pub fn resolve_commit(&self, project: &ProjectName, commit_hash: &CommitHash) -> Result<AliasTarget> {
        let paths = self.layout.project(project);
        resolve(&paths, &paths.commit_link(commit_hash))
    }

    /// Commit aliases ordered by the alias's own modification time, most
    /// recently (re)aliased first, truncated to `limit`.
    pub fn list_commits(&self, project: &ProjectName, limit: usize) -> Result<Vec<CommitAlias>> {
        let paths = self.layout.project(project);
        let mut aliases = Vec::new();

        for name in read_names(&paths.commits_dir(), COMMIT_HASH_LEN)? {
            let Ok(commit_hash) = CommitHash::parse(&name) else {
                continue;
            };
            let link = paths.commit_link(&commit_hash);
            let meta = match fs::symlink_metadata(&link) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let Some(target) = read_alias(&link)? else {
                continue;
            };
            let Some(deployment_id) = deployment_of(&target) else {
                warn!(link = %link.display(), target = %target.display(), "ignoring foreign commit alias");
                continue;
            };

            let created_at = DateTime::from_timestamp(meta.ctime(), 0).unwrap_or_default();
            aliases.push((
                meta.modified()?,
                CommitAlias {
                    commit_hash,
                    deployment_id,
                    created_at,
                },
            ));
        }

        aliases.sort_by(|(a_time, a), (b_time, b)| {
            b_time
                .cmp(a_time)
                .then_with(|| b.commit_hash.cmp(&a.commit_hash))
        });
        aliases.truncate(limit);

        Ok(aliases.into_iter().map(|(_, alias)| alias).collect())
    }

    /// Remove a commit alias together with the deployment it points at.
    ///
    /// Returns `false` without touching anything if the alias does not exist.
    /// An alias whose deployment is already gone is still removed.
    pub fn delete_commit(&self, project: &ProjectName, commit_hash: &CommitHash) -> Result<bool> {
        let paths = self.layout.project(project);
        let link = paths.commit_link(commit_hash);
        let Some(target) = read_alias(&link)? else {
            return Ok(false);
        };

        match deployment_of(&target).filter(|id| target == commit_target(id)) {
            Some(deployment_id) => match fs::remove_dir_all(paths.deployment(&deployment_id)) {
                Ok(()) => {
                    info!(project = %project, deployment_id = %deployment_id, "deployment deleted with commit");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            None => {
                warn!(link = %link.display(), target = %target.display(), "commit alias has a foreign target, not cascading");
            }
        }

        match fs::remove_file(&link) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(project = %project, commit_hash = %commit_hash, "commit deleted");
        Ok(true)
    }
}

fn resolve(paths: &ProjectPaths, link: &Path) -> Result<AliasTarget> {
    let Some(target) = read_alias(link)? else {
        return Ok(AliasTarget::Missing);
    };
    let Some(deployment_id) = deployment_of(&target) else {
        warn!(link = %link.display(), target = %target.display(), "alias has a foreign target");
        return Ok(AliasTarget::Missing);
    };

    if paths.deployment(&deployment_id).is_dir() {
        Ok(AliasTarget::Live(deployment_id))
    } else {
        Ok(AliasTarget::Dangling(deployment_id))
    }
}

/// Target of the symlink at `link`, `None` if there is no symlink there.
fn read_alias(link: &Path) -> Result<Option<PathBuf>> {
    match fs::read_link(link) {
        Ok(target) => Ok(Some(target)),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidInput) => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// The deployment id named by the last component of a link target.
fn deployment_of(target: &Path) -> Option<DeploymentId> {
    let name = target.file_name()?.to_str()?;
    DeploymentId::parse(name).ok()
}

/// Atomically point `link` at `target`.
fn replace_link(target: &Path, link: &Path) -> Result<()> {
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = link.with_file_name(format!(".{name}.{}", Uuid::new_v4().simple()));

    symlink(target, &staged)?;
    if let Err(e) = fs::rename(&staged, link) {
        let _ = fs::remove_file(&staged);
        return Err(e.into());
    }
    Ok(())
}
