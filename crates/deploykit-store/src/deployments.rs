//! Deployment directories under `{root}/{project}/deployments`.

use std::fs::{self, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::{self, SkippedEntry};
use crate::error::{Error, Result};
use crate::ids::{CommitHash, DeploymentId, ProjectName, DEPLOYMENT_ID_LEN};
use crate::paths::{Layout, ProjectPaths};

/// Hidden prefix of in-flight extraction directories. Listing ignores
/// dot-prefixed names, so these never show up as deployments.
const STAGING_PREFIX: &str = ".staging-";

/// Fresh ids tried before giving up on an occupied name.
const ALLOCATION_ATTEMPTS: usize = 3;

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub deployment_id: DeploymentId,
    pub commit_hash: Option<CommitHash>,
    pub compressed_size: u64,
    pub extracted_size: u64,
    pub written_bytes: u64,
    pub skipped: Vec<SkippedEntry>,
}

/// One row of a deployment listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentEntry {
    pub deployment_id: DeploymentId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Creates, lists and deletes deployments.
///
/// Deployments are immutable once created. Every operation is a plain
/// blocking filesystem call; concurrent callers are not serialized.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    layout: Layout,
}

impl DeploymentStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Extract `archive` into a new deployment of `project`.
    ///
    /// The archive is unpacked into a hidden staging directory next to the
    /// final location and renamed into place only once extraction succeeded,
    /// so a failed upload never leaves a partial deployment behind.
    ///
    /// `commit_hash` is only echoed in the record; aliasing it is up to the
    /// caller.
    pub fn create<R: Read>(
        &self,
        project: &ProjectName,
        archive: R,
        commit_hash: Option<CommitHash>,
    ) -> Result<DeploymentRecord> {
        let paths = self.layout.project(project);
        let deployments_dir = paths.deployments_dir();
        fs::create_dir_all(&deployments_dir)?;

        let deployment_id = allocate_id(&paths)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&deployments_dir)?;

        let summary = archive::extract(archive, staging.path())?;
        fs::set_permissions(staging.path(), Permissions::from_mode(0o755))
            .map_err(|e| Error::extraction(staging.path(), e))?;

        let target = paths.deployment(&deployment_id);
        fs::rename(staging.path(), &target).map_err(|e| Error::extraction(&target, e))?;
        // The staging path no longer exists, dropping the guard removes nothing.
        drop(staging);

        info!(
            project = %project,
            deployment_id = %deployment_id,
            compressed_size = summary.compressed_size,
            extracted_size = summary.extracted_size,
            "deployment created"
        );

        Ok(DeploymentRecord {
            deployment_id,
            commit_hash,
            compressed_size: summary.compressed_size,
            extracted_size: summary.extracted_size,
            written_bytes: summary.written_bytes,
            skipped: summary.skipped,
        })
    }

    /// Newest-first listing of at most `limit` deployments.
    ///
    /// A project that never received an upload lists as empty.
    pub fn list(&self, project: &ProjectName, limit: usize) -> Result<Vec<DeploymentEntry>> {
        let paths = self.layout.project(project);
        let mut ids = read_names(&paths.deployments_dir(), DEPLOYMENT_ID_LEN)?
            .into_iter()
            .filter_map(|name| DeploymentId::parse(&name).ok())
            .collect::<Vec<_>>();

        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);

        let mut entries = Vec::with_capacity(ids.len());
        for deployment_id in ids {
            // Deleted between read_dir and stat
            let Some(created_at) = changed_at(&paths.deployment(&deployment_id))? else {
                continue;
            };
            entries.push(DeploymentEntry {
                deployment_id,
                created_at,
            });
        }
        Ok(entries)
    }

    pub fn exists(&self, project: &ProjectName, deployment_id: &DeploymentId) -> bool {
        self.layout
            .project(project)
            .deployment(deployment_id)
            .is_dir()
    }

    /// Creation time of a deployment, taken from its directory's ctime.
    pub fn created_at(
        &self,
        project: &ProjectName,
        deployment_id: &DeploymentId,
    ) -> Result<Option<DateTime<Utc>>> {
        changed_at(&self.layout.project(project).deployment(deployment_id))
    }

    /// Recursively remove a deployment. Returns `false` if it did not exist.
    ///
    /// Commit aliases pointing at the deployment are left dangling.
    pub fn delete(&self, project: &ProjectName, deployment_id: &DeploymentId) -> Result<bool> {
        let path = self.layout.project(project).deployment(deployment_id);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(project = %project, deployment_id = %deployment_id, "deployment deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick an id whose directory is not taken yet.
///
/// Collisions within one second are already improbable; the check only
/// guards against reusing an existing directory, not against a concurrent
/// upload picking the same id after it.
fn allocate_id(paths: &ProjectPaths) -> Result<DeploymentId> {
    for _ in 0..ALLOCATION_ATTEMPTS {
        let id = DeploymentId::generate();
        if fs::symlink_metadata(paths.deployment(&id)).is_err() {
            return Ok(id);
        }
        warn!(deployment_id = %id, "generated deployment id already in use");
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not allocate an unused deployment id",
    )))
}

/// Visible entry names of `dir` that have exactly `len` characters.
/// A missing directory reads as empty.
pub(crate) fn read_names(dir: &Path, len: usize) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with('.') && name.len() == len {
            names.push(name);
        }
    }
    Ok(names)
}

/// Status-change time of `path` without following links, `None` if absent.
pub(crate) fn changed_at(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(DateTime::from_timestamp(meta.ctime(), 0)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdentifierKind;
    use crate::test_support::ArchiveBuilder;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, DeploymentStore) {
        let root = TempDir::new().unwrap();
        let store = DeploymentStore::new(Layout::new(root.path()));
        (root, store)
    }

    fn project() -> ProjectName {
        ProjectName::parse("site").unwrap()
    }

    fn site_archive() -> Vec<u8> {
        ArchiveBuilder::new()
            .file("index.html", b"hello world\n")
            .compressed()
    }

    #[test]
    fn test_create_deployment() {
        let (_root, store) = store();
        let hash = CommitHash::parse(&"c0ffee00".repeat(5)).unwrap();

        let record = store
            .create(&project(), site_archive().as_slice(), Some(hash.clone()))
            .unwrap();

        assert!(IdentifierKind::Deployment.is_match(record.deployment_id.as_str()));
        assert_eq!(record.commit_hash, Some(hash));
        assert_eq!(record.written_bytes, 12);
        let index = store
            .layout()
            .project(&project())
            .deployment(&record.deployment_id)
            .join("index.html");
        assert_eq!(fs::read(index).unwrap(), b"hello world\n");
        assert!(store.exists(&project(), &record.deployment_id));
    }

    #[test]
    fn test_failed_create_leaves_nothing() {
        let (_root, store) = store();

        let err = store
            .create(&project(), &b"garbage"[..], None)
            .unwrap_err();

        assert!(matches!(err, Error::Archive(_)));
        let dir = store.layout().project(&project()).deployments_dir();
        assert_eq!(fs::read_dir(dir).unwrap().count(), 0);
    }

    #[test]
    fn test_list_missing_project_is_empty() {
        let (_root, store) = store();
        assert!(store.list(&project(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_newest_first_and_truncated() {
        let (_root, store) = store();
        let paths = store.layout().project(&project());
        let ids: Vec<DeploymentId> = (0..4)
            .map(|s| DeploymentId::generate_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, s).unwrap()))
            .collect();
        for id in &ids {
            fs::create_dir_all(paths.deployment(id)).unwrap();
        }
        fs::create_dir_all(paths.deployments_dir().join(".staging-abc")).unwrap();
        fs::create_dir_all(paths.deployments_dir().join("not-a-deployment")).unwrap();

        let listed: Vec<_> = store
            .list(&project(), 10)
            .unwrap()
            .into_iter()
            .map(|e| e.deployment_id)
            .collect();
        let newest_two: Vec<_> = store
            .list(&project(), 2)
            .unwrap()
            .into_iter()
            .map(|e| e.deployment_id)
            .collect();

        let expected: Vec<_> = ids.iter().rev().cloned().collect();
        assert_eq!(listed, expected);
        assert_eq!(newest_two, expected[..2].to_vec());
    }

    #[test]
    fn test_delete_twice() {
        let (_root, store) = store();
        let record = store
            .create(&project(), site_archive().as_slice(), None)
            .unwrap();

        assert!(store.delete(&project(), &record.deployment_id).unwrap());
        assert!(!store.delete(&project(), &record.deployment_id).unwrap());
        assert!(!store.exists(&project(), &record.deployment_id));
    }

    #[test]
    fn test_created_at_present() {
        let (_root, store) = store();
        let record = store
            .create(&project(), site_archive().as_slice(), None)
            .unwrap();

        let created = store
            .created_at(&project(), &record.deployment_id)
            .unwrap()
            .unwrap();
        assert!((Utc::now() - created).num_seconds().abs() < 60);

        store.delete(&project(), &record.deployment_id).unwrap();
        assert!(store
            .created_at(&project(), &record.deployment_id)
            .unwrap()
            .is_none());
    }
}
