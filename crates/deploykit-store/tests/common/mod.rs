//! Shared fixtures for the storage integration tests.

#![allow(dead_code)]

use deploykit_store::{DeploymentStore, Layout, PointerManager, ProjectName};
use tar::{EntryType, Header};
use tempfile::TempDir;

/// A throwaway storage root with both managers attached.
pub struct TestRoot {
    pub dir: TempDir,
    pub store: DeploymentStore,
    pub pointers: PointerManager,
}

impl TestRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let layout = Layout::new(dir.path());
        Self {
            store: DeploymentStore::new(layout.clone()),
            pointers: PointerManager::new(layout),
            dir,
        }
    }
}

pub fn project(name: &str) -> ProjectName {
    ProjectName::parse(name).expect("Invalid test project name")
}

/// Build a `tar.zst` upload from `(name, type, contents, link target)` tuples.
/// Names are written raw so hostile paths reach the server unmodified.
pub fn upload(entries: &[(&str, EntryType, &[u8], Option<&str>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, entry_type, contents, link) in entries {
        let mut header = Header::new_gnu();
        header.set_entry_type(*entry_type);
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        {
            let old = header.as_old_mut();
            old.name[..name.len()].copy_from_slice(name.as_bytes());
            if let Some(link) = link {
                old.linkname[..link.len()].copy_from_slice(link.as_bytes());
            }
        }
        header.set_cksum();
        builder.append(&header, *contents).unwrap();
    }
    let tar_data = builder.into_inner().unwrap();
    zstd::encode_all(tar_data.as_slice(), 19).unwrap()
}

pub fn site() -> Vec<u8> {
    upload(&[
        ("css/", EntryType::Directory, b"", None),
        ("css/site.css", EntryType::Regular, b"body{}", None),
        ("index.html", EntryType::Regular, b"<html></html>", None),
    ])
}
