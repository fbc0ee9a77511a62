//! Extraction of uploaded `tar.zst` bundles into a deployment directory.
//!
//! The archive comes from an untrusted client. The whole stream is decompressed
//! into memory, every entry is inspected before anything is written, and only
//! entries that stay inside the destination survive:
//!
//! - device nodes, FIFOs and any other special entry are dropped;
//! - absolute names and names containing `..` are dropped;
//! - symbolic and hard links whose target is absolute or contains `..` are
//!   dropped.
//!
//! Dropped entries are not errors. They are returned in
//! [`ExtractSummary::skipped`] so the caller can log them.
//!
//! There is no ceiling on the decompressed size at this layer.

use std::fmt;
use std::fs::{self, File, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, EntryType};
use tracing::debug;

use crate::error::{Error, Result};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Sizes observed while extracting an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Bytes read from the compressed input.
    pub compressed_size: u64,
    /// Bytes of the decompressed tar container.
    pub extracted_size: u64,
    /// Content bytes of the regular files written to disk.
    pub written_bytes: u64,
    /// Entries dropped by the safety filter, in archive order.
    pub skipped: Vec<SkippedEntry>,
}

/// An archive entry the safety filter refused to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Character/block device or FIFO.
    SpecialFile,
    /// Sparse files, global PAX headers and unknown entry types.
    UnsupportedType,
    /// Absolute name or one that climbs out with `..`.
    UnsafePath,
    /// Link whose target leaves the destination.
    UnsafeLink,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::SpecialFile => "special file",
            SkipReason::UnsupportedType => "unsupported entry type",
            SkipReason::UnsafePath => "unsafe path",
            SkipReason::UnsafeLink => "link target outside destination",
        };
        f.write_str(reason)
    }
}

/// What to materialize for a surviving entry.
#[derive(Debug)]
enum Action {
    Directory,
    File,
    Symlink(PathBuf),
    HardLink(PathBuf),
}

#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    path: PathBuf,
    action: Action,
}

/// Decompress `input` and extract its safe entries under `destination`.
///
/// `destination` is created if missing. A malformed zstd stream or tar
/// container fails with [`Error::Archive`] before anything is written. A
/// write failure fails with [`Error::Extraction`] and leaves `destination`
/// partially populated; the caller must discard it. An upload whose
/// container is empty is rejected as [`Error::Archive`].
///
/// Link targets are held to the same rule as entry names: relative and free
/// of `..`. A link such as `a/b/../c` is dropped even though it resolves
/// inside `destination`, because links chained through other links from the
/// same archive could otherwise climb out of it.
pub fn extract<R: Read>(input: R, destination: &Path) -> Result<ExtractSummary> {
    let mut input = CountingReader::new(input);
    let tar_data = decompress(&mut input)?;
    let compressed_size = input.count();
    let extracted_size = tar_data.len() as u64;
    if tar_data.is_empty() {
        return Err(Error::Archive("empty tar container".to_string()));
    }

    debug!(compressed_size, extracted_size, "decompressed archive");

    let (planned, skipped) = plan_entries(&tar_data)?;

    fs::create_dir_all(destination).map_err(|e| Error::extraction(destination, e))?;
    let written_bytes = write_entries(&tar_data, destination, &planned)?;

    debug!(
        destination = %destination.display(),
        entries = planned.len(),
        skipped = skipped.len(),
        written_bytes,
        "extracted archive"
    );

    Ok(ExtractSummary {
        compressed_size,
        extracted_size,
        written_bytes,
        skipped,
    })
}

fn decompress<R: Read>(input: R) -> Result<Vec<u8>> {
    let mut decoder = zstd::stream::read::Decoder::new(input)
        .map_err(|e| Error::Archive(format!("failed to initialise zstd decoder: {e}")))?;

    let mut tar_data = Vec::new();
    decoder
        .read_to_end(&mut tar_data)
        .map_err(|e| Error::Archive(format!("failed to decompress upload: {e}")))?;

    Ok(tar_data)
}

fn malformed(e: io::Error) -> Error {
    Error::Archive(format!("malformed tar container: {e}"))
}

/// First pass: read every header and decide which entries survive.
fn plan_entries(tar_data: &[u8]) -> Result<(Vec<PlannedEntry>, Vec<SkippedEntry>)> {
    let mut archive = Archive::new(tar_data);
    let mut planned = Vec::new();
    let mut skipped = Vec::new();

    for (index, entry) in archive.entries().map_err(malformed)?.enumerate() {
        let entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        let link_name = entry
            .link_name()
            .map_err(malformed)?
            .map(|link| link.into_owned());
        let trailing_slash = entry.path_bytes().ends_with(b"/");

        match classify(entry.header().entry_type(), &path, link_name, trailing_slash) {
            Ok(action) => planned.push(PlannedEntry {
                index,
                path,
                action,
            }),
            Err(reason) => {
                debug!(path = %path.display(), %reason, "skipping archive entry");
                skipped.push(SkippedEntry { path, reason });
            }
        }
    }

    Ok((planned, skipped))
}

fn classify(
    entry_type: EntryType,
    path: &Path,
    link_name: Option<PathBuf>,
    trailing_slash: bool,
) -> std::result::Result<Action, SkipReason> {
    let action = match entry_type {
        EntryType::Directory => Action::Directory,
        // Old-style archives mark directories with a trailing slash only.
        EntryType::Regular | EntryType::Continuous if trailing_slash => Action::Directory,
        EntryType::Regular | EntryType::Continuous => Action::File,
        EntryType::Symlink => Action::Symlink(link_name.ok_or(SkipReason::UnsafeLink)?),
        EntryType::Link => Action::HardLink(link_name.ok_or(SkipReason::UnsafeLink)?),
        EntryType::Char | EntryType::Block | EntryType::Fifo => {
            return Err(SkipReason::SpecialFile)
        }
        _ => return Err(SkipReason::UnsupportedType),
    };

    if !is_safe_name(path) {
        return Err(SkipReason::UnsafePath);
    }
    // Only a directory entry may name the destination itself.
    if !matches!(action, Action::Directory) && !has_normal_component(path) {
        return Err(SkipReason::UnsafePath);
    }

    match &action {
        Action::Symlink(target) | Action::HardLink(target) if !is_safe_link(target) => {
            Err(SkipReason::UnsafeLink)
        }
        _ => Ok(action),
    }
}

/// Entry names must be relative and may not contain `..` at all.
fn is_safe_name(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn has_normal_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::Normal(_)))
}

/// Link targets follow the same rule as entry names. With no `..` anywhere,
/// every link resolves below its own directory even when it passes through
/// other links from the same archive.
fn is_safe_link(target: &Path) -> bool {
    is_safe_name(target)
}

/// Second pass: write the planned entries in archive order.
fn write_entries(tar_data: &[u8], destination: &Path, planned: &[PlannedEntry]) -> Result<u64> {
    let mut archive = Archive::new(tar_data);
    let mut pending = planned.iter().peekable();
    let mut written_bytes = 0u64;

    for (index, entry) in archive.entries().map_err(malformed)?.enumerate() {
        let Some(plan) = pending.next_if(|plan| plan.index == index) else {
            if pending.peek().is_none() {
                break;
            }
            continue;
        };
        let mut entry = entry.map_err(malformed)?;
        let target = destination.join(&plan.path);

        match &plan.action {
            Action::Directory => {
                fs::create_dir_all(&target).map_err(|e| Error::extraction(&target, e))?;
                set_mode(&target, DIR_MODE)?;
            }
            Action::File => {
                prepare_target(&target)?;
                let mut file = File::create(&target).map_err(|e| Error::extraction(&target, e))?;
                written_bytes +=
                    io::copy(&mut entry, &mut file).map_err(|e| Error::extraction(&target, e))?;
                set_mode(&target, FILE_MODE)?;
            }
            Action::Symlink(link) => {
                // Symlink permission bits are not settable on Linux.
                prepare_target(&target)?;
                symlink(link, &target).map_err(|e| Error::extraction(&target, e))?;
            }
            Action::HardLink(link) => {
                prepare_target(&target)?;
                let source = destination.join(link);
                fs::hard_link(&source, &target).map_err(|e| Error::extraction(&target, e))?;
            }
        }
    }

    Ok(written_bytes)
}

/// Create missing parents and unlink a non-directory already at `target`,
/// so a later entry never writes through an earlier link.
fn prepare_target(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::extraction(parent, e))?;
    }
    match fs::symlink_metadata(target) {
        Ok(meta) if !meta.is_dir() => {
            fs::remove_file(target).map_err(|e| Error::extraction(target, e))
        }
        _ => Ok(()),
    }
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| Error::extraction(path, e))
}

/// Counts the bytes pulled through an inner reader.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
