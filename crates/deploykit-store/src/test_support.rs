//! Builders for hand-crafted archives in unit tests.

use tar::{EntryType, Header};

/// Builds a tar archive entry by entry, writing names straight into the header
/// so hostile paths like `../x` or `/etc/passwd` survive untouched.
pub(crate) struct ArchiveBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub(crate) fn dir(self, name: &str) -> Self {
        self.entry(name, EntryType::Directory, b"", None, 0o755)
    }

    pub(crate) fn file(self, name: &str, contents: &[u8]) -> Self {
        self.entry(name, EntryType::Regular, contents, None, 0o644)
    }

    pub(crate) fn symlink(self, name: &str, target: &str) -> Self {
        self.entry(name, EntryType::Symlink, b"", Some(target), 0o777)
    }

    pub(crate) fn hard_link(self, name: &str, target: &str) -> Self {
        self.entry(name, EntryType::Link, b"", Some(target), 0o644)
    }

    pub(crate) fn entry(
        mut self,
        name: &str,
        entry_type: EntryType,
        contents: &[u8],
        link: Option<&str>,
        mode: u32,
    ) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_uid(4242);
        header.set_gid(4242);
        header.set_mtime(1_700_000_000);
        if entry_type.is_gnu_sparse() {
            if let Some(gnu) = header.as_gnu_mut() {
                gnu.set_real_size(contents.len() as u64);
            }
        }
        {
            let old = header.as_old_mut();
            write_field(&mut old.name, name);
            if let Some(link) = link {
                write_field(&mut old.linkname, link);
            }
        }
        header.set_cksum();
        self.builder.append(&header, contents).unwrap();
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    pub(crate) fn compressed(self) -> Vec<u8> {
        zstd::encode_all(self.finish().as_slice(), 3).unwrap()
    }
}

fn write_field(field: &mut [u8; 100], value: &str) {
    assert!(value.len() < field.len(), "test names must fit the header");
    field.fill(0);
    field[..value.len()].copy_from_slice(value.as_bytes());
}
