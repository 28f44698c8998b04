//! Shared test utilities for rehost-prep integration tests.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tempfile::TempDir;

/// A temporary directory standing in for a mounted rootfs image, plus the
/// `TempDir` guard that keeps it alive for the test's duration.
pub struct MountedRootfs {
    pub _temp_dir: TempDir,
    pub root: PathBuf,
}

impl MountedRootfs {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        Self { _temp_dir: temp_dir, root }
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.root.join(rel.trim_start_matches('/'));
        fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    pub fn write_exec(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, content).expect("failed to write file");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod failed");
        path
    }

    pub fn symlink(&self, rel: &str, target: &str) -> PathBuf {
        let path = self.root.join(rel.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        std::os::unix::fs::symlink(target, &path).expect("failed to create symlink");
        path
    }
}

/// Builds a gzip-compressed tarball at `dest` from a list of
/// `(memberName, contents, mode)` regular files and `(memberName, target)`
/// symlinks, mirroring the archive shape a firmware extractor would emit.
pub fn build_tarball(dest: &Path, files: &[(&str, &[u8], u32)], links: &[(&str, &str)]) {
    let file = File::create(dest).expect("failed to create tarball file");
    let enc = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(enc);

    for (name, contents, mode) in files {
        let mut header = Header::new_gnu();
        header.set_path(name.trim_start_matches('/')).unwrap();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append(&header, *contents).unwrap();
    }

    for (name, target) in links {
        let mut header = Header::new_gnu();
        header.set_path(name.trim_start_matches('/')).unwrap();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&header, name.trim_start_matches('/'), target)
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}

pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "expected symlink at {}, but it is not a symlink",
        path.display()
    );
    let target = fs::read_link(path).expect("failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read file {}: {e}", path.display()));
    assert!(
        content.contains(expected),
        "file {} does not contain expected content.\nexpected to find: {expected}\nactual content: {content}",
        path.display(),
    );
}

pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "expected file to exist: {}", path.display());
}

pub fn assert_dir_exists(path: &Path) {
    assert!(path.is_dir(), "expected directory to exist: {}", path.display());
}
