//! Filesystem fixups: busybox shell symlinks, the fixed Firmadyne
//! directory set, bin/sbin permission repair, and directory synthesis from
//! binary string scans.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `fixFileSystem` and
//! `createReferencedDirectories`.

use super::essential_files::add_essential_files;
use crate::binary_inspector::strings;
use crate::path_algebra::{exists_in_guest, guest_to_host, read_guest_link, recursive_guest_chmod};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const DIRS_TO_CREATE: [&str; 19] = [
    "/proc",
    "/dev/pts",
    "/etc_ro",
    "/tmp",
    "/var",
    "/run",
    "/sys",
    "/root",
    "/tmp/var",
    "/tmp/media",
    "/tmp/etc",
    "/tmp/var/run",
    "/tmp/home/root",
    "/tmp/mnt",
    "/tmp/opt",
    "/tmp/www",
    "/var/run",
    "/var/lock",
    "/usr/bin",
    "/usr/sbin",
];

const EXECUTABLE_LOCATIONS: [&str; 4] = ["/bin", "/sbin", "/usr/bin", "/usr/sbin"];

/// Recursively finds directories under `root` whose basename is one of
/// `names` (e.g. every nested `bin`/`sbin` directory, not just the
/// top-level ones).
fn find_dirs_named(root: &Path, names: &[&str]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            if let Some(base) = entry.file_name().to_str() {
                if names.contains(&base) {
                    found.push(entry.path().to_path_buf());
                }
            }
        }
    }
    found
}

/// Scans every executable under `/bin`, `/sbin`, `/usr/bin`, `/usr/sbin`
/// for hardcoded `/var`, `/etc`, `/tmp` paths and creates the referenced
/// directory, skipping printf-style format strings and `/tmp/services`.
/// Logs the created set to `/firmadyne/dir_log`.
pub fn create_referenced_directories(root: &Path) -> Result<()> {
    let pattern = Regex::new(r"^(/var|/etc|/tmp)(.+)/([^/]+)$").unwrap();
    let mut created_dirs: HashSet<String> = HashSet::new();

    for location in EXECUTABLE_LOCATIONS {
        let host_location = guest_to_host(root, Path::new(location))
            .map_err(anyhow::Error::msg)?;
        if !host_location.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&host_location)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_path = entry.path();
            let Ok(meta) = std::fs::metadata(file_path) else {
                continue;
            };
            if meta.permissions().mode() & 0o111 == 0 {
                continue;
            }

            let Ok(candidates) = strings(file_path, 4) else {
                continue;
            };
            for candidate in candidates {
                let Some(captures) = pattern.captures(&candidate) else {
                    continue;
                };
                let dir_path = format!("{}{}", &captures[1], &captures[2]);
                if dir_path.contains("%s")
                    || dir_path.contains("%d")
                    || dir_path.contains("%c")
                    || dir_path.contains("/tmp/services")
                {
                    continue;
                }
                let Ok(full_path) = guest_to_host(root, Path::new(&dir_path)) else {
                    continue;
                };
                let resolved = read_guest_link(&full_path, root, true);
                std::fs::create_dir_all(&resolved)?;
                created_dirs.insert(dir_path);
            }
        }
    }

    let dir_log = guest_to_host(root, Path::new("/firmadyne/dir_log")).map_err(anyhow::Error::msg)?;
    let contents = created_dirs.iter().map(|d| format!("{d}\n")).collect::<String>();
    std::fs::write(dir_log, contents)?;

    Ok(())
}

/// Creates the busybox shell symlinks, the fixed Firmadyne directory set,
/// repairs bin/sbin permissions everywhere in the tree, synthesizes
/// directories referenced by scanned binaries, and seeds essential files
/// — in that order, matching the original. NVRAM seeding and reboot
/// prevention are separate C8 sub-steps run by the caller after this one.
pub fn fix_file_system(root: &Path) -> Result<()> {
    let sh_path = guest_to_host(root, Path::new("/bin/sh")).map_err(anyhow::Error::msg)?;
    if !exists_in_guest(root, Path::new("/bin/sh")) {
        if sh_path.is_symlink() {
            std::fs::remove_file(&sh_path)?;
        }
        std::os::unix::fs::symlink("/firmadyne/busybox", &sh_path)?;
    }
    let firmadyne_sh = guest_to_host(root, Path::new("/firmadyne/sh")).map_err(anyhow::Error::msg)?;
    std::os::unix::fs::symlink("/firmadyne/busybox", &firmadyne_sh)?;

    for dir in DIRS_TO_CREATE {
        let full_path = guest_to_host(root, Path::new(dir)).map_err(anyhow::Error::msg)?;
        let resolved = read_guest_link(&full_path, root, true);
        std::fs::create_dir_all(resolved)?;
    }

    for dir in find_dirs_named(root, &["bin", "sbin"]) {
        if dir.exists() {
            recursive_guest_chmod(&dir, 0o111, root, true);
        }
    }

    create_referenced_directories(root).context("failed to create referenced directories")?;
    add_essential_files(root).context("failed to add essential files")?;

    Ok(())
}
