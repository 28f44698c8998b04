//! Seeds `/etc` with the handful of files an emulated init expects to
//! exist, then delegates to device-node population.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `populateEtc` and
//! `addEssentialFiles`.

use super::devices::populate_dev;
use crate::path_algebra::{guest_to_host, is_file_in_guest_not_empty, read_guest_link};
use anyhow::Result;
use std::path::Path;

const ESSENTIAL_FILES: [(&str, &str); 3] = [
    ("/etc/TZ", "EST5EDT\n"),
    ("/etc/hosts", "127.0.0.1 localhost\n"),
    ("/etc/passwd", "root::0:0:root:/root:/bin/sh\n"),
];

/// Writes any of [`ESSENTIAL_FILES`] that are missing or empty.
pub fn populate_etc(root: &Path) -> Result<()> {
    let etc_host = guest_to_host(root, Path::new("/etc")).map_err(anyhow::Error::msg)?;
    std::fs::create_dir_all(read_guest_link(&etc_host, root, true))?;

    for (guest_path, content) in ESSENTIAL_FILES {
        if is_file_in_guest_not_empty(root, Path::new(guest_path)) {
            continue;
        }
        let full_path = guest_to_host(root, Path::new(guest_path)).map_err(anyhow::Error::msg)?;
        let resolved = read_guest_link(&full_path, root, true);
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(resolved, content)?;
    }

    Ok(())
}

pub fn add_essential_files(root: &Path) -> Result<()> {
    populate_etc(root)?;
    populate_dev(root)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn populate_etc_writes_missing_files_only() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/hosts"), "existing\n").unwrap();

        populate_etc(dir.path()).unwrap();

        let hosts = std::fs::read_to_string(dir.path().join("etc/hosts")).unwrap();
        assert_eq!(hosts, "existing\n");
        let passwd = std::fs::read_to_string(dir.path().join("etc/passwd")).unwrap();
        assert_eq!(passwd, "root::0:0:root:/root:/bin/sh\n");
    }
}
