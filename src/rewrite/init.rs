//! Firmadyne skeleton creation and init-command-list synthesis.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `initFirmadyne` and
//! `validateInits`.

use crate::path_algebra::{
    exists_in_guest, guest_to_host, host_to_guest, is_dir_in_guest, is_file_in_guest,
};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const EXECUTABLE_SEARCH_DIRS: [&str; 4] = ["/bin", "/sbin", "/usr/bin", "/usr/sbin"];

/// Creates `/firmadyne`, `/firmadyne/libnvram`, `/firmadyne/libnvram.override`.
pub fn init_firmadyne(root: &Path) -> Result<()> {
    if !root.exists() {
        anyhow::bail!("root path {} does not exist", root.display());
    }
    let base = root.join("firmadyne");
    std::fs::create_dir(&base)
        .with_context(|| format!("failed to create {}", base.display()))?;
    std::fs::create_dir(base.join("libnvram"))?;
    std::fs::create_dir(base.join("libnvram.override"))?;
    Ok(())
}

/// Recursively searches `dirs` for files named `name`, returning host
/// paths, in directory-walk order.
fn find_in_dirs(dirs: &[PathBuf], name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && entry.file_name().to_string_lossy() == name {
                found.push(entry.path().to_path_buf());
            }
        }
    }
    found
}

/// Tests whether every init candidate exists and is reachable, repairing
/// broken-symlink candidates in place by pointing them at a same-named
/// binary found under a conventional bin/sbin directory. Writes the
/// survivors (plus the always-present `/firmadyne/preInit.sh` fallback) to
/// `/firmadyne/init` and returns them.
pub fn validate_inits(root: &Path, suspected_inits: &[String]) -> Result<Vec<String>> {
    let init_list_file = root.join("firmadyne").join("init");

    let mut possible_inits: Vec<String> = suspected_inits.to_vec();

    if exists_in_guest(root, Path::new("/init")) && !is_dir_in_guest(root, Path::new("/init")) {
        if let Ok(guest) = host_to_guest(root, Path::new("/init")) {
            possible_inits.push(guest.to_string_lossy().into_owned());
        }
    }

    for name in ["rcS", "preinit", "preinitMT"] {
        for result in find_in_dirs(&[root.to_path_buf()], name) {
            if let Ok(guest) = host_to_guest(root, &result) {
                possible_inits.push(guest.to_string_lossy().into_owned());
            }
        }
    }

    if possible_inits.is_empty() {
        std::fs::write(&init_list_file, "/firmadyne/preInit.sh\n")?;
        return Ok(vec!["/firmadyne/preInit.sh".to_string()]);
    }

    let mut seen = HashSet::new();
    let mut unique_inits = Vec::new();
    for init in possible_inits {
        if seen.insert(init.clone()) {
            unique_inits.push(init);
        }
    }

    let search_dirs: Vec<PathBuf> = EXECUTABLE_SEARCH_DIRS
        .iter()
        .filter_map(|d| guest_to_host(root, Path::new(d)).ok())
        .collect();

    let mut found_inits = Vec::new();
    for init in &unique_inits {
        let Ok(init_host_path) = guest_to_host(root, Path::new(init)) else {
            continue;
        };

        if is_dir_in_guest(root, Path::new(init)) {
            continue;
        }
        if is_file_in_guest(root, Path::new(init)) {
            found_inits.push(init.clone());
            continue;
        }

        let filename = Path::new(init)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let results = find_in_dirs(&search_dirs, &filename);

        if let Some(link_target) = results.first() {
            repair_symlink(&init_host_path, root, link_target)?;
            found_inits.push(init.clone());
            continue;
        }

        // Last resort: if the candidate was (or still is) a symlink, follow
        // its stale target's basename instead of the candidate's own name.
        if let Ok(raw_target) = std::fs::read_link(&init_host_path) {
            let target_filename = Path::new(&raw_target)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let results = find_in_dirs(&search_dirs, &target_filename);
            if let Some(link_target) = results.first() {
                repair_symlink(&init_host_path, root, link_target)?;
                found_inits.push(init.clone());
                continue;
            }
        }
    }

    found_inits.push("/firmadyne/preInit.sh".to_string());
    let contents = found_inits
        .iter()
        .map(|i| format!("{i}\n"))
        .collect::<String>();
    std::fs::write(&init_list_file, contents)?;

    Ok(found_inits)
}

fn repair_symlink(init_host_path: &Path, root: &Path, link_target: &Path) -> Result<()> {
    if init_host_path.is_symlink() {
        std::fs::remove_file(init_host_path)?;
    }
    let guest_target = host_to_guest(root, link_target).unwrap_or_else(|_| link_target.to_path_buf());
    std::os::unix::fs::symlink(guest_target, init_host_path)?;
    Ok(())
}
