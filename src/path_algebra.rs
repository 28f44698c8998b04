//! Guest↔host path translation and symlink-chain-aware predicates (C1).
//!
//! Grounded on `original_source/src/guestUtils.py`, whose semantics are
//! followed exactly per SPEC_FULL.md's Open Question (iv): this is the
//! authoritative translation, not the alternate `findInit`-local variant
//! also present in the original source.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Symlink chains are walked at most this many times before being treated
/// as non-existent (§4.1: "at least 40").
const MAX_SYMLINK_DEPTH: usize = 40;

fn to_str(path: &Path) -> Result<&str, String> {
    path.to_str()
        .ok_or_else(|| format!("path {} is not valid UTF-8", path.display()))
}

/// `R` concatenated with `P`, deduplicating the join `/`. Both must be
/// absolute (guest-rooted) paths.
pub fn guest_to_host(root: &Path, path: &Path) -> Result<PathBuf, String> {
    let root_s = to_str(root)?;
    let path_s = to_str(path)?;
    if !root_s.starts_with('/') || !path_s.starts_with('/') {
        return Err(format!(
            "root path {root_s} or path {path_s} does not start with '/'"
        ));
    }
    let root_s = root_s.trim_end_matches('/');
    Ok(PathBuf::from(format!("{root_s}{path_s}")))
}

/// Inverse of [`guest_to_host`]: strips a leading `root` prefix from `path`,
/// replacing it with `/`.
pub fn host_to_guest(root: &Path, path: &Path) -> Result<PathBuf, String> {
    let root_s = to_str(root)?;
    let path_s = to_str(path)?;
    if !root_s.starts_with('/') || !path_s.starts_with('/') {
        return Err(format!(
            "root path {root_s} or path {path_s} does not start with '/'"
        ));
    }
    let root_s = if root_s.ends_with('/') {
        root_s.to_string()
    } else {
        format!("{root_s}/")
    };
    // mirrors Python's str.replace(old, new, count=1): only the first
    // occurrence of `root_s` is replaced, and only if present at all.
    let fixed = if let Some(idx) = path_s.find(&root_s) {
        let mut s = String::with_capacity(path_s.len());
        s.push_str(&path_s[..idx]);
        s.push('/');
        s.push_str(&path_s[idx + root_s.len()..]);
        s
    } else {
        path_s.to_string()
    };
    Ok(PathBuf::from(fixed))
}

/// Normalises a path that may be given as either a guest path or an
/// already-host path into a host path, without following symlinks.
fn normalise_to_host(root: &Path, path: &Path) -> Result<PathBuf, String> {
    let root_s = to_str(root)?;
    let path_s = to_str(path)?;
    if path_s.starts_with(root_s) {
        Ok(path.to_path_buf())
    } else {
        guest_to_host(root, path)
    }
}

/// Follows a symlink chain starting at `host_path`, re-translating each
/// raw (guest-rooted) target back to a host path. Returns the final host
/// path once a non-symlink is reached, or `None` if the bound is exceeded
/// (cyclic or pathologically long chain) — callers must then treat the
/// path as not existing.
fn resolve_chain(root: &Path, host_path: &Path) -> Option<PathBuf> {
    let mut current = host_path.to_path_buf();
    for _ in 0..MAX_SYMLINK_DEPTH {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&current).ok()?;
                current = guest_to_host(root, &target).ok()?;
            }
            _ => return Some(current),
        }
    }
    None
}

pub fn exists_in_guest(root: &Path, path: &Path) -> bool {
    let Ok(host) = normalise_to_host(root, path) else {
        return false;
    };
    match resolve_chain(root, &host) {
        Some(resolved) => resolved.exists(),
        None => false,
    }
}

pub fn is_file_in_guest(root: &Path, path: &Path) -> bool {
    let Ok(host) = normalise_to_host(root, path) else {
        return false;
    };
    match resolve_chain(root, &host) {
        Some(resolved) => resolved.is_file(),
        None => false,
    }
}

pub fn is_dir_in_guest(root: &Path, path: &Path) -> bool {
    let Ok(host) = normalise_to_host(root, path) else {
        return false;
    };
    match resolve_chain(root, &host) {
        Some(resolved) => resolved.is_dir(),
        None => false,
    }
}

pub fn is_file_in_guest_not_empty(root: &Path, path: &Path) -> bool {
    let Ok(host) = normalise_to_host(root, path) else {
        return false;
    };
    match resolve_chain(root, &host) {
        Some(resolved) => resolved
            .metadata()
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false),
        None => false,
    }
}

/// If `path` is a symlink, returns its target, optionally re-translated to
/// a host path; otherwise returns `path` unchanged. Does not recurse — a
/// single `readlink`, matching `guestUtils.readGuestLink`.
pub fn read_guest_link(path: &Path, root: &Path, translate_to_host: bool) -> PathBuf {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return path.to_path_buf();
    };
    if !meta.file_type().is_symlink() {
        return path.to_path_buf();
    }
    let Ok(target) = fs::read_link(path) else {
        return path.to_path_buf();
    };
    if translate_to_host {
        guest_to_host(root, &target).unwrap_or(target)
    } else {
        target
    }
}

/// Recursively changes permissions under `path`. If `path` itself is a
/// symlink the chain is resolved once and traversal proceeds from the
/// target; descendants that are symlinks are skipped rather than followed.
pub fn recursive_guest_chmod(path: &Path, mode: u32, root: &Path, add_perms: bool) {
    let host = match normalise_to_host(root, path) {
        Ok(h) => h,
        Err(_) => return,
    };
    let Some(resolved) = resolve_chain(root, &host) else {
        return;
    };
    if !resolved.exists() {
        return;
    }

    let change = |p: &Path| {
        if let Ok(meta) = fs::metadata(p) {
            let new_mode = if add_perms {
                meta.permissions().mode() | mode
            } else {
                mode
            };
            let _ = fs::set_permissions(p, fs::Permissions::from_mode(new_mode));
        }
    };

    if resolved.is_file() {
        change(&resolved);
        return;
    }

    for entry in walkdir::WalkDir::new(&resolved).into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if p == resolved {
            continue;
        }
        let Ok(symlink_meta) = fs::symlink_metadata(p) else {
            continue;
        };
        if symlink_meta.file_type().is_symlink() {
            continue;
        }
        if p.is_dir() || p.is_file() {
            change(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn round_trip_guest_host() {
        let root = Path::new("/srv/mnt/image1");
        let p = Path::new("/etc/passwd");
        let host = guest_to_host(root, p).unwrap();
        assert_eq!(host, PathBuf::from("/srv/mnt/image1/etc/passwd"));
        let guest = host_to_guest(root, &host).unwrap();
        assert_eq!(guest, p);
    }

    #[test]
    fn guest_to_host_trims_trailing_slash_on_root() {
        let root = Path::new("/srv/mnt/image1/");
        let host = guest_to_host(root, Path::new("/bin/sh")).unwrap();
        assert_eq!(host, PathBuf::from("/srv/mnt/image1/bin/sh"));
    }

    #[test]
    fn rejects_non_absolute_paths() {
        assert!(guest_to_host(Path::new("relative"), Path::new("/x")).is_err());
        assert!(guest_to_host(Path::new("/x"), Path::new("relative")).is_err());
    }

    #[test]
    fn resolves_linear_symlink_chain() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("real"), b"hi").unwrap();
        symlink("/real", root.join("link1")).unwrap();
        symlink("/link1", root.join("link2")).unwrap();

        assert!(is_file_in_guest(root, Path::new("/link2")));
        assert!(exists_in_guest(root, Path::new("/link2")));
    }

    #[test]
    fn broken_symlink_is_not_a_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        symlink("/nonexistent", root.join("broken")).unwrap();

        assert!(!is_file_in_guest(root, Path::new("/broken")));
        assert!(!exists_in_guest(root, Path::new("/broken")));
    }

    #[test]
    fn cyclic_symlink_resolves_to_nonexistent_within_bound() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        symlink("/b", root.join("a")).unwrap();
        symlink("/a", root.join("b")).unwrap();

        assert!(!exists_in_guest(root, Path::new("/a")));
        assert!(!is_file_in_guest(root, Path::new("/a")));
    }

    #[test]
    fn not_empty_predicate_distinguishes_empty_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("empty"), b"").unwrap();
        fs::write(root.join("full"), b"x").unwrap();

        assert!(!is_file_in_guest_not_empty(root, Path::new("/empty")));
        assert!(is_file_in_guest_not_empty(root, Path::new("/full")));
    }

    #[test]
    fn recursive_chmod_adds_bits_and_skips_symlinks() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("bin")).unwrap();
        fs::write(root.join("bin/tool"), b"x").unwrap();
        fs::set_permissions(root.join("bin/tool"), fs::Permissions::from_mode(0o600)).unwrap();
        symlink("/bin/tool", root.join("bin/tool_link")).unwrap();

        recursive_guest_chmod(Path::new("/bin"), 0o111, root, true);

        let mode = fs::metadata(root.join("bin/tool")).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o711);
        // the symlink itself is untouched (still a symlink, not a regular file)
        assert!(fs::symlink_metadata(root.join("bin/tool_link"))
            .unwrap()
            .file_type()
            .is_symlink());
    }
}
