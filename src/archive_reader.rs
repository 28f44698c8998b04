//! Enumerates regular files and symlinks in the recovered rootfs tarball,
//! streaming content for hashing rather than holding the archive in memory
//! (C3).
//!
//! Grounded on `original_source/src/util.py` (`getFilesInfo`, `getLinksInfo`,
//! the executable-name matching embedded in `checkArch`).

use crate::firmware_image::{FileRecord, LinkRecord};
use flate2::read::GzDecoder;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;

/// Binary basenames that make an archive member a "representative
/// executable" candidate for C4's arch/endianness inference, independent of
/// its directory.
const EXECUTABLE_NAME_HINTS: [&str; 7] = [
    "busybox", "alphapd", "boa", "http", "hydra", "helia", "webs",
];

fn strip_leading_dot(name: &str) -> String {
    if let Some(stripped) = name.strip_prefix('.') {
        if stripped.starts_with('/') {
            return stripped.to_string();
        }
    }
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// Every regular file in the tarball as a `(guestName, md5, uid, gid, mode)`
/// record, in archive order.
pub fn read_files(tarball: &Path) -> std::io::Result<Vec<FileRecord>> {
    let mut archive = open(tarball)?;
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = strip_leading_dot(&entry.path()?.to_string_lossy());
        let uid = entry.header().uid().unwrap_or(0) as u32;
        let gid = entry.header().gid().unwrap_or(0) as u32;
        let mode = entry.header().mode().unwrap_or(0o644);

        let mut hasher = Md5::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = entry.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        out.push(FileRecord {
            name,
            md5: format!("{:x}", hasher.finalize()),
            uid,
            gid,
            mode,
        });
    }
    Ok(out)
}

/// Every symlink in the tarball as a `(guestName, rawTarget)` record.
pub fn read_links(tarball: &Path) -> std::io::Result<Vec<LinkRecord>> {
    let mut archive = open(tarball)?;
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_symlink() {
            continue;
        }
        let name = strip_leading_dot(&entry.path()?.to_string_lossy());
        let target = entry
            .link_name()?
            .map(|t| t.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push(LinkRecord { name, target });
    }
    Ok(out)
}

/// True if `member_name` should be considered a representative executable
/// for arch/endianness inference: it matches one of the known binary-name
/// hints, or lives under a `bin`/`sbin` directory.
pub fn is_executable_candidate(member_name: &str) -> bool {
    EXECUTABLE_NAME_HINTS
        .iter()
        .any(|hint| member_name.contains(hint))
        || member_name.contains("/sbin/")
        || member_name.contains("/bin/")
}

/// Extracts every member matching [`is_executable_candidate`] into
/// `dest_dir`, returning their extracted host paths. Used by C4 to build
/// the scratch directory it feeds to the `file(1)` oracle.
pub fn extract_executable_candidates(
    tarball: &Path,
    dest_dir: &Path,
) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut archive = open(tarball)?;
    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        if !is_executable_candidate(&name) {
            continue;
        }
        entry.unpack_in(dest_dir)?;
        extracted.push(dest_dir.join(&name));
    }
    Ok(extracted)
}

fn open(tarball: &Path) -> std::io::Result<Archive<GzDecoder<File>>> {
    let file = File::open(tarball)?;
    Ok(Archive::new(GzDecoder::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::{Builder, Header};
    use tempfile::tempdir;

    fn make_tarball(path: &Path) {
        let file = File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(enc);

        let mut header = Header::new_gnu();
        header.set_path("./bin/busybox").unwrap();
        header.set_size(5);
        header.set_mode(0o755);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        builder.append(&header, &b"hello"[..]).unwrap();

        builder
            .append_link(
                &{
                    let mut h = Header::new_gnu();
                    h.set_path("./sbin/init").unwrap();
                    h.set_entry_type(tar::EntryType::Symlink);
                    h.set_size(0);
                    h.set_cksum();
                    h
                },
                "./sbin/init",
                "/bin/busybox",
            )
            .unwrap();

        builder.finish().unwrap();
    }

    #[test]
    fn enumerates_files_and_links() {
        let dir = tempdir().unwrap();
        let tarball = dir.path().join("rootfs.tar.gz");
        make_tarball(&tarball);

        let files = read_files(&tarball).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "/bin/busybox");
        assert_eq!(files[0].md5, "5d41402abc4b2a76b9719d911017c592");

        let links = read_links(&tarball).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "/sbin/init");
        assert_eq!(links[0].target, "/bin/busybox");
    }

    #[test]
    fn executable_candidate_matches_hint_or_bin_path() {
        assert!(is_executable_candidate("./bin/busybox"));
        assert!(is_executable_candidate("./usr/sbin/httpd"));
        assert!(is_executable_candidate("./www/cgi-bin/webs"));
        assert!(!is_executable_candidate("./etc/passwd"));
    }
}
