//! Closed-set architecture/endianness classification and the per-image
//! runtime state threaded through the pipeline.
//!
//! Grounded on `original_source/src/common.py`'s `Architecture`/`Endianess`
//! enums and `original_source/src/emulator.py`'s `Emulator` field set.

use serde::Serialize;
use std::path::PathBuf;

/// CPU family, closed set. Declaration order matters: it is the scan order
/// used by `file(1)` output matching in C4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Architecture {
    Mips,
    Mips64,
    Arm,
    Arm64,
    Intel80386,
    X86_64,
    PowerPc,
    Unknown,
}

impl Architecture {
    pub const ALL: [Architecture; 8] = [
        Architecture::Mips,
        Architecture::Mips64,
        Architecture::Arm,
        Architecture::Arm64,
        Architecture::Intel80386,
        Architecture::X86_64,
        Architecture::PowerPc,
        Architecture::Unknown,
    ];

    /// Canonical identifier matched against `file(1)` output.
    pub fn identifier(&self) -> &'static str {
        match self {
            Architecture::Mips => "MIPS",
            Architecture::Mips64 => "MIPS64",
            Architecture::Arm => "ARM",
            Architecture::Arm64 => "ARM64",
            Architecture::Intel80386 => "Intel 80386",
            Architecture::X86_64 => "x86-64",
            Architecture::PowerPc => "PowerPC",
            Architecture::Unknown => "UNKNOWN",
        }
    }

    /// Short tag used in composite names (e.g. catalog `arch` column).
    pub fn tag(&self) -> &'static str {
        match self {
            Architecture::Mips => "mips",
            Architecture::Mips64 => "mips64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::Intel80386 => "intel",
            Architecture::X86_64 => "intel64",
            Architecture::PowerPc => "powerpc",
            Architecture::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Byte order, closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endianness {
    Little,
    Big,
    Unknown,
}

impl Endianness {
    pub const ALL: [Endianness; 3] = [Endianness::Little, Endianness::Big, Endianness::Unknown];

    pub fn identifier(&self) -> &'static str {
        match self {
            Endianness::Little => "LSB",
            Endianness::Big => "MSB",
            Endianness::Unknown => "UNKNOWN",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Endianness::Little => "el",
            Endianness::Big => "eb",
            Endianness::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// The hard-coded emulation-compatible `(arch, endianness)` pairs (§3).
pub const COMPATIBLE_TARGETS: [(Architecture, Endianness); 3] = [
    (Architecture::Mips, Endianness::Little),
    (Architecture::Mips, Endianness::Big),
    (Architecture::Arm, Endianness::Little),
];

pub fn is_compatible(arch: Architecture, endianness: Endianness) -> bool {
    if arch == Architecture::Unknown || endianness == Endianness::Unknown {
        return false;
    }
    COMPATIBLE_TARGETS
        .iter()
        .any(|&(a, e)| a == arch && e == endianness)
}

/// `(name, md5, uid, gid, mode)` for a regular file recovered from the
/// rootfs tarball. Guest-rooted (leading `/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub md5: String,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// `(name, target)` for a symlink recovered from the rootfs tarball.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub name: String,
    pub target: String,
}

/// The per-image runtime object (§3). Fields are filled monotonically as
/// the orchestrator advances through its state machine; nothing is ever
/// cleared once set.
#[derive(Debug, Clone, Serialize)]
pub struct FirmwareImage {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub images_dir: PathBuf,
    pub work_dir: PathBuf,
    pub brand: String,
    pub hash: String,

    pub iid: Option<String>,
    pub kernel_path: Option<PathBuf>,
    pub rootfs_tarball_path: Option<PathBuf>,

    pub arch: Architecture,
    pub endianness: Endianness,

    pub kernel_version: String,
    pub kernel_version_string: String,
    pub inferred_inits: Vec<String>,
    pub inferred_init_strings: Vec<String>,
    pub verified_inits: Vec<String>,
}

impl FirmwareImage {
    pub fn new(input_path: PathBuf, output_path: PathBuf, brand: String, hash: String) -> Self {
        let images_dir = output_path.join("images");
        let work_dir = output_path.join("workDir");
        Self {
            input_path,
            output_path,
            images_dir,
            work_dir,
            brand,
            hash,
            iid: None,
            kernel_path: None,
            rootfs_tarball_path: None,
            arch: Architecture::Unknown,
            endianness: Endianness::Unknown,
            kernel_version: String::new(),
            kernel_version_string: String::new(),
            inferred_inits: Vec::new(),
            inferred_init_strings: Vec::new(),
            verified_inits: Vec::new(),
        }
    }

    /// Per-image scratch directory, created on first use by the component
    /// that needs it (§6: `workDir/<iid>/...`).
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.iid.as_ref().map(|iid| self.work_dir.join(iid))
    }

    pub fn raw_image_path(&self) -> Option<PathBuf> {
        self.scratch_dir().map(|d| d.join("raw.img"))
    }

    pub fn mount_point(&self) -> Option<PathBuf> {
        self.scratch_dir().map(|d| d.join("mnt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_targets_match_spec() {
        assert!(is_compatible(Architecture::Mips, Endianness::Little));
        assert!(is_compatible(Architecture::Mips, Endianness::Big));
        assert!(is_compatible(Architecture::Arm, Endianness::Little));
        assert!(!is_compatible(Architecture::Arm, Endianness::Big));
        assert!(!is_compatible(Architecture::X86_64, Endianness::Little));
    }

    #[test]
    fn unknown_is_never_compatible() {
        assert!(!is_compatible(Architecture::Unknown, Endianness::Little));
        assert!(!is_compatible(Architecture::Mips, Endianness::Unknown));
    }

    #[test]
    fn scratch_dir_requires_iid() {
        let img = FirmwareImage::new(
            PathBuf::from("/tmp/fw.bin"),
            PathBuf::from("/tmp/out"),
            "unknown".into(),
            "abc123".into(),
        );
        assert!(img.scratch_dir().is_none());
    }
}
