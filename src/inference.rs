//! Architecture/endianness classification via the `file(1)` oracle, and
//! kernel string scanning for `Linux version ` / `init=` tokens (C4).
//!
//! Grounded on `original_source/src/util.py` (`checkArch`) and
//! `original_source/src/emulator.py` (`inferKernelVersion`).

use crate::archive_reader;
use crate::binary_inspector::strings;
use crate::common::temp;
use crate::firmware_image::{Architecture, Endianness};
use crate::process::Cmd;
use std::path::Path;

pub struct ArchResult {
    pub arch: Architecture,
    pub endianness: Endianness,
}

/// Extracts the tarball's representative executables into a scratch
/// directory named after `image_id`, classifies each with the `file(1)`
/// oracle, and returns the first non-`UNKNOWN` value found on each axis.
/// The scratch directory is always removed before returning, success or
/// failure (Open Question ii is resolved by using a `candidate` binding
/// distinct from the accumulator below, removing the shadowing ambiguity
/// present in the original).
pub fn check_arch(tarball: &Path, scratch_parent: &Path, image_id: &str) -> std::io::Result<ArchResult> {
    let scratch = temp::prepare_work_dir(scratch_parent, image_id)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let result = (|| {
        let executables = archive_reader::extract_executable_candidates(tarball, &scratch)?;

        let mut arch = Architecture::Unknown;
        let mut endianness = Endianness::Unknown;

        for exe in &executables {
            if !exe.exists() {
                continue;
            }
            let Ok(output) = Cmd::new("file").arg_path(exe).allow_fail().run() else {
                continue;
            };
            let filetype = output.stdout;

            if arch == Architecture::Unknown {
                for candidate in Architecture::ALL {
                    if filetype.contains(candidate.identifier()) {
                        arch = candidate;
                        break;
                    }
                }
            }
            if endianness == Endianness::Unknown {
                for candidate in Endianness::ALL {
                    if filetype.contains(candidate.identifier()) {
                        endianness = candidate;
                        break;
                    }
                }
            }

            if arch != Architecture::Unknown && endianness != Endianness::Unknown {
                break;
            }
        }

        Ok(ArchResult { arch, endianness })
    })();

    temp::cleanup_work_dir(&scratch);
    result
}

pub struct KernelScan {
    pub kernel_version: String,
    pub kernel_version_string: String,
    pub inferred_inits: Vec<String>,
    pub inferred_init_strings: Vec<String>,
}

/// Scans `strings(kernelBlob, 4)` for `Linux version ` and `init=` tokens.
/// Only the last matching version line survives; every `init=` candidate
/// accumulates in order (§4.4).
pub fn scan_kernel(kernel_path: &Path) -> std::io::Result<KernelScan> {
    let mut kernel_version = String::new();
    let mut kernel_version_string = String::new();
    let mut inferred_inits = Vec::new();
    let mut inferred_init_strings = Vec::new();

    for s in strings(kernel_path, 4)? {
        if let Some(rest) = s.split("Linux version ").nth(1) {
            if let Some(token) = rest.split(' ').next() {
                if !token.is_empty() {
                    kernel_version = token.to_string();
                    kernel_version_string = s.clone();
                }
            }
        } else if let Some(rest) = s.split("init=").nth(1) {
            if let Some(token) = rest.split(' ').next() {
                if !token.is_empty() {
                    inferred_inits.push(token.to_string());
                    inferred_init_strings.push(s.clone());
                }
            }
        }
    }

    Ok(KernelScan {
        kernel_version,
        kernel_version_string,
        inferred_inits,
        inferred_init_strings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn kernel_scan_picks_last_version_and_all_inits() {
        let mut f = NamedTempFile::new().unwrap();
        let blob = b"junk\x00Linux version 2.6.30 (a@b) foo\x00more junk\x00Linux version 2.6.31 (c@d) #1\x00bootargs init=/bin/sh root=/dev/sda\x00other init=/sbin/preinit extra";
        std::io::Write::write_all(&mut f, blob).unwrap();

        let scan = scan_kernel(f.path()).unwrap();
        assert_eq!(scan.kernel_version, "2.6.31");
        assert_eq!(scan.inferred_inits, vec!["/bin/sh", "/sbin/preinit"]);
    }

    #[test]
    fn kernel_scan_empty_when_no_matches() {
        let mut f = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"nothing interesting here at all").unwrap();
        let scan = scan_kernel(f.path()).unwrap();
        assert!(scan.kernel_version.is_empty());
        assert!(scan.inferred_inits.is_empty());
    }
}
