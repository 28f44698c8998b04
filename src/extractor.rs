//! Subprocess adapter for the external firmware extractor (§6): no such
//! extractor ships in this repo, so the original's in-process Python call
//! is mirrored through a process boundary and a small JSON protocol.
//!
//! Grounded on `original_source/src/emulator.py`'s `extract` (two-phase
//! filesystem-then-kernel calls) and §6's documented JSON result shape.

use crate::process::Cmd;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ExtractResult {
    pub status: bool,
    pub tag: String,
    #[serde(rename = "kernelPath")]
    pub kernel_path: Option<PathBuf>,
    #[serde(rename = "rootfsPath")]
    pub rootfs_path: Option<PathBuf>,
}

/// Invokes the extractor for `input`, requesting only the artifact named
/// by `want_kernel`/`want_filesystem`, matching the original's two
/// separate calls (filesystem first, then kernel).
pub fn extract(
    input: &Path,
    images_dir: &Path,
    want_kernel: bool,
    want_filesystem: bool,
    brand: &str,
) -> anyhow::Result<ExtractResult> {
    let output = Cmd::new("firmware-extractor")
        .arg_path(input)
        .arg_path(images_dir)
        .arg(format!("--kernel={want_kernel}"))
        .arg(format!("--filesystem={want_filesystem}"))
        .arg("--brand")
        .arg(brand)
        .error_msg("firmware extractor subprocess failed")
        .run()?;

    let result: ExtractResult = serde_json::from_str(output.stdout_trimmed())
        .map_err(|e| anyhow::anyhow!("could not parse extractor output: {e}"))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_result() {
        let json = r#"{"status": true, "tag": "abc123", "kernelPath": "/images/abc123/kernel", "rootfsPath": "/images/abc123/rootfs.tar.gz"}"#;
        let result: ExtractResult = serde_json::from_str(json).unwrap();
        assert!(result.status);
        assert_eq!(result.tag, "abc123");
        assert_eq!(result.kernel_path, Some(PathBuf::from("/images/abc123/kernel")));
    }

    #[test]
    fn parses_failure_result_without_paths() {
        let json = r#"{"status": false, "tag": "abc123"}"#;
        let result: ExtractResult = serde_json::from_str(json).unwrap();
        assert!(!result.status);
        assert!(result.kernel_path.is_none());
    }
}
