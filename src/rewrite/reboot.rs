//! Removes the binaries a rehosted image would use to reboot or factory
//! reset the (nonexistent) hardware out from under the emulator.
//!
//! Grounded on `original_source/src/prepareImage.py`'s `preventReboot`.

use crate::path_algebra::{exists_in_guest, guest_to_host};
use anyhow::Result;
use std::path::Path;

const REBOOT_PATHS: [&str; 2] = ["/sbin/reboot", "/etc/scripts/sys_resetbutton"];

pub fn prevent_reboot(root: &Path) -> Result<()> {
    for path in REBOOT_PATHS {
        if exists_in_guest(root, Path::new(path)) {
            let host = guest_to_host(root, Path::new(path)).map_err(anyhow::Error::msg)?;
            std::fs::remove_file(host)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_present_reboot_binaries_only() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sbin")).unwrap();
        std::fs::write(dir.path().join("sbin/reboot"), b"bin").unwrap();

        prevent_reboot(dir.path()).unwrap();

        assert!(!dir.path().join("sbin/reboot").exists());
    }
}
