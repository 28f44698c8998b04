//! The rehosting rewrite: the fixed-order sub-steps (a)-(h) that turn a
//! recovered rootfs into something Firmadyne/QEMU can boot (C8).
//!
//! Grounded directly on `original_source/src/prepareImage.py`'s
//! `prepareImage` orchestration. Each sub-step lives in its own file here,
//! mirroring the original's function-per-concern layout.

mod devices;
mod essential_files;
mod fixups;
mod init;
mod nvram;
mod reboot;
mod service;

use std::collections::HashMap;
use std::path::Path;

pub use init::{init_firmadyne, validate_inits};
pub use service::find_services;

/// Runs the full rewrite sequence against a mounted rootfs at `root`, in
/// the fixed order mandated by §4.8: Firmadyne skeleton, init-list
/// synthesis, service discovery, filesystem fixups, essential files and
/// device nodes, NVRAM pre-seeding, reboot prevention. Returns the
/// verified init list and discovered services.
pub fn prepare_image(
    root: &Path,
    possible_inits: &[String],
) -> anyhow::Result<(Vec<String>, HashMap<String, String>)> {
    if !root.exists() {
        anyhow::bail!("root path {} does not exist", root.display());
    }

    init::init_firmadyne(root)?;
    let verified_inits = init::validate_inits(root, possible_inits)?;
    let found_services = service::find_services(root)?;
    fixups::fix_file_system(root)?;
    nvram::add_nvram_entries(root)?;
    reboot::prevent_reboot(root)?;

    Ok((verified_inits, found_services))
}
