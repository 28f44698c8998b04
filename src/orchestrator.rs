//! The pipeline state machine: `Init → Extracted → Inspected → Compatible →
//! Catalogued → Materialised → Rewritten → Done`, with `Failed(stage)`
//! transitions and stage-appropriate cleanup (C9).
//!
//! Grounded on `original_source/src/emulator.py`'s `Emulator.run` (and its
//! commented-out continuation past cataloguing, which is exactly what
//! §4.9 asks this implementation to complete).

use crate::archive_reader;
use crate::binary_inspector::md5_file;
use crate::catalog::Catalog;
use crate::config::{Config, RunMode};
use crate::error::RehostError;
use crate::extractor;
use crate::firmware_image::{is_compatible, FirmwareImage};
use crate::image_builder;
use crate::inference;
use crate::rewrite;
use crate::rootfs_materialiser;
use serde::Serialize;
use std::path::Path;

const RAW_IMAGE_SIZE_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB, per GIGA in the original

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    Extracted,
    Inspected,
    Compatible,
    Catalogued,
    Materialised,
    Rewritten,
    Done,
}

pub struct Outcome {
    pub stage_reached: Stage,
    pub image: FirmwareImage,
}

/// Drives `image` through the full state machine for the configured run
/// mode, stopping early for `check`/`analyze` as described in §2's
/// "Supplemented features".
pub async fn run(config: &Config, catalog: &Catalog) -> Result<Outcome, RehostError> {
    std::fs::create_dir_all(config.images_dir())?;
    std::fs::create_dir_all(config.work_dir())?;

    let hash = md5_file(&config.input)?;

    let brand = if config.brand == "auto" {
        match catalog.lookup_brand(&hash).await {
            Ok(Some(b)) => b,
            Ok(None) => "unknown".to_string(),
            Err(e) => {
                tracing::warn!("brand lookup failed, defaulting to unknown: {e}");
                "unknown".to_string()
            }
        }
    } else {
        config.brand.clone()
    };

    let mut image = FirmwareImage::new(config.input.clone(), config.output.clone(), brand, hash);

    // --- Extracted ---
    let extract_result = extractor::extract(&image.input_path, &image.images_dir, false, true, &image.brand)
        .map_err(|e| RehostError::Extraction {
            input: image.input_path.clone(),
            reason: e.to_string(),
        })?;
    if !extract_result.status {
        return Err(RehostError::Extraction {
            input: image.input_path.clone(),
            reason: "extractor reported failure extracting the root filesystem".to_string(),
        });
    }
    image.iid = Some(extract_result.tag.clone());
    image.rootfs_tarball_path = extract_result.rootfs_path.clone();

    let kernel_result = extractor::extract(&image.input_path, &image.images_dir, true, false, &image.brand)
        .map_err(|e| RehostError::Extraction {
            input: image.input_path.clone(),
            reason: e.to_string(),
        })?;
    if !kernel_result.status {
        cleanup_extracted(&image);
        return Err(RehostError::Extraction {
            input: image.input_path.clone(),
            reason: "extractor reported failure extracting the kernel".to_string(),
        });
    }
    image.kernel_path = kernel_result.kernel_path.clone();

    let (Some(rootfs_tarball), Some(kernel_path)) =
        (image.rootfs_tarball_path.clone(), image.kernel_path.clone())
    else {
        cleanup_extracted(&image);
        return Err(RehostError::Extraction {
            input: image.input_path.clone(),
            reason: "extractor did not report both a kernel and a rootfs path".to_string(),
        });
    };

    // --- Inspected ---
    let iid = image.iid.clone().expect("set above");
    let arch_result = inference::check_arch(&rootfs_tarball, &image.work_dir, &iid)?;
    image.arch = arch_result.arch;
    image.endianness = arch_result.endianness;

    let kernel_scan = inference::scan_kernel(&kernel_path)?;
    image.kernel_version = kernel_scan.kernel_version;
    image.kernel_version_string = kernel_scan.kernel_version_string;
    image.inferred_inits = kernel_scan.inferred_inits;
    image.inferred_init_strings = kernel_scan.inferred_init_strings;

    if image.arch == crate::firmware_image::Architecture::Unknown
        || image.endianness == crate::firmware_image::Endianness::Unknown
    {
        cleanup_extracted(&image);
        return Err(RehostError::Inference {
            image: image.input_path.clone(),
        });
    }

    if let Err(e) = catalog.update_image_field(&iid, "arch", &format!("{}{}", image.arch, image.endianness)).await {
        tracing::warn!("catalog update of arch failed (non-fatal): {e}");
    }
    if !image.kernel_version.is_empty() {
        if let Err(e) = catalog.update_image_field(&iid, "kernel_version", &image.kernel_version).await {
            tracing::warn!("catalog update of kernel_version failed (non-fatal): {e}");
        }
    }

    // --- Compatible ---
    if !is_compatible(image.arch, image.endianness) {
        cleanup_extracted(&image);
        return Err(RehostError::IncompatibleTarget {
            arch: image.arch,
            endianness: image.endianness,
        });
    }

    if config.mode == RunMode::Check {
        return Ok(Outcome { stage_reached: Stage::Compatible, image });
    }

    // --- Catalogued ---
    if let Err(e) = dump_objects_to_catalog(catalog, &iid, &rootfs_tarball).await {
        tracing::warn!("catalog dump failed (non-fatal per §7): {e}");
    }

    if config.mode == RunMode::Analyze {
        return Ok(Outcome { stage_reached: Stage::Catalogued, image });
    }

    // --- Materialised ---
    let scratch = image.scratch_dir().expect("iid set above");
    std::fs::create_dir_all(&scratch)?;
    let raw_image_path = image.raw_image_path().expect("iid set above");
    let mount_point = image.mount_point().expect("iid set above");

    image_builder::create_raw_img(&raw_image_path, RAW_IMAGE_SIZE_BYTES).map_err(|e| {
        RehostError::ImageBuild { stage: "create_raw_img".to_string(), reason: e.to_string() }
    })?;

    let inferred_inits = image.inferred_inits.clone();
    let mut verified_inits = Vec::new();
    let leave_mounted = config.mode == RunMode::Debug;

    let materialise_result: anyhow::Result<()> = image_builder::attach_loop(&raw_image_path, |dev| {
        image_builder::mount_image(&dev.partition_path(), &mount_point)?;
        rootfs_materialiser::materialise(&rootfs_tarball, &mount_point)?;

        // --- Rewritten ---
        let (inits, _services) = rewrite::prepare_image(&mount_point, &inferred_inits)?;
        verified_inits = inits;

        if !leave_mounted {
            image_builder::unmount_image(&mount_point)?;
        }
        Ok(())
    });

    if let Err(e) = materialise_result {
        if !leave_mounted {
            let _ = image_builder::unmount_image(&mount_point);
            let _ = std::fs::remove_file(&raw_image_path);
        }
        return Err(RehostError::ImageBuild {
            stage: "materialise_and_rewrite".to_string(),
            reason: e.to_string(),
        });
    }

    image.verified_inits = verified_inits;

    Ok(Outcome { stage_reached: Stage::Done, image })
}

async fn dump_objects_to_catalog(
    catalog: &Catalog,
    iid: &str,
    rootfs_tarball: &Path,
) -> anyhow::Result<()> {
    if !catalog.is_enabled() {
        return Ok(());
    }
    let files = archive_reader::read_files(rootfs_tarball)?;
    let links = archive_reader::read_links(rootfs_tarball)?;
    let hashes: Vec<String> = files.iter().map(|f| f.md5.clone()).collect();
    let (object_ids, _missing) = catalog.ensure_objects(&hashes, true).await?;
    catalog.insert_objects_to_image(iid, &object_ids, &files).await?;
    catalog.insert_links_to_image(iid, &links).await?;
    Ok(())
}

fn cleanup_extracted(image: &FirmwareImage) {
    if let Some(rootfs) = &image.rootfs_tarball_path {
        let _ = std::fs::remove_file(rootfs);
    }
}
