//! Raw block image construction: sparse file, DOS partition table, ext2
//! filesystem, loop-device attach/mount lifecycle (C6).
//!
//! Grounded on `original_source/src/util.py` (`createRawImg`, `dd`,
//! `addPartition`, `mountImage`, `removePartition`, `unmountImage`,
//! `runFsck`, `runAsRoot`). The loop-device RAII wrapper shape is borrowed
//! from bootc's `blockdev.rs`.

use crate::process::Cmd;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `losetup`/`mount` operate on process-wide kernel state; serializing
/// their critical sections avoids racing another in-flight image build in
/// the same process for a free loop device.
static LOOP_MUTEX: Mutex<()> = Mutex::new(());

const SECTOR_SIZE: u64 = 512;
const PARTITION_OFFSET_BYTES: u64 = 1024 * 1024; // 1 MiB, matches mke2fs -E offset=1048576

fn run_as_root(program: &str, args: &[&str]) -> Result<crate::process::CommandResult> {
    Cmd::new("sudo")
        .arg(program)
        .args(args)
        .error_msg(format!("'{program}' (as root) failed"))
        .run()
}

/// Creates a zero-filled sparse file of `size_bytes`, partitions it with a
/// single DOS-labeled Linux partition, and formats that partition ext2.
/// Fails if `path` already exists (§4.6 step 1): callers must guarantee a
/// fresh work directory, same as the Firmadyne skeleton invariant in C8(a).
pub fn create_raw_img(path: &Path, size_bytes: u64) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("raw image {} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let count = size_bytes / SECTOR_SIZE;
    Cmd::new("dd")
        .arg("if=/dev/zero")
        .arg(format!("of={}", path.display()))
        .arg(format!("bs={SECTOR_SIZE}"))
        .arg(format!("count={count}"))
        .error_msg("failed to zero-fill raw image")
        .run()?;

    Cmd::new("sfdisk")
        .arg("--no-reread")
        .arg("--force")
        .arg_path(path)
        .stdin("label: dos\ntype=83\n")
        .error_msg("failed to partition raw image")
        .run()?;

    // `offset=1048576` tells mke2fs where the filesystem starts *within the
    // file it's given*; since the DOS partition already begins at that same
    // 1 MiB boundary, this runs against the raw image itself, not the
    // loop-attached `p1` node (which would double-apply the offset).
    Cmd::new("mke2fs")
        .arg("-E")
        .arg("root_owner=1000:1000,offset=1048576")
        .arg_path(path)
        .error_msg("failed to format ext2 partition")
        .run()?;

    Ok(())
}

/// An attached loop device, released on drop. `partition_path()` assumes a
/// single partition at offset 1 (`<dev>p1`), matching [`create_raw_img`]'s
/// layout.
pub struct LoopbackDevice {
    device_path: PathBuf,
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl LoopbackDevice {
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn partition_path(&self) -> PathBuf {
        PathBuf::from(format!("{}p1", self.device_path.display()))
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        let _ = run_as_root("losetup", &["-d", &self.device_path.to_string_lossy()]);
    }
}

fn attach(path: &Path) -> Result<LoopbackDevice> {
    let guard = LOOP_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let out = run_as_root("losetup", &["-Pf", "--show", &path.to_string_lossy()])
        .context("losetup -Pf failed to attach the raw image")?;
    let device_path = PathBuf::from(out.stdout_trimmed());
    if device_path.as_os_str().is_empty() {
        return Err(anyhow!("losetup did not report an attached device"));
    }
    Ok(LoopbackDevice {
        device_path,
        _guard: guard,
    })
}

/// Attaches `path` as a loop device for the duration of `f`, detaching it
/// (best-effort) on every exit path including early returns via `?`.
pub fn attach_loop<T>(path: &Path, f: impl FnOnce(&LoopbackDevice) -> Result<T>) -> Result<T> {
    let dev = attach(path)?;
    f(&dev)
}

/// Finds the loop device currently backed by `path`, for reattaching to an
/// image whose device we didn't create in this call (§4.6: `losetup -j`).
pub fn find_attached(path: &Path) -> Result<Option<PathBuf>> {
    let out = Cmd::new("losetup")
        .arg("-j")
        .arg_path(path)
        .allow_fail()
        .run()?;
    if !out.success() {
        return Ok(None);
    }
    let line = out.stdout_trimmed();
    Ok(line.split(':').next().map(PathBuf::from).filter(|p| !p.as_os_str().is_empty()))
}

/// Mounts `partition` at `mount_point`, creating the mount point directory
/// if necessary, and syncs before returning so callers (C7) see a
/// filesystem that is guaranteed to have its mount fully settled (§4.6
/// step 2, §5 ordering guarantee).
pub fn mount_image(partition: &Path, mount_point: &Path) -> Result<()> {
    std::fs::create_dir_all(mount_point)?;
    run_as_root(
        "mount",
        &[&partition.to_string_lossy(), &mount_point.to_string_lossy()],
    )
    .context("failed to mount partition")?;
    nix::unistd::sync();
    Ok(())
}

pub fn unmount_image(mount_point: &Path) -> Result<()> {
    run_as_root("umount", &[&mount_point.to_string_lossy()])
        .context("failed to unmount partition")?;
    Ok(())
}

/// Runs `e2fsck -y` against `raw_path`'s partition, refusing to proceed if
/// the image is already loop-attached (mounted or otherwise in use) and
/// attaching/detaching the loop device itself for the duration of the
/// check. Tolerates the "filesystem was fixed" exit codes (1/2) that
/// `fsck.ext2` uses for a non-fatal clean-up.
pub fn run_fsck(raw_path: &Path) -> Result<()> {
    if !raw_path.exists() {
        return Err(anyhow!("raw image {} does not exist", raw_path.display()));
    }
    if let Some(existing) = find_attached(raw_path)? {
        return Err(anyhow!(
            "raw image {} is currently mounted or used by loop device {}; unmount it before running fsck",
            raw_path.display(),
            existing.display()
        ));
    }

    attach_loop(raw_path, |dev| {
        let partition = dev.partition_path();
        let out = Cmd::new("sudo")
            .arg("e2fsck")
            .arg("-y")
            .arg_path(&partition)
            .allow_fail()
            .run()?;
        match out.code() {
            0 | 1 | 2 => Ok(()),
            code => Err(anyhow!(
                "e2fsck failed on {} (exit code {code}): {}",
                partition.display(),
                out.stderr_trimmed()
            )),
        }
    })
}
