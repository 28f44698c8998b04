//! End-to-end scenarios straight out of the spec's testable-properties
//! section: rootfs tarball -> materialised directory -> full C8 rewrite,
//! exercised without a real loop-mounted image (the rewrite only cares
//! that `root` is a directory on disk, so a tempdir stands in for the
//! mount point).

mod helpers;

use helpers::{assert_file_contains, assert_symlink, build_tarball, MountedRootfs};
use rehost_prep::rootfs_materialiser;
use rehost_prep::rewrite;
use std::fs;

#[test]
fn init_list_repairs_broken_symlink_and_falls_back_to_preinit() {
    let env = MountedRootfs::new();
    let tarball = env.root.join("rootfs.tar.gz");

    build_tarball(
        &tarball,
        &[("./usr/sbin/busybox", b"busybox binary", 0o755)],
        &[("./sbin/init", "/bin/busybox")],
    );

    let mount = env.root.join("mnt");
    fs::create_dir_all(&mount).unwrap();
    rootfs_materialiser::materialise(&tarball, &mount).unwrap();

    let (verified, _services) = rewrite::prepare_image(&mount, &["/sbin/init".to_string()]).unwrap();

    assert_eq!(
        verified,
        vec!["/sbin/init".to_string(), "/firmadyne/preInit.sh".to_string()]
    );

    let init_list = fs::read_to_string(mount.join("firmadyne/init")).unwrap();
    assert_eq!(init_list, "/sbin/init\n/firmadyne/preInit.sh\n");
    assert!(init_list.ends_with("/firmadyne/preInit.sh\n"));

    // the broken symlink was repaired to point at the basename match found
    // under a conventional search directory.
    assert_symlink(&mount.join("sbin/init"), "/usr/sbin/busybox");
}

#[test]
fn service_selection_picks_first_table_entry_present() {
    let env = MountedRootfs::new();
    let tarball = env.root.join("rootfs.tar.gz");

    build_tarball(
        &tarball,
        &[
            ("./usr/sbin/httpd", b"httpd binary", 0o755),
            ("./bin/goahead", b"goahead binary", 0o755),
        ],
        &[],
    );

    let mount = env.root.join("mnt");
    fs::create_dir_all(&mount).unwrap();
    rootfs_materialiser::materialise(&tarball, &mount).unwrap();

    let (_verified, services) = rewrite::prepare_image(&mount, &[]).unwrap();

    assert_eq!(services.len(), 2);
    assert_file_contains(&mount.join("firmadyne/service"), "/usr/sbin/httpd");
    assert_file_contains(&mount.join("firmadyne/service_name"), "httpd");
}

#[test]
fn full_rewrite_pipeline_produces_expected_artifacts_in_order() {
    let env = MountedRootfs::new();
    let tarball = env.root.join("rootfs.tar.gz");

    build_tarball(
        &tarball,
        &[
            ("./bin/busybox", b"busybox binary", 0o755),
            (
                "./usr/sbin/httpd",
                b"this httpd reads rip_multicast from nvram at boot",
                0o755,
            ),
        ],
        &[],
    );

    let mount = env.root.join("mnt");
    fs::create_dir_all(&mount).unwrap();
    rootfs_materialiser::materialise(&tarball, &mount).unwrap();

    let (verified, services) = rewrite::prepare_image(&mount, &[]).unwrap();

    // (a) Firmadyne skeleton
    assert!(mount.join("firmadyne/libnvram").is_dir());
    assert!(mount.join("firmadyne/libnvram.override").is_dir());

    // (b) init falls back to preInit.sh alone when nothing else is found
    assert_eq!(verified, vec!["/firmadyne/preInit.sh".to_string()]);

    // (c) service discovery found httpd
    assert_eq!(services.len(), 1);

    // (d) fixed directory set and busybox shell symlinks
    for dir in ["proc", "tmp/home/root", "var/run", "usr/bin"] {
        assert!(mount.join(dir).is_dir(), "missing fixed dir {dir}");
    }
    assert_symlink(&mount.join("bin/sh"), "/firmadyne/busybox");
    assert_symlink(&mount.join("firmadyne/sh"), "/firmadyne/busybox");

    // (e) essential files
    assert_file_contains(&mount.join("etc/TZ"), "EST5EDT");
    assert_file_contains(&mount.join("etc/hosts"), "127.0.0.1 localhost");
    assert_file_contains(&mount.join("etc/passwd"), "root::0:0:root:/root:/bin/sh");

    // (g) nvram pre-seeding triggered by the scanned httpd string
    assert_file_contains(&mount.join("firmadyne/libnvram.override/rip_multicast"), "0");

    // (h) reboot prevention is a no-op here since neither binary was present
    assert!(!mount.join("sbin/reboot").exists());
}

#[test]
fn rewrite_refuses_to_run_twice_against_the_same_mount() {
    let env = MountedRootfs::new();
    fs::create_dir_all(&env.root).unwrap();

    rewrite::prepare_image(&env.root, &[]).unwrap();
    let second = rewrite::prepare_image(&env.root, &[]);
    assert!(second.is_err(), "second run should fail: firmadyne skeleton already exists");
}
