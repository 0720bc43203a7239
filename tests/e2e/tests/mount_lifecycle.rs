//! Mount, per-mount config patching and unmount cleanup
//!
//! Runs the FUSE client and umount fakes and checks the files the driver
//! leaves on disk at each step.

use anyhow::Result;
use curvefs_csi::conf::{ConfFile, CACHE_DIR_KEY, CACHE_TYPE_KEY};
use curvefs_csi::Code;
use curvefs_csi_e2e::{params, DriverHarness, FakeBinary, BASE_CLIENT_CONF};
use std::path::Path;
use std::time::Duration;

fn s3_mount_params() -> curvefs_csi::params::Params {
    params(&[("mdsAddr", "10.0.0.1:6700"), ("fsType", "s3")])
}

fn cache_flags() -> Vec<String> {
    vec![
        format!("{}=2", CACHE_TYPE_KEY),
        format!("{}=/data/cache:100GB;/data2/cache", CACHE_DIR_KEY),
        "fuseClient.attrTimeOut=60".to_string(),
        "s3.blocksize=4M".to_string(),
    ]
}

#[tokio::test]
async fn test_mount_passes_fixed_and_per_key_options() -> Result<()> {
    let harness = DriverHarness::new()?;
    let mounter = harness.mounter();
    mounter
        .mount_fs("fs1", Path::new("/mnt/fs1"), &s3_mount_params(), None, "abc")
        .await?;

    let runs = harness.invocations(FakeBinary::Client)?;
    assert_eq!(runs.len(), 1);
    assert_eq!(
        runs[0],
        vec![
            "-o".to_string(),
            "default_permissions".to_string(),
            "-o".to_string(),
            "allow_other".to_string(),
            "--mdsaddr=10.0.0.1:6700".to_string(),
            "-o".to_string(),
            format!("conf={}", harness.base_client_conf().display()),
            "-o".to_string(),
            "fstype=s3".to_string(),
            "-o".to_string(),
            "fsname=fs1".to_string(),
            "/mnt/fs1".to_string(),
        ]
    );
    assert!(!harness.mount_conf("abc").exists());
    assert_eq!(mounter.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_mount_flags_produce_patched_copy() -> Result<()> {
    let harness = DriverHarness::new()?;
    let flags = cache_flags();
    harness
        .mounter()
        .mount_fs(
            "fs1",
            Path::new("/mnt/fs1"),
            &s3_mount_params(),
            Some(flags.as_slice()),
            "abc",
        )
        .await?;

    // Base config is left alone
    assert_eq!(
        std::fs::read_to_string(harness.base_client_conf())?,
        BASE_CLIENT_CONF
    );

    let per_mount = harness.mount_conf("abc");
    let content = std::fs::read_to_string(&per_mount)?;
    let expected = BASE_CLIENT_CONF
        .replace("attrTimeOut=30", "attrTimeOut=60")
        .replace("diskCacheType=0", "diskCacheType=2")
        .replace(
            "cache_dir=/curvefs/client/data/cache",
            "cache_dir=/data/cache/abc:100GB;/data2/cache/abc",
        )
        + "s3.blocksize=4M\n";
    assert_eq!(content, expected);

    assert!(harness.mount_cache_dir("abc").is_dir());

    let runs = harness.invocations(FakeBinary::Client)?;
    assert!(runs[0].contains(&format!("conf={}", per_mount.display())));
    Ok(())
}

#[tokio::test]
async fn test_cache_without_dir_flag_gets_own_cache_dir() -> Result<()> {
    let harness = DriverHarness::new()?;
    let flags = vec![format!("{}=2", CACHE_TYPE_KEY)];
    harness
        .mounter()
        .mount_fs(
            "fs1",
            Path::new("/mnt/fs1"),
            &s3_mount_params(),
            Some(flags.as_slice()),
            "abc",
        )
        .await?;

    let content = std::fs::read_to_string(harness.mount_conf("abc"))?;
    let expected = BASE_CLIENT_CONF
        .replace("diskCacheType=0", "diskCacheType=2")
        .replace(
            "cache_dir=/curvefs/client/data/cache",
            "cache_dir=/curvefs/client/data/cache/abc",
        );
    assert_eq!(content, expected);
    assert!(harness.mount_cache_dir("abc").is_dir());
    Ok(())
}

#[tokio::test]
async fn test_mount_failure_reports_client_output() -> Result<()> {
    let harness = DriverHarness::new()?;
    harness.fail_next(FakeBinary::Client, "fuse: bad mount point")?;
    let mounter = harness.mounter();

    let err = mounter
        .mount_fs("fs1", Path::new("/mnt/fs1"), &s3_mount_params(), None, "abc")
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert!(err.to_string().contains("fuse: bad mount point"));
    assert_eq!(mounter.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_mount_with_unreadable_base_conf_spawns_nothing() -> Result<()> {
    let harness = DriverHarness::new()?;
    let mut p = s3_mount_params();
    p.insert(
        "clientConfPath".to_string(),
        harness.root().join("missing.conf").display().to_string(),
    );

    let err = harness
        .mounter()
        .mount_fs("fs1", Path::new("/mnt/fs1"), &p, Some(&[][..]), "abc")
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert!(harness.invocations(FakeBinary::Client)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_umount_cleanup_eventually_removes_files() -> Result<()> {
    let harness = DriverHarness::new()?;
    let mounter = harness.mounter();
    let flags = cache_flags();
    mounter
        .mount_fs(
            "fs1",
            Path::new("/mnt/fs1"),
            &s3_mount_params(),
            Some(flags.as_slice()),
            "abc",
        )
        .await?;
    std::fs::write(harness.mount_cache_dir("abc").join("chunk_0"), b"cached")?;

    // Drop the handle: cleanup must still happen in the background
    let cleanup = mounter.umount_fs(Path::new("/mnt/fs1"), "abc").await?;
    assert!(cleanup.is_scheduled());
    drop(cleanup);

    harness
        .wait_removed(&harness.mount_conf("abc"), Duration::from_secs(5))
        .await?;
    harness
        .wait_removed(&harness.mount_cache_dir("abc"), Duration::from_secs(5))
        .await?;

    assert_eq!(
        harness.invocations(FakeBinary::Umount)?,
        vec![vec!["/mnt/fs1".to_string()]]
    );
    assert_eq!(mounter.count(), 0);
    assert!(harness.base_client_conf().exists());
    Ok(())
}

#[tokio::test]
async fn test_umount_failure_leaves_files() -> Result<()> {
    let harness = DriverHarness::new()?;
    let mounter = harness.mounter();
    mounter
        .mount_fs(
            "fs1",
            Path::new("/mnt/fs1"),
            &s3_mount_params(),
            Some(&[][..]),
            "abc",
        )
        .await?;
    harness.fail_next(FakeBinary::Umount, "umount: /mnt/fs1: target is busy.")?;

    let err = mounter
        .umount_fs(Path::new("/mnt/fs1"), "abc")
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Internal);
    assert!(err.to_string().contains("target is busy"));
    assert!(harness.mount_conf("abc").exists());
    assert_eq!(mounter.list_mounts()[0].fsname, "fs1");
    Ok(())
}

#[tokio::test]
async fn test_remount_with_same_flags_is_stable() -> Result<()> {
    let harness = DriverHarness::new()?;
    let mounter = harness.mounter();
    let flags = cache_flags();

    for _ in 0..2 {
        mounter
            .mount_fs(
                "fs1",
                Path::new("/mnt/fs1"),
                &s3_mount_params(),
                Some(flags.as_slice()),
                "abc",
            )
            .await?;
    }

    let conf = ConfFile::parse(&std::fs::read_to_string(harness.mount_conf("abc"))?);
    assert_eq!(
        conf.get(CACHE_DIR_KEY),
        Some("/data/cache/abc:100GB;/data2/cache/abc")
    );
    assert_eq!(mounter.count(), 1);
    Ok(())
}
