//! Integration tests for volume lifecycle (create, mount, unmount, remove).

use std::collections::HashMap;
use std::path::Path;

use glusterblock::{BlockError, Bytes, Filesystem, Scope, StateStore};
use glusterblock_test_utils::{TestDriver, options};

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn db_volume_full_lifecycle() {
    let ctx = TestDriver::new().await;
    let driver = &ctx.driver;

    let created = driver
        .create("db", &options(&[("size", "10G"), ("filesystem", "ext4")]))
        .await
        .unwrap();
    assert_eq!(created.size_bytes, Bytes::from_gib(10));
    assert_eq!(created.filesystem, Filesystem::Ext4);
    assert!(created.backing_file.is_file());
    assert_eq!(
        ctx.host.formatted_as(&created.backing_file).as_deref(),
        Some("ext4")
    );

    let p = driver.mount("db", "m1").await.unwrap();
    assert!(ctx.host.is_mounted(&p));
    assert_eq!(driver.path("db").unwrap(), Some(p.clone()));

    let second = driver.mount("db", "m2").await.unwrap();
    assert_eq!(second, p);
    assert_eq!(driver.get("db").unwrap().mount_count, 2);
    assert_eq!(ctx.host.count("mount"), 1);

    driver.unmount("db", "m1").await.unwrap();
    let volume = driver.get("db").unwrap();
    assert_eq!(volume.mount_count, 1);
    assert!(ctx.host.is_mounted(&p));

    driver.unmount("db", "m2").await.unwrap();
    let volume = driver.get("db").unwrap();
    assert_eq!(volume.mount_count, 0);
    assert!(volume.loop_device.is_none());
    assert!(!ctx.host.is_mounted(&p));
    assert!(ctx.host.devices_for(&volume.backing_file).is_empty());

    driver.remove("db").await.unwrap();
    assert!(!volume.backing_file.exists());
    assert!(matches!(driver.get("db"), Err(BlockError::NotFound(_))));
}

#[tokio::test]
async fn mount_unknown_volume_has_no_side_effects() {
    let ctx = TestDriver::new().await;
    let before = std::fs::read(ctx.state_file()).ok();

    let err = ctx.driver.mount("ghost", "m1").await.unwrap_err();
    assert!(matches!(err, BlockError::NotFound(ref name) if name == "ghost"));

    assert!(ctx.host.commands().is_empty());
    assert!(ctx.driver.list().is_empty());
    assert_eq!(std::fs::read(ctx.state_file()).ok(), before);
}

// ============================================================================
// CREATE TESTS
// ============================================================================

#[tokio::test]
async fn create_uses_configured_defaults() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("logs", &HashMap::new()).await.unwrap();

    assert_eq!(volume.size_bytes, ctx.config.defaults.size);
    assert_eq!(volume.filesystem, Filesystem::Ext4);
    assert_eq!(
        volume.backing_file.file_name().unwrap().to_str(),
        Some("logs.img")
    );
    assert!(volume.created);
    assert_eq!(volume.mount_count, 0);
    assert_eq!(
        std::fs::metadata(&volume.backing_file).unwrap().len(),
        volume.size_bytes.as_bytes()
    );
}

#[tokio::test]
async fn create_is_idempotent_for_identical_options() {
    let ctx = TestDriver::new().await;
    let opts = options(&[("size", "32M"), ("filesystem", "xfs")]);

    let first = ctx.driver.create("db", &opts).await.unwrap();
    let second = ctx.driver.create("db", &opts).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ctx.host.count("mkfs.xfs"), 1);
    let files: Vec<_> = std::fs::read_dir(&first.shared_mount)
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn create_with_different_options_conflicts() {
    let ctx = TestDriver::new().await;
    let original = ctx
        .driver
        .create("db", &options(&[("size", "32M")]))
        .await
        .unwrap();

    let err = ctx
        .driver
        .create("db", &options(&[("size", "64M")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockError::Conflict { .. }));

    let err = ctx
        .driver
        .create("db", &options(&[("size", "32M"), ("filesystem", "btrfs")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockError::Conflict { .. }));

    assert_eq!(ctx.driver.get("db").unwrap(), original);
    assert_eq!(
        std::fs::metadata(&original.backing_file).unwrap().len(),
        Bytes::from_mib(32).as_bytes()
    );
}

#[tokio::test]
async fn create_rejects_bad_input_before_touching_the_host() {
    let ctx = TestDriver::new().await;

    let err = ctx
        .driver
        .create("db", &options(&[("colour", "blue")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockError::InvalidArgument(_)));

    let err = ctx
        .driver
        .create("db", &options(&[("filesystem", "ntfs")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BlockError::Format(_)));

    let err = ctx
        .driver
        .create("../etc", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockError::InvalidArgument(_)));

    assert!(ctx.host.commands().is_empty());
    assert!(ctx.driver.list().is_empty());
}

#[tokio::test]
async fn create_honours_filename_format() {
    let ctx = TestDriver::new().await;
    let volume = ctx
        .driver
        .create("db", &options(&[("filename-format", "vol-{name}.raw")]))
        .await
        .unwrap();
    assert!(volume.backing_file.ends_with("vol-db.raw"));
    assert!(volume.backing_file.is_file());
}

#[tokio::test]
async fn failed_format_rolls_back() {
    let ctx = TestDriver::new().await;
    ctx.host.fail_mkfs(true);

    let err = ctx.driver.create("db", &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, BlockError::Format(_)));

    assert!(matches!(ctx.driver.get("db"), Err(BlockError::NotFound(_))));
    let stored = StateStore::new(ctx.state_file()).load().await.unwrap();
    assert!(!stored.contains_key("db"));
    let shared = ctx.config.root.join("gluster").join("blocks");
    assert!(!shared.join("db.img").exists());
    // last reference gone, shared mount torn down
    assert!(!ctx.host.is_mounted(&shared));
    assert!(ctx.driver.shared_mounts().await.is_empty());

    ctx.host.fail_mkfs(false);
    ctx.driver.create("db", &HashMap::new()).await.unwrap();
}

#[tokio::test]
async fn create_refuses_to_reuse_a_foreign_file() {
    let ctx = TestDriver::new().await;
    ctx.driver.create("keep", &HashMap::new()).await.unwrap();

    let shared = ctx.config.root.join("gluster").join("blocks");
    let foreign = shared.join("db.img");
    std::fs::write(&foreign, b"precious").unwrap();

    let err = ctx.driver.create("db", &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, BlockError::Io { .. }));
    assert_eq!(std::fs::read(&foreign).unwrap(), b"precious");
    assert!(matches!(ctx.driver.get("db"), Err(BlockError::NotFound(_))));
}

// ============================================================================
// MOUNT / UNMOUNT TESTS
// ============================================================================

#[tokio::test]
async fn mount_then_unmount_clears_path_and_detaches() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("db", &HashMap::new()).await.unwrap();

    let mount_point = ctx.driver.mount("db", "c1").await.unwrap();
    assert_eq!(mount_point, volume.mount_point);
    let device = ctx.driver.get("db").unwrap().loop_device.unwrap();
    assert_eq!(
        ctx.host.mount_source(&mount_point).as_deref(),
        device.to_str()
    );

    ctx.driver.unmount("db", "c1").await.unwrap();
    assert_eq!(ctx.driver.path("db").unwrap(), None);
    assert!(ctx.host.devices_for(&volume.backing_file).is_empty());
    assert_eq!(ctx.host.loop_device_count(), 0);
}

#[tokio::test]
async fn repeated_mount_ids_are_counted() {
    let ctx = TestDriver::new().await;
    ctx.driver.create("db", &HashMap::new()).await.unwrap();

    ctx.driver.mount("db", "same").await.unwrap();
    ctx.driver.mount("db", "same").await.unwrap();
    assert_eq!(ctx.driver.get("db").unwrap().mount_count, 2);

    ctx.driver.unmount("db", "same").await.unwrap();
    assert!(ctx.driver.path("db").unwrap().is_some());
    ctx.driver.unmount("db", "same").await.unwrap();
    assert!(ctx.driver.path("db").unwrap().is_none());
}

#[tokio::test]
async fn unmount_of_unmounted_volume_is_rejected() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("db", &HashMap::new()).await.unwrap();

    let err = ctx.driver.unmount("db", "c1").await.unwrap_err();
    assert!(matches!(err, BlockError::InvalidState { .. }));
    assert_eq!(ctx.driver.get("db").unwrap(), volume);

    let err = ctx.driver.unmount("ghost", "c1").await.unwrap_err();
    assert!(matches!(err, BlockError::NotFound(_)));
}

#[tokio::test]
async fn mount_fails_when_loop_devices_are_exhausted() {
    let ctx = TestDriver::new().await;
    ctx.host.set_max_loop_devices(1);
    ctx.driver.create("a", &HashMap::new()).await.unwrap();
    ctx.driver.create("b", &HashMap::new()).await.unwrap();

    ctx.driver.mount("a", "c1").await.unwrap();
    let err = ctx.driver.mount("b", "c1").await.unwrap_err();
    assert!(matches!(err, BlockError::ResourceExhausted(_)));

    let b = ctx.driver.get("b").unwrap();
    assert_eq!(b.mount_count, 0);
    assert!(b.loop_device.is_none());
    assert!(!ctx.host.is_mounted(&b.mount_point));
}

// ============================================================================
// REMOVE TESTS
// ============================================================================

#[tokio::test]
async fn remove_while_mounted_is_in_use() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("db", &HashMap::new()).await.unwrap();
    ctx.driver.mount("db", "c1").await.unwrap();

    let err = ctx.driver.remove("db").await.unwrap_err();
    assert!(matches!(
        err,
        BlockError::InUse {
            mount_count: 1,
            ..
        }
    ));
    assert!(volume.backing_file.is_file());
    assert_eq!(ctx.driver.get("db").unwrap().mount_count, 1);
}

#[tokio::test]
async fn remove_unknown_volume_is_not_found() {
    let ctx = TestDriver::new().await;
    let err = ctx.driver.remove("ghost").await.unwrap_err();
    assert!(matches!(err, BlockError::NotFound(_)));
}

#[tokio::test]
async fn remove_cleans_up_mount_point() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("db", &HashMap::new()).await.unwrap();
    ctx.driver.mount("db", "c1").await.unwrap();
    ctx.driver.unmount("db", "c1").await.unwrap();
    assert!(volume.mount_point.is_dir());

    ctx.driver.remove("db").await.unwrap();
    assert!(!volume.mount_point.exists());

    // name can be reused afterwards
    ctx.driver.create("db", &HashMap::new()).await.unwrap();
}

// ============================================================================
// READ TESTS
// ============================================================================

#[tokio::test]
async fn list_is_sorted_by_name() {
    let ctx = TestDriver::new().await;
    for name in ["web", "cache", "db"] {
        ctx.driver.create(name, &HashMap::new()).await.unwrap();
    }
    let names: Vec<String> = ctx.driver.list().into_iter().map(|v| v.name).collect();
    assert_eq!(names, ["cache", "db", "web"]);
}

#[tokio::test]
async fn path_of_unknown_volume_is_not_found() {
    let ctx = TestDriver::new().await;
    assert!(matches!(
        ctx.driver.path("ghost"),
        Err(BlockError::NotFound(_))
    ));
}

#[tokio::test]
async fn capabilities_report_global_scope() {
    let ctx = TestDriver::new().await;
    assert_eq!(ctx.driver.capabilities().scope, Scope::Global);
}

// ============================================================================
// CONCURRENCY TESTS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mounts_of_one_volume_are_serialized() {
    let ctx = TestDriver::new().await;
    ctx.driver.create("db", &HashMap::new()).await.unwrap();

    let mounts = (0..8).map(|i| {
        let driver = ctx.driver.clone();
        async move { driver.mount("db", &format!("c{i}")).await }
    });
    let results = futures::future::join_all(mounts).await;
    let paths: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(paths.windows(2).all(|w| w[0] == w[1]));

    let volume = ctx.driver.get("db").unwrap();
    assert_eq!(volume.mount_count, 8);
    assert_eq!(ctx.host.count("mount"), 1);
    assert_eq!(ctx.host.devices_for(&volume.backing_file).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_of_different_volumes_share_one_mount() {
    let ctx = TestDriver::new().await;
    let creates = ["a", "b", "c", "d"].map(|name| {
        let driver = ctx.driver.clone();
        async move { driver.create(name, &HashMap::new()).await }
    });
    for result in futures::future::join_all(creates).await {
        result.unwrap();
    }

    assert_eq!(ctx.driver.list().len(), 4);
    assert_eq!(ctx.host.count("glusterfs"), 1);
    let mounts = ctx.driver.shared_mounts().await;
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].refs, 4);
}

#[tokio::test]
async fn backing_files_live_on_the_shared_mount() {
    let ctx = TestDriver::new().await;
    let volume = ctx.driver.create("db", &HashMap::new()).await.unwrap();
    assert!(ctx.host.is_mounted(&volume.shared_mount));
    assert_eq!(volume.backing_file.parent(), Some(Path::new(&volume.shared_mount)));
}
