//! Integration tests for the volume mount lifecycle

mod common;

use std::sync::Arc;

use ::common::auth::AllowAnyPolicy;
use ::common::driver::{DriverError, VolumeState};
use ::common::testkit::TestDriver;

#[tokio::test]
async fn test_shared_mount_released_by_last_holder() {
    let t = common::setup_with_volume().await;

    let first = t.driver.mount("v1", "alice").await.unwrap();
    let second = t.driver.mount("v1", "bob").await.unwrap();
    assert_eq!(first, second);

    t.driver.unmount("v1", "alice").await.unwrap();
    let info = t.driver.get("v1").await.unwrap();
    assert_eq!(info.refcount, 1);
    assert_eq!(info.mountpoint.as_ref(), Some(&first));
    assert_eq!(t.tool.unmount_calls(), 0);

    t.driver.unmount("v1", "bob").await.unwrap();
    let info = t.driver.get("v1").await.unwrap();
    assert_eq!(info.refcount, 0);
    assert_eq!(info.state, VolumeState::Created);
    assert_eq!(t.tool.unmounts(), vec![first]);
}

#[tokio::test]
async fn test_refcount_tracks_successful_mounts() {
    let t = common::setup_with_volume().await;

    for _ in 0..5 {
        t.driver.mount("v1", "alice").await.unwrap();
    }
    t.tool.fail_mounts("server unavailable");
    // the shared mount is already up, so no OS call and no failure
    t.driver.mount("v1", "bob").await.unwrap();
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 6);

    for _ in 0..4 {
        t.driver.unmount("v1", "alice").await.unwrap();
    }
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 2);
    assert_eq!(t.tool.mount_calls(), 1);
    assert_eq!(t.tool.unmount_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_mounts_share_one_os_mount() {
    let t = common::setup_with_volume().await;
    t.tool.set_delay(std::time::Duration::from_millis(10));

    let mut handles = Vec::new();
    for i in 0..8 {
        let driver = t.driver.clone();
        let caller = if i % 2 == 0 { "alice" } else { "bob" };
        handles.push(tokio::spawn(
            async move { driver.mount("v1", caller).await },
        ));
    }
    let mut mountpoints = Vec::new();
    for handle in handles {
        mountpoints.push(handle.await.unwrap().unwrap());
    }

    mountpoints.dedup();
    assert_eq!(mountpoints.len(), 1);
    assert_eq!(t.tool.mount_calls(), 1);
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 8);
    assert_eq!(t.driver.active_mounts().len(), 1);
    assert_eq!(t.driver.active_mounts()[0].refcount, 8);
}

#[tokio::test]
async fn test_different_volumes_mount_in_parallel() {
    let t = TestDriver::new().await;
    for name in ["a", "b", "c"] {
        t.driver.create(name, &t.source(name)).await.unwrap();
    }
    t.tool.set_delay(std::time::Duration::from_millis(50));

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let driver = t.driver.clone();
            tokio::spawn(async move { driver.mount(name, "alice").await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(t.tool.mount_calls(), 3);
    assert!(t.tool.max_in_flight() > 1);
}

#[tokio::test]
async fn test_idempotent_unmount() {
    let t = common::setup_with_volume().await;
    t.driver.mount("v1", "alice").await.unwrap();

    t.driver.unmount("v1", "alice").await.unwrap();
    t.driver.unmount("v1", "alice").await.unwrap();
    t.driver.unmount("v1", "alice").await.unwrap();

    assert_eq!(t.tool.unmount_calls(), 1);
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 0);
}

#[tokio::test]
async fn test_failed_unmount_keeps_volume_mounted() {
    let t = common::setup_with_volume().await;
    let mountpoint = t.driver.mount("v1", "alice").await.unwrap();
    t.tool.fail_unmounts("umount.nfs4: device is busy");

    let err = t.driver.unmount("v1", "alice").await.unwrap_err();
    assert!(matches!(err, DriverError::Mount(_)));
    assert_eq!(t.driver.path("v1").await.unwrap(), mountpoint);

    t.tool.clear_failures();
    t.driver.unmount("v1", "alice").await.unwrap();
    assert!(matches!(
        t.driver.path("v1").await,
        Err(DriverError::NotMounted(_))
    ));
}

#[tokio::test]
async fn test_remove_busy_then_free() {
    let t = common::setup_with_volume().await;
    t.driver.mount("v1", "alice").await.unwrap();

    assert!(matches!(
        t.driver.remove("v1").await,
        Err(DriverError::VolumeBusy(_))
    ));
    assert!(t.driver.get("v1").await.is_ok());

    t.driver.unmount("v1", "alice").await.unwrap();
    t.driver.remove("v1").await.unwrap();
    assert!(t.driver.list().await.is_empty());

    // the name can be reused once removed
    t.driver.create("v1", &t.source("elsewhere")).await.unwrap();
    assert_eq!(
        t.driver.get("v1").await.unwrap().target,
        "nfs.example.com:/elsewhere"
    );
}

#[tokio::test]
async fn test_path_of_unknown_volume() {
    let t = TestDriver::new().await;
    assert!(matches!(
        t.driver.path("unknownvol").await,
        Err(DriverError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mountpoints_live_under_mount_root() {
    let t = common::setup_with_volume().await;
    let mountpoint = t.driver.mount("v1", "alice").await.unwrap();
    assert!(mountpoint.starts_with(t.scratch_dir().join("volumes")));
    assert!(mountpoint.is_dir());

    t.driver.unmount("v1", "alice").await.unwrap();
    assert!(!mountpoint.exists());
}

#[tokio::test]
async fn test_remove_races_with_mount() {
    let t = TestDriver::with_policy(Arc::new(AllowAnyPolicy)).await;
    t.driver.create("v1", &t.source("race")).await.unwrap();
    t.tool.set_delay(std::time::Duration::from_millis(20));

    let mount = {
        let driver = t.driver.clone();
        tokio::spawn(async move { driver.mount("v1", "alice").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let remove = t.driver.remove("v1").await;

    // the mount got the volume lock first, so remove sees it busy
    mount.await.unwrap().unwrap();
    assert!(matches!(remove, Err(DriverError::VolumeBusy(_))));
}
