// ABOUTME: Integration tests for volume resolution over local and SSH mounts.
// ABOUTME: Checks ordering, working directory, conflicts and rollback on failure.

mod support;

use boxctl::error::{Error, ErrorKind};
use boxctl::mount::{MountMode, MountSource, MountSpec, resolve};
use std::path::PathBuf;
use support::{FakeMounter, init_tracing, manager, parse_context};

fn specs(tokens: &[(&str, MountMode)]) -> Vec<MountSpec> {
    MountSpec::parse_all(
        tokens.iter().copied(),
        &parse_context(std::path::Path::new("/work/app")),
    )
    .unwrap()
}

#[tokio::test]
async fn local_and_remote_mounts_resolve_in_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMounter::new();
    let manager = manager(dir.path(), fake.clone());

    let resolved = resolve(
        &specs(&[
            ("./src", MountMode::ReadWrite),
            ("user@host:/data", MountMode::ReadOnly),
        ]),
        &manager,
    )
    .await
    .unwrap();

    assert_eq!(resolved.working_directory.as_deref(), Some("/root/src"));
    assert_eq!(resolved.mounts.len(), 2);
    assert_eq!(resolved.cleanup.len(), 1);

    let src = &resolved.mounts[0];
    assert_eq!(src.host_path, PathBuf::from("/work/app/src"));
    assert_eq!(src.container_path, "/root/src");
    assert_eq!(src.volume_arg(), "/work/app/src:/root/src:rw");

    let data = &resolved.mounts[1];
    assert!(matches!(data.source, MountSource::Remote(_)));
    assert_eq!(data.container_path, "/root/data");
    assert_eq!(data.host_path, resolved.cleanup[0].mountpoint());
    assert_eq!(data.mode, MountMode::ReadOnly);
    assert!(fake.is_mounted_at(&data.host_path));
}

#[tokio::test]
async fn no_mounts_means_no_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), FakeMounter::new());

    let resolved = resolve(&[], &manager).await.unwrap();
    assert!(resolved.mounts.is_empty());
    assert!(resolved.working_directory.is_none());
    assert!(resolved.cleanup.is_empty());
}

#[tokio::test]
async fn conflicting_targets_fail_before_anything_is_mounted() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMounter::new();
    let manager = manager(dir.path(), fake.clone());

    let err = resolve(
        &specs(&[
            ("dev@build:/srv/data", MountMode::ReadOnly),
            ("./data", MountMode::ReadWrite),
        ]),
        &manager,
    )
    .await
    .unwrap_err();

    match err {
        Error::MountConflict {
            container_path,
            first,
            second,
        } => {
            assert_eq!(container_path, "/root/data");
            assert_eq!(first, "dev@build:/srv/data");
            assert_eq!(second, "/work/app/data");
        }
        other => panic!("expected MountConflict, got {other:?}"),
    }
    assert_eq!(fake.mount_calls(), 0);
}

#[tokio::test]
async fn same_endpoint_in_both_modes_is_two_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMounter::new();
    let manager = manager(dir.path(), fake.clone());

    let resolved = resolve(
        &specs(&[
            ("dev@build:/srv:/ro-view", MountMode::ReadOnly),
            ("dev@build:/srv:/rw-view", MountMode::ReadWrite),
        ]),
        &manager,
    )
    .await
    .unwrap();

    assert_eq!(fake.mount_calls(), 2);
    assert_ne!(resolved.mounts[0].host_path, resolved.mounts[1].host_path);
}

#[tokio::test]
async fn failure_rolls_back_earlier_mounts_newest_first() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeMounter::new();
    fake.fail_on("dev@third:/c");
    let manager = manager(dir.path(), fake.clone());

    let err = resolve(
        &specs(&[
            ("dev@first:/a", MountMode::ReadOnly),
            ("dev@second:/b", MountMode::ReadWrite),
            ("dev@third:/c", MountMode::ReadOnly),
            ("./local", MountMode::ReadWrite),
        ]),
        &manager,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MountFailed);
    assert!(err.to_string().contains("dev@third:/c"));

    let unmounted = fake.unmounted();
    assert_eq!(unmounted.len(), 2);
    assert!(unmounted[0].to_string_lossy().contains("second"));
    assert!(unmounted[1].to_string_lossy().contains("first"));

    assert!(manager.list_active().is_empty());
    assert!(fake.mounted_paths().is_empty());
}
