// ABOUTME: Integration tests for container runtime operations.
// ABOUTME: Tests run against the local Docker/Podman daemon and skip when none is found.

use boxctl::network::{INTERNAL_NETWORK, NetworkMode, ensure_network};
use boxctl::runtime::{
    BollardRuntime, ImageError, ImageOps, NetworkOps, RuntimeInfoTrait, connect_local,
};
use boxctl::types::{BOX_IMAGE_PREFIX, ImageRef};

/// Get local runtime, skipping test if unavailable.
async fn local_runtime() -> Option<BollardRuntime> {
    connect_local(None).await.ok()
}

/// Skip test if no local runtime available.
macro_rules! require_runtime {
    () => {
        match local_runtime().await {
            Some(rt) => rt,
            None => {
                eprintln!("Skipping test: no local container runtime found");
                return;
            }
        }
    };
}

// =============================================================================
// RuntimeInfo Tests
// =============================================================================

#[tokio::test]
async fn runtime_info() {
    let runtime = require_runtime!();

    let info = runtime.info().await.expect("should get runtime info");

    assert!(
        !info.name.is_empty(),
        "runtime name should not be empty, got: {}",
        info.name
    );
    assert!(
        !info.version.is_empty(),
        "runtime version should not be empty"
    );
    assert!(!runtime.socket_path().is_empty());
}

// =============================================================================
// ImageOps Tests
// =============================================================================

#[tokio::test]
async fn pull_public_image() {
    let runtime = require_runtime!();

    let image_ref = ImageRef::parse("alpine:latest").expect("valid image ref");

    runtime
        .pull_image(&image_ref)
        .await
        .expect("pull should succeed");

    let exists = runtime
        .image_exists(&image_ref)
        .await
        .expect("image_exists should succeed");
    assert!(exists, "image should exist after pull");
}

#[tokio::test]
async fn image_exists_false_for_nonexistent() {
    let runtime = require_runtime!();

    let image_ref = ImageRef::parse("this-image-definitely-does-not-exist-12345:v999")
        .expect("valid image ref");

    let exists = runtime
        .image_exists(&image_ref)
        .await
        .expect("image_exists should succeed");
    assert!(!exists, "non-existent image should return false");
}

#[tokio::test]
async fn inventory_only_holds_box_images() {
    let runtime = require_runtime!();

    let tags = runtime
        .list_image_tags(BOX_IMAGE_PREFIX)
        .await
        .expect("listing images should succeed");
    for tag in &tags {
        assert!(tag.starts_with(BOX_IMAGE_PREFIX), "unexpected tag {tag}");
        assert!(!tag.ends_with(":latest"));
    }
}

#[tokio::test]
async fn removing_a_missing_image_is_not_found() {
    let runtime = require_runtime!();

    let err = runtime
        .remove_image("box-definitely-missing-12345", false)
        .await
        .expect_err("remove should fail");
    assert!(matches!(err, ImageError::NotFound(_)), "got {err:?}");
}

// =============================================================================
// NetworkOps Tests
// =============================================================================

#[tokio::test]
async fn missing_network_does_not_exist() {
    let runtime = require_runtime!();

    let exists = runtime
        .network_exists("box-test-network-that-does-not-exist")
        .await
        .expect("network_exists should succeed");
    assert!(!exists);
}

#[tokio::test]
async fn internal_network_can_be_ensured_twice() {
    let runtime = require_runtime!();
    let plan = NetworkMode::Internal.plan();

    ensure_network(&plan, &runtime)
        .await
        .expect("first ensure should succeed");
    ensure_network(&plan, &runtime)
        .await
        .expect("second ensure should succeed");

    assert!(
        runtime
            .network_exists(INTERNAL_NETWORK)
            .await
            .expect("network_exists should succeed")
    );
}
