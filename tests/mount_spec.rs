// ABOUTME: Property tests for mount token parsing.
// ABOUTME: Generated local and remote tokens must parse to the expected source and target.

use boxctl::error::ErrorKind;
use boxctl::mount::{MountMode, MountSource, MountSpec, ParseContext};
use proptest::prelude::*;
use std::path::PathBuf;

fn ctx() -> ParseContext {
    ParseContext::new("/work/project", Some(PathBuf::from("/home/dev")))
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

fn mode() -> impl Strategy<Value = MountMode> {
    prop_oneof![Just(MountMode::ReadOnly), Just(MountMode::ReadWrite)]
}

proptest! {
    #[test]
    fn relative_local_paths_land_under_root(
        parts in prop::collection::vec(segment(), 1..4),
        mode in mode(),
    ) {
        let token = format!("./{}", parts.join("/"));
        let spec = MountSpec::parse(&token, mode, 0, &ctx()).unwrap();

        let expected = PathBuf::from("/work/project").join(parts.join("/"));
        prop_assert_eq!(&spec.source, &MountSource::Local { path: expected });
        prop_assert_eq!(spec.target(), format!("/root/{}", parts.last().unwrap()));
        prop_assert_eq!(spec.mode, mode);
    }

    #[test]
    fn explicit_container_path_wins(
        local in segment(),
        target in prop::collection::vec(segment(), 1..4),
    ) {
        let token = format!("{local}:/{}", target.join("/"));
        let spec = MountSpec::parse(&token, MountMode::ReadOnly, 3, &ctx()).unwrap();
        prop_assert_eq!(spec.target(), format!("/{}", target.join("/")));
        prop_assert_eq!(spec.order, 3);
    }

    #[test]
    fn remote_tokens_keep_their_endpoint(
        user in segment(),
        host in "[a-z][a-z0-9.-]{0,15}",
        parts in prop::collection::vec(segment(), 1..4),
    ) {
        let path = format!("/{}", parts.join("/"));
        let token = format!("{user}@{host}:{path}");
        let spec = MountSpec::parse(&token, MountMode::ReadWrite, 0, &ctx()).unwrap();

        let endpoint = spec.remote().unwrap();
        prop_assert_eq!(&endpoint.user, &user);
        prop_assert_eq!(&endpoint.host, &host);
        prop_assert_eq!(&endpoint.path, &path);
        prop_assert_eq!(endpoint.to_string(), token);
        prop_assert_eq!(spec.target(), format!("/root/{}", parts.last().unwrap()));
    }

    #[test]
    fn parent_segments_never_escape_into_container_paths(
        local in segment(),
        above in segment(),
    ) {
        let token = format!("{local}:/srv/../{above}");
        let err = MountSpec::parse(&token, MountMode::ReadOnly, 0, &ctx()).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MalformedMountSpec);
    }
}

#[test]
fn home_relative_paths_expand() {
    let spec = MountSpec::parse("~/notes", MountMode::ReadOnly, 0, &ctx()).unwrap();
    assert_eq!(
        spec.source,
        MountSource::Local {
            path: PathBuf::from("/home/dev/notes")
        }
    );
    assert_eq!(spec.target(), "/root/notes");
}

#[test]
fn urls_are_rejected() {
    let err = MountSpec::parse("ssh://dev@build/srv", MountMode::ReadOnly, 0, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedMountSpec);
    assert!(err.to_string().contains("ssh://"));
}
