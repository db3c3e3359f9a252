//! Ancestor resolution edge cases against the in-memory backend.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::time::Duration;

use lineage_actors::{ActorError, AncestorResolver, ResolverConfig};
use lineage_db::{Backend, Bucket, Indexes, MemoryBackend, MemoryBucket};
use lineage_types::{ActorId, ActorRecord, Clock, snapshot_key};
use serde_json::json;

const BUCKET: &str = "test_board";

fn clock(entries: &[(&str, u64)]) -> Clock {
    Clock::from_entries(entries.iter().copied())
}

fn board() -> ActorId {
    ActorId::from("b1")
}

fn sibling(vector: Clock, ancestor: Option<Clock>) -> ActorRecord {
    ActorRecord {
        id: board(),
        vector,
        ancestor,
        payload: serde_json::Map::new(),
    }
}

/// Write the snapshot of `vector` pointing at `ancestor`.
async fn snapshot(bucket: &MemoryBucket, vector: &Clock, ancestor: Option<&Clock>) {
    let doc = json!({ "id": "b1", "vector": vector, "ancestor": ancestor });
    bucket
        .put(&snapshot_key(&board(), vector), &doc, &Indexes::new(), None)
        .await
        .expect("Failed to put snapshot");
}

fn setup() -> (MemoryBackend, MemoryBucket) {
    let backend = MemoryBackend::new();
    let bucket = backend.bucket(BUCKET);
    (backend, bucket)
}

#[tokio::test]
async fn shared_parent_resolves_without_fetching() {
    let (_, bucket) = setup();
    let parent = clock(&[("A", 1)]);
    let siblings = [
        sibling(clock(&[("A", 2)]), Some(parent.clone())),
        sibling(clock(&[("A", 1), ("B", 1)]), Some(parent.clone())),
    ];

    let resolution = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .expect("Failed to resolve");
    assert_eq!(resolution.clock, parent);
    assert_eq!(resolution.rounds, 0);
}

#[tokio::test]
async fn uneven_branches_meet_at_fork() {
    let (_, bucket) = setup();
    let n0 = clock(&[("A", 1)]);
    let n1 = clock(&[("A", 2)]);
    let n2 = clock(&[("A", 3)]);
    let n3 = clock(&[("A", 2), ("B", 1)]);
    let n5 = clock(&[("A", 2), ("B", 2)]);
    let n6 = clock(&[("A", 2), ("B", 3)]);

    snapshot(&bucket, &n0, None).await;
    snapshot(&bucket, &n1, Some(&n0)).await;
    snapshot(&bucket, &n2, Some(&n1)).await;
    snapshot(&bucket, &n3, Some(&n1)).await;
    snapshot(&bucket, &n5, Some(&n3)).await;
    snapshot(&bucket, &n6, Some(&n5)).await;

    let siblings = [
        sibling(clock(&[("A", 4)]), Some(n2)),
        sibling(clock(&[("A", 2), ("B", 4)]), Some(n6)),
    ];
    let resolution = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .expect("Failed to resolve");
    assert_eq!(resolution.clock, n1);
    assert_eq!(resolution.rounds, 3);
}

#[tokio::test]
async fn disjoint_roots_have_no_common_ancestor() {
    let (_, bucket) = setup();
    let a = clock(&[("A", 1)]);
    let b = clock(&[("B", 1)]);
    snapshot(&bucket, &a, None).await;
    snapshot(&bucket, &b, None).await;

    let siblings = [
        sibling(clock(&[("A", 2)]), Some(a)),
        sibling(clock(&[("B", 2)]), Some(b)),
    ];
    let err = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::NoCommonAncestor { rounds: 1, .. }));
}

#[tokio::test]
async fn root_siblings_have_no_common_ancestor() {
    let (_, bucket) = setup();
    let siblings = [
        sibling(clock(&[("A", 1)]), None),
        sibling(clock(&[("B", 1)]), None),
    ];
    let err = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::NoCommonAncestor { .. }));
}

#[tokio::test]
async fn empty_sibling_set_is_rejected() {
    let (_, bucket) = setup();
    let err = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::NoSiblings { .. }));
}

#[tokio::test]
async fn self_referencing_snapshot_is_a_cycle() {
    let (_, bucket) = setup();
    let looping = clock(&[("A", 1)]);
    snapshot(&bucket, &looping, Some(&looping)).await;

    let siblings = [
        sibling(clock(&[("A", 2)]), Some(looping.clone())),
        sibling(clock(&[("B", 1)]), Some(clock(&[("B", 0), ("C", 1)]))),
    ];
    let err = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::CycleDetected { clock, .. } if clock == looping));
}

#[tokio::test]
async fn long_chains_exceed_round_limit() {
    let (_, bucket) = setup();
    let mut left = clock(&[("A", 1)]);
    let mut right = clock(&[("B", 1)]);
    snapshot(&bucket, &left, None).await;
    snapshot(&bucket, &right, None).await;
    for _ in 0..5 {
        let next_left = left.incremented("A");
        let next_right = right.incremented("B");
        snapshot(&bucket, &next_left, Some(&left)).await;
        snapshot(&bucket, &next_right, Some(&right)).await;
        left = next_left;
        right = next_right;
    }

    let siblings = [
        sibling(left.incremented("A"), Some(left)),
        sibling(right.incremented("B"), Some(right)),
    ];
    let err = AncestorResolver::new(&bucket, ResolverConfig::default().with_max_rounds(3))
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::DepthExceeded { max_rounds: 3, .. }));
}

#[tokio::test]
async fn missing_snapshot_closes_its_branch() {
    let (_, bucket) = setup();
    let root = clock(&[("A", 1)]);
    snapshot(&bucket, &root, None).await;

    let siblings = [
        sibling(clock(&[("A", 2)]), Some(root)),
        sibling(clock(&[("C", 2)]), Some(clock(&[("C", 1)]))),
    ];
    let err = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::NoCommonAncestor { .. }));
}

#[tokio::test]
async fn slow_snapshot_read_times_out() {
    let (backend, bucket) = setup();
    let root = clock(&[("A", 1)]);
    let slow = clock(&[("B", 1)]);
    snapshot(&bucket, &root, None).await;
    snapshot(&bucket, &slow, Some(&root)).await;
    backend
        .delay_gets(BUCKET, &snapshot_key(&board(), &slow), Duration::from_millis(200))
        .await;

    let siblings = [
        sibling(clock(&[("A", 2)]), Some(root)),
        sibling(clock(&[("B", 2)]), Some(slow)),
    ];
    let config = ResolverConfig::default().with_round_timeout(Duration::from_millis(20));
    let err = AncestorResolver::new(&bucket, config)
        .resolve_clock(&board(), &siblings)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::NoCommonAncestor { .. }));
}

#[tokio::test]
async fn resolve_fetches_ancestor_snapshot() {
    let (_, bucket) = setup();
    let root = clock(&[("A", 1)]);
    snapshot(&bucket, &root, None).await;

    let siblings = [
        sibling(clock(&[("A", 2)]), Some(root.clone())),
        sibling(clock(&[("A", 1), ("B", 1)]), Some(root.clone())),
    ];
    let ancestor = AncestorResolver::new(&bucket, ResolverConfig::default())
        .resolve(&board(), &siblings)
        .await
        .expect("Failed to resolve");
    assert_eq!(ancestor.vector, root);
    assert!(ancestor.is_root());
}
