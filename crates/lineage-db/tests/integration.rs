//! Integration tests for the `Dragonfly` backend.
//!
//! These tests require a live `Dragonfly` (or Redis) instance. Run with:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p lineage-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use lineage_db::{Backend, Bucket, DragonflyBackend, IndexRange, Indexes, Lookup};
use serde_json::json;
use uuid::Uuid;

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

async fn connect() -> DragonflyBackend {
    DragonflyBackend::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly -- is Docker running?")
}

fn unique_bucket() -> String {
    format!("test_{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_put_get_roundtrip() {
    let backend = connect().await;
    let bucket = backend.bucket(&unique_bucket());

    bucket
        .put("b1", &json!({ "name": "a board" }), &Indexes::new(), None)
        .await
        .expect("Failed to put");

    match bucket.get("b1").await.expect("Failed to get") {
        Lookup::Found { siblings, context } => {
            assert_eq!(siblings.len(), 1);
            assert_eq!(siblings[0].doc, json!({ "name": "a board" }));
            assert_eq!(context.len(), 1);
        }
        Lookup::NotFound => panic!("expected a stored value"),
    }

    bucket.delete("b1").await.expect("Failed to delete");
    assert!(bucket.get("b1").await.expect("Failed to get").is_not_found());
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_concurrent_writers_leave_siblings() {
    let backend = connect().await;
    let bucket = backend.bucket(&unique_bucket());

    bucket
        .put("b1", &json!(1), &Indexes::new(), None)
        .await
        .expect("Failed to put");
    let Lookup::Found { context, .. } = bucket.get("b1").await.expect("Failed to get") else {
        panic!("expected a stored value");
    };

    bucket
        .put("b1", &json!(2), &Indexes::new(), Some(&context))
        .await
        .expect("Failed to put");
    bucket
        .put("b1", &json!(3), &Indexes::new(), Some(&context))
        .await
        .expect("Failed to put");

    let lookup = bucket.get("b1").await.expect("Failed to get");
    assert_eq!(lookup.sibling_count(), 2);

    let Lookup::Found { context, .. } = lookup else {
        panic!("expected siblings");
    };
    bucket
        .put("b1", &json!(4), &Indexes::new(), Some(&context))
        .await
        .expect("Failed to put");
    assert_eq!(bucket.get("b1").await.expect("Failed to get").sibling_count(), 1);
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_index_range_query() {
    let backend = connect().await;
    let bucket = backend.bucket(&unique_bucket());

    for (key, value) in [("e1", "agg-001"), ("e2", "agg-002"), ("e3", "agg-003")] {
        let indexes: Indexes = [("aggregate_event_id".to_owned(), value.to_owned())].into();
        bucket
            .put(key, &json!({ "id": key }), &indexes, None)
            .await
            .expect("Failed to put");
    }

    let docs = bucket
        .get_by_index("aggregate_event_id", "agg-002", IndexRange::From)
        .await
        .expect("Failed to query index");
    let keys: Vec<&str> = docs.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["e2", "e3"]);

    let exact = bucket
        .get_by_index("aggregate_event_id", "agg-001", IndexRange::Exact)
        .await
        .expect("Failed to query index");
    assert_eq!(exact.len(), 1);
}
