//! Property-based tests for subtree cascades
//!
//! For any container with any set of descendants, a move rewrites exactly
//! the descendant path prefixes, and delete/restore flip exactly the subtree.

mod common;

use common::{embedded, file, folder, id};
use proptest::prelude::*;
use spacesearch::{EmbeddedBackend, Engine};
use spacesearch_core::{is_within_scope, replace_path_prefix};

/// Relative paths below a folder, e.g. `a/b.txt`
fn relative_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,6}", 1..4).prop_map(|segments| segments.join("/"))
}

fn layout_strategy() -> impl Strategy<Value = (String, Vec<String>, Vec<String>)> {
    (
        "[a-z]{1,6}",
        prop::collection::btree_set(relative_path_strategy(), 1..6),
        prop::collection::btree_set(relative_path_strategy(), 0..4),
    )
        .prop_map(|(name, inside, outside)| {
            (name, inside.into_iter().collect(), outside.into_iter().collect())
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn seed(engine: &EmbeddedBackend, root: &str, inside: &[String], outside: &[String]) {
    let batch = engine.new_batch(16).await.unwrap();
    batch
        .upsert(&id("root"), folder("root", &format!("/{}", root)))
        .await
        .unwrap();
    for (n, rel) in inside.iter().enumerate() {
        let opaque = format!("in{}", n);
        batch
            .upsert(&id(&opaque), file(&opaque, &format!("/{}/{}", root, rel)))
            .await
            .unwrap();
    }
    for (n, rel) in outside.iter().enumerate() {
        let opaque = format!("out{}", n);
        batch
            .upsert(&id(&opaque), file(&opaque, &format!("/{}x/{}", root, rel)))
            .await
            .unwrap();
    }
    batch.push().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Move rewrites every descendant's prefix and nothing else
    #[test]
    fn prop_move_rewrites_descendant_prefixes((root, inside, outside) in layout_strategy()) {
        runtime().block_on(async {
            let (_dir, engine) = embedded();
            seed(&engine, &root, &inside, &outside).await;

            engine.move_to(&id("root"), common::ROOT_ID, "/moved/here").await.unwrap();

            let index = engine.index();
            let old_root = format!("./{}", root);
            for (n, rel) in inside.iter().enumerate() {
                let stored = index.resource_by_id(&id(&format!("in{}", n))).unwrap();
                let expected = replace_path_prefix(&format!("{}/{}", old_root, rel), &old_root, "./moved/here");
                assert_eq!(Some(stored.path.clone()), expected);
                assert!(is_within_scope(&stored.path, "./moved/here"));
            }
            for (n, rel) in outside.iter().enumerate() {
                let stored = index.resource_by_id(&id(&format!("out{}", n))).unwrap();
                assert_eq!(stored.path, format!("./{}x/{}", root, rel));
            }
        });
    }

    /// Delete and restore flip the flag on exactly the subtree
    #[test]
    fn prop_soft_delete_cascades((root, inside, outside) in layout_strategy()) {
        runtime().block_on(async {
            let (_dir, engine) = embedded();
            seed(&engine, &root, &inside, &outside).await;
            let total = (1 + inside.len() + outside.len()) as u64;

            engine.delete(&id("root")).await.unwrap();
            assert_eq!(engine.doc_count().await.unwrap(), outside.len() as u64);
            let index = engine.index();
            for n in 0..inside.len() {
                assert!(index.resource_by_id(&id(&format!("in{}", n))).unwrap().deleted);
            }

            engine.restore(&id("root")).await.unwrap();
            assert_eq!(engine.doc_count().await.unwrap(), total);
        });
    }
}
