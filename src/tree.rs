//! Subtree assembly.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::db::{store, Db};
use crate::error::{KbError, Result};
use crate::ledger;
use crate::model::TreeNode;

/// A node whose children are known by id but not built yet.
struct Pending {
    node: TreeNode,
    child_ids: Vec<String>,
}

/// Materialize `root_id` and every descendant.
///
/// `version` pins the root only; each descendant is shown at its own latest
/// version. Children keep the order the child listing returns them in. The
/// whole walk reads from one snapshot, so concurrent moves never show a topic
/// twice or drop it.
pub async fn get_topic_tree(db: &Db, root_id: &str, version: Option<u32>) -> Result<TreeNode> {
    let root_id = root_id.to_string();
    log::debug!("Assembling tree for topic {} at version {:?}", root_id, version);
    db.with_snapshot(move |conn| assemble_tree(conn, &root_id, version)).await
}

/// Walks the subtree with an explicit stack, then builds nodes bottom-up.
pub(crate) fn assemble_tree(
    conn: &Connection,
    root_id: &str,
    version: Option<u32>,
) -> Result<TreeNode> {
    let root = ledger::require_topic(conn, root_id)?;

    let mut discovered: Vec<Pending> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, Option<u32>)> = vec![(root.id.clone(), version)];
    seen.insert(root.id.clone());

    while let Some((id, pinned)) = stack.pop() {
        let resolved = ledger::resolve_version(conn, &id, pinned)?;
        let resources = store::list_resources(conn, &id)?;
        let child_ids: Vec<String> = store::list_children(conn, &id)?
            .into_iter()
            .map(|child| child.id)
            .collect();

        for child_id in &child_ids {
            if !seen.insert(child_id.clone()) {
                log::error!("Topic {} reached twice while assembling tree {}", child_id, root.id);
                return Err(KbError::Integrity(format!(
                    "Topic {} appears more than once below {}",
                    child_id, root.id
                )));
            }
            stack.push((child_id.clone(), None));
        }

        discovered.push(Pending {
            node: TreeNode {
                id,
                name: resolved.name,
                version: resolved.version,
                content: resolved.content,
                resources,
                children: Vec::new(),
            },
            child_ids,
        });
    }

    // A child is always discovered after its parent, so walking the list
    // backwards finishes every child before the parent that claims it.
    let mut built: HashMap<String, TreeNode> = HashMap::with_capacity(discovered.len());
    for pending in discovered.into_iter().rev() {
        let mut node = pending.node;
        node.children = pending
            .child_ids
            .iter()
            .map(|child_id| {
                built.remove(child_id).ok_or_else(|| {
                    KbError::Integrity(format!("Topic {} missing from assembled tree", child_id))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        built.insert(node.id.clone(), node);
    }

    built
        .remove(&root.id)
        .ok_or_else(|| KbError::Integrity(format!("Tree for topic {} did not assemble", root.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{new_topic, setup_test_db};
    use crate::ledger::{update_topic, delete_topic};
    use crate::db::store;
    use crate::model::TopicUpdate;
    use rusqlite::params;

    fn ids(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_tree_shape_and_order() {
        let (db, _temp) = setup_test_db().await;
        let t1 = new_topic(&db, "1", None).await;
        let t2 = new_topic(&db, "2", Some(&t1.id)).await;
        let t3 = new_topic(&db, "3", Some(&t2.id)).await;
        let t4 = new_topic(&db, "4", Some(&t2.id)).await;

        let tree = get_topic_tree(&db, &t1.id, None).await.unwrap();
        assert_eq!(tree.id, t1.id);
        assert_eq!(ids(&tree.children), vec![t2.id.as_str()]);
        assert_eq!(ids(&tree.children[0].children), vec![t3.id.as_str(), t4.id.as_str()]);
        assert!(tree.children[0].children[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_tree_of_leaf() {
        let (db, _temp) = setup_test_db().await;
        let t1 = new_topic(&db, "solo", None).await;

        let tree = get_topic_tree(&db, &t1.id, None).await.unwrap();
        assert_eq!(tree.name, "solo");
        assert_eq!(tree.version, 1);
        assert!(tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_version_pins_only_root() {
        let (db, _temp) = setup_test_db().await;
        let root = new_topic(&db, "root", None).await;
        let child = new_topic(&db, "child", Some(&root.id)).await;

        let edit = |name: &str| TopicUpdate {
            name: Some(name.to_string()),
            content: None,
        };
        update_topic(&db, &root.id, edit("root v2")).await.unwrap();
        update_topic(&db, &root.id, edit("root v3")).await.unwrap();
        for i in 2..=4 {
            update_topic(&db, &child.id, edit(&format!("child v{}", i))).await.unwrap();
        }

        let tree = get_topic_tree(&db, &root.id, Some(2)).await.unwrap();
        assert_eq!(tree.version, 2);
        assert_eq!(tree.name, "root v2");
        assert_eq!(tree.children[0].version, 4);
        assert_eq!(tree.children[0].name, "child v4");
    }

    #[tokio::test]
    async fn test_tree_missing_root_or_version() {
        let (db, _temp) = setup_test_db().await;
        let root = new_topic(&db, "root", None).await;

        let err = get_topic_tree(&db, "missing", None).await.unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));
        let err = get_topic_tree(&db, &root.id, Some(3)).await.unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));

        delete_topic(&db, &root.id).await.unwrap();
        assert!(get_topic_tree(&db, &root.id, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_deep_chain_does_not_recurse() {
        let (db, _temp) = setup_test_db().await;
        let root = new_topic(&db, "level 0", None).await;
        let mut parent = root.id.clone();
        for depth in 1..200 {
            parent = new_topic(&db, &format!("level {}", depth), Some(&parent)).await.id;
        }

        let tree = get_topic_tree(&db, &root.id, None).await.unwrap();
        let mut depth = 0;
        let mut node = &tree;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 199);
        assert_eq!(node.id, parent);
    }

    #[tokio::test]
    async fn test_cyclic_data_is_integrity_error() {
        let (db, _temp) = setup_test_db().await;
        let a = new_topic(&db, "a", None).await;
        let b = new_topic(&db, "b", Some(&a.id)).await;
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        db.with_connection(move |conn| {
            conn.execute("UPDATE topics SET parent_id = ?2 WHERE id = ?1", params![a_id, b_id])?;
            Ok(())
        })
        .await
        .unwrap();

        let err = get_topic_tree(&db, &a.id, None).await.unwrap_err();
        assert!(matches!(err, KbError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_tree_walk_ignores_concurrent_move() {
        let (db, _temp) = setup_test_db().await;
        let root = new_topic(&db, "root", None).await;
        let a = new_topic(&db, "a", Some(&root.id)).await;
        let b = new_topic(&db, "b", Some(&root.id)).await;
        let x = new_topic(&db, "x", Some(&a.id)).await;

        let writer = db.clone();
        let (root_id, b_id, x_id) = (root.id.clone(), b.id.clone(), x.id.clone());
        let (before, during) = db
            .with_snapshot(move |conn| {
                let before = assemble_tree(conn, &root_id, None)?;

                let other = writer.open_connection()?;
                store::set_parent(&other, &x_id, Some(b_id.as_str()))?;

                let during = assemble_tree(conn, &root_id, None)?;
                Ok((before, during))
            })
            .await
            .unwrap();

        assert_eq!(before, during);
        assert_eq!(ids(&during.children[0].children), vec![x.id.as_str()]);
        assert!(during.children[1].children.is_empty());

        let after = get_topic_tree(&db, &root.id, None).await.unwrap();
        assert!(after.children[0].children.is_empty());
        assert_eq!(ids(&after.children[1].children), vec![x.id.as_str()]);
    }
}
