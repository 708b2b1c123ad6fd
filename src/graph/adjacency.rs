//! Undirected adjacency map over the full topic set.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::db::store;
use crate::error::Result;
use crate::model::Topic;

/// Topic id -> neighbor ids (parent first, then children in listing order).
pub type Adjacency = HashMap<String, Vec<String>>;

/// Build the adjacency map from a flat topic list.
///
/// Sibling order follows the order of `topics`, which is the child listing
/// order of the store.
pub fn build_adjacency(topics: &[Topic]) -> Adjacency {
    let mut children: HashMap<&str, Vec<String>> = HashMap::new();
    for topic in topics {
        if let Some(parent_id) = topic.parent_id.as_deref() {
            children.entry(parent_id).or_default().push(topic.id.clone());
        }
    }

    let mut graph = Adjacency::with_capacity(topics.len());
    for topic in topics {
        let mut neighbors = Vec::new();
        if let Some(parent_id) = &topic.parent_id {
            neighbors.push(parent_id.clone());
        }
        if let Some(kids) = children.remove(topic.id.as_str()) {
            neighbors.extend(kids);
        }
        graph.insert(topic.id.clone(), neighbors);
    }
    graph
}

/// Read every topic and build a fresh adjacency map.
pub fn load_adjacency(conn: &Connection) -> Result<Adjacency> {
    let topics = store::list_topics(conn)?;
    log::debug!("Building topic graph over {} topics", topics.len());
    Ok(build_adjacency(&topics))
}
