//! BFS shortest path over the topic graph.

use std::collections::{HashSet, VecDeque};

use rusqlite::Connection;

use crate::db::Db;
use crate::error::{KbError, Result};
use crate::graph::{load_adjacency, Adjacency};
use crate::ledger;
use crate::model::TopicPath;

/// Shortest path from `start` to `end` as a list of topic ids, endpoints
/// included. Returns `None` when `end` is unreachable.
///
/// The first path found wins; ties go to whichever neighbor the adjacency
/// list names first.
pub fn find_path(graph: &Adjacency, start: &str, end: &str) -> Option<Vec<String>> {
    if start == end {
        return Some(vec![start.to_string()]);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, Vec<String>)> = VecDeque::new();

    visited.insert(start);
    queue.push_back((start, vec![start.to_string()]));

    while let Some((node, path)) = queue.pop_front() {
        let neighbors = match graph.get(node) {
            Some(neighbors) => neighbors,
            None => continue,
        };

        for neighbor in neighbors {
            if neighbor == end {
                let mut found = path.clone();
                found.push(neighbor.clone());
                return Some(found);
            }

            if visited.insert(neighbor.as_str()) {
                let mut extended = path.clone();
                extended.push(neighbor.clone());
                queue.push_back((neighbor.as_str(), extended));
            }
        }
    }

    None
}

/// Find the shortest path between two topics.
///
/// Both endpoints must exist. The graph is built from the whole topic set on
/// every call, and each topic on the path is returned at its latest version.
pub async fn find_shortest_path(db: &Db, start_id: &str, end_id: &str) -> Result<TopicPath> {
    let start_id = start_id.to_string();
    let end_id = end_id.to_string();

    let result = db
        .with_snapshot(move |conn| shortest_path_in(conn, &start_id, &end_id))
        .await?;

    log::debug!(
        "Path {} -> {} has distance {}",
        result.start_topic.id,
        result.end_topic.id,
        result.distance
    );
    Ok(result)
}

/// Graph load, search and hydration over one connection. Callers hold a
/// snapshot so the hydrated path matches the graph it was found in.
pub(crate) fn shortest_path_in(
    conn: &Connection,
    start_id: &str,
    end_id: &str,
) -> Result<TopicPath> {
    let start_topic = ledger::load_view(conn, start_id, None)?;
    let end_topic = ledger::load_view(conn, end_id, None)?;

    let graph = load_adjacency(conn)?;
    let ids = find_path(&graph, &start_topic.id, &end_topic.id).ok_or_else(|| {
        KbError::Unprocessable(format!(
            "No path exists between topics {} and {}",
            start_topic.id, end_topic.id
        ))
    })?;

    let path = ids
        .iter()
        .map(|id| ledger::load_view(conn, id, None))
        .collect::<Result<Vec<_>>>()?;

    Ok(TopicPath {
        distance: path.len() - 1,
        path,
        start_topic,
        end_topic,
    })
}
