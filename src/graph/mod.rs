//! Topic graph: the hierarchy read as an undirected graph.
//!
//! Parent/child links become edges in both directions. The adjacency map is
//! rebuilt from storage on every query and breadth-first search finds the
//! shortest unweighted path between two topics.

mod adjacency;
mod traversal;

pub use adjacency::{build_adjacency, load_adjacency, Adjacency};
pub use traversal::{find_path, find_shortest_path};
