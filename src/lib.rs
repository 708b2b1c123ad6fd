pub mod config;
pub mod error;
pub mod db;
pub mod model;
pub mod ledger;
pub mod tree;
pub mod graph;
pub mod resources;
pub mod http;

pub use config::Config;
pub use error::{KbError, Result};
pub use graph::find_shortest_path;
pub use ledger::{
    create_topic, delete_topic, delete_topic_with, list_root_topics, list_versions, move_topic,
    read_topic, update_topic,
};
pub use tree::get_topic_tree;
