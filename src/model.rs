//! Records stored in the knowledge base and the views composed from them.
//!
//! Records mirror table rows one to one. Views are what callers get back:
//! a topic joined with one of its versions and its resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KbError;

/// A node in the hierarchy. Content lives in [`TopicVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    /// `None` for root topics.
    pub parent_id: Option<String>,
    pub created_at: String,
}

/// Immutable content snapshot of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicVersion {
    pub id: String,
    pub topic_id: String,
    /// Starts at 1, increments by one per update.
    pub version: u32,
    pub name: String,
    pub content: String,
    pub is_latest: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Video,
    Article,
    Pdf,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Video => "video",
            ResourceType::Article => "article",
            ResourceType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ResourceType::Video),
            "article" => Ok(ResourceType::Article),
            "pdf" => Ok(ResourceType::Pdf),
            other => Err(KbError::InvalidInput(format!("Unknown resource type: {}", other))),
        }
    }
}

/// Reference material attached to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub url: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub created_at: String,
    pub updated_at: String,
    pub topic_id: String,
}

/// A topic resolved to one version, with its resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub content: String,
    pub parent_id: Option<String>,
    pub resources: Vec<Resource>,
}

impl TopicView {
    pub fn compose(topic: &Topic, version: TopicVersion, resources: Vec<Resource>) -> Self {
        Self {
            id: topic.id.clone(),
            name: version.name,
            version: version.version,
            content: version.content,
            parent_id: topic.parent_id.clone(),
            resources,
        }
    }
}

/// A topic with its resolved content and all of its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub content: String,
    pub resources: Vec<Resource>,
    pub children: Vec<TreeNode>,
}

/// Result of a shortest path query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPath {
    pub path: Vec<TopicView>,
    /// Number of edges on `path`.
    pub distance: usize,
    pub start_topic: TopicView,
    pub end_topic: TopicView,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTopic {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Fields left as `None` are carried over from the current latest version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub url: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<ResourceType>,
}

/// What happens to the children of a deleted topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Children are deleted with their parent (storage cascade).
    #[default]
    Cascade,
    /// Children are moved under the deleted topic's parent first.
    Reparent,
}
