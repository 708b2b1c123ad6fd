//! Row-level access to topics, topic versions and resources.
//!
//! Every function takes a plain `&Connection`, so the same calls run either
//! standalone or inside [`Db::with_transaction`](super::Db::with_transaction)
//! (a `Transaction` derefs to `Connection`). Listing queries order by rowid,
//! which is insertion order.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{KbError, Result};
use crate::model::{NewResource, Resource, ResourceType, Topic, TopicVersion};

const TOPIC_COLUMNS: &str = "id, parent_id, created_at";
const VERSION_COLUMNS: &str =
    "id, topic_id, version, name, content, is_latest, created_at, updated_at";
const RESOURCE_COLUMNS: &str =
    "id, topic_id, url, description, resource_type, created_at, updated_at";

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<TopicVersion> {
    Ok(TopicVersion {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        version: row.get(2)?,
        name: row.get(3)?,
        content: row.get(4)?,
        is_latest: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let kind: String = row.get(4)?;
    let resource_type = kind.parse::<ResourceType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Resource {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        resource_type,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ── Topics ───────────────────────────────────────────────────────────

pub fn find_topic(conn: &Connection, id: &str) -> Result<Option<Topic>> {
    let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1");
    Ok(conn.query_row(&query, params![id], topic_from_row).optional()?)
}

/// Every topic in the store.
pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let query = format!("SELECT {TOPIC_COLUMNS} FROM topics ORDER BY rowid");
    let mut stmt = conn.prepare(&query)?;
    let topics = stmt
        .query_map([], topic_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(topics)
}

pub fn list_root_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let query =
        format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE parent_id IS NULL ORDER BY rowid");
    let mut stmt = conn.prepare(&query)?;
    let topics = stmt
        .query_map([], topic_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(topics)
}

/// Direct children of `parent_id`.
pub fn list_children(conn: &Connection, parent_id: &str) -> Result<Vec<Topic>> {
    let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE parent_id = ?1 ORDER BY rowid");
    let mut stmt = conn.prepare(&query)?;
    let topics = stmt
        .query_map(params![parent_id], topic_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(topics)
}

pub fn insert_topic(conn: &Connection, parent_id: Option<&str>) -> Result<Topic> {
    let topic = Topic {
        id: Uuid::new_v4().to_string(),
        parent_id: parent_id.map(str::to_string),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO topics (id, parent_id, created_at) VALUES (?1, ?2, ?3)",
        params![topic.id, topic.parent_id, topic.created_at],
    )?;
    Ok(topic)
}

pub fn set_parent(conn: &Connection, topic_id: &str, parent_id: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE topics SET parent_id = ?2 WHERE id = ?1",
        params![topic_id, parent_id],
    )?;
    if changed == 0 {
        return Err(KbError::NotFound(format!("Topic with ID {} not found", topic_id)));
    }
    Ok(())
}

/// Move every child of `from` under `to`. Returns how many moved.
pub fn reparent_children(conn: &Connection, from: &str, to: Option<&str>) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE topics SET parent_id = ?2 WHERE parent_id = ?1",
        params![from, to],
    )?;
    Ok(moved)
}

/// Delete a topic. Versions, resources and descendants go by FK cascade.
/// Returns false when no such topic existed.
pub fn delete_topic(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM topics WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ── Versions ─────────────────────────────────────────────────────────

/// Rows flagged latest for a topic. A healthy topic has exactly one.
pub fn latest_versions(conn: &Connection, topic_id: &str) -> Result<Vec<TopicVersion>> {
    let query = format!(
        "SELECT {VERSION_COLUMNS} FROM topic_versions \
         WHERE topic_id = ?1 AND is_latest = 1 ORDER BY version"
    );
    let mut stmt = conn.prepare(&query)?;
    let versions = stmt
        .query_map(params![topic_id], version_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(versions)
}

pub fn find_version(
    conn: &Connection,
    topic_id: &str,
    version: u32,
) -> Result<Option<TopicVersion>> {
    let query = format!(
        "SELECT {VERSION_COLUMNS} FROM topic_versions WHERE topic_id = ?1 AND version = ?2"
    );
    Ok(conn
        .query_row(&query, params![topic_id, version], version_from_row)
        .optional()?)
}

/// Full history of a topic, oldest first.
pub fn list_versions(conn: &Connection, topic_id: &str) -> Result<Vec<TopicVersion>> {
    let query = format!(
        "SELECT {VERSION_COLUMNS} FROM topic_versions WHERE topic_id = ?1 ORDER BY version"
    );
    let mut stmt = conn.prepare(&query)?;
    let versions = stmt
        .query_map(params![topic_id], version_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(versions)
}

/// Insert a version flagged latest. Callers clear the previous latest row
/// in the same transaction.
pub fn insert_version(
    conn: &Connection,
    topic_id: &str,
    version: u32,
    name: &str,
    content: &str,
) -> Result<TopicVersion> {
    let ts = now();
    let row = TopicVersion {
        id: Uuid::new_v4().to_string(),
        topic_id: topic_id.to_string(),
        version,
        name: name.to_string(),
        content: content.to_string(),
        is_latest: true,
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        r#"
        INSERT INTO topic_versions (
            id, topic_id, version, name, content, is_latest, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
        "#,
        params![
            row.id,
            row.topic_id,
            row.version,
            row.name,
            row.content,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(row)
}

/// Drop the latest flag from one version row.
pub fn clear_latest(conn: &Connection, version_id: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE topic_versions SET is_latest = 0, updated_at = ?2 WHERE id = ?1 AND is_latest = 1",
        params![version_id, now()],
    )?;
    if changed != 1 {
        return Err(KbError::Integrity(format!(
            "Version {} was no longer flagged latest",
            version_id
        )));
    }
    Ok(())
}

// ── Resources ────────────────────────────────────────────────────────

pub fn list_resources(conn: &Connection, topic_id: &str) -> Result<Vec<Resource>> {
    let query =
        format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE topic_id = ?1 ORDER BY rowid");
    let mut stmt = conn.prepare(&query)?;
    let resources = stmt
        .query_map(params![topic_id], resource_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(resources)
}

/// A resource, only if it belongs to `topic_id`.
pub fn find_resource(
    conn: &Connection,
    topic_id: &str,
    resource_id: &str,
) -> Result<Option<Resource>> {
    let query = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1 AND topic_id = ?2");
    Ok(conn
        .query_row(&query, params![resource_id, topic_id], resource_from_row)
        .optional()?)
}

pub fn insert_resource(conn: &Connection, topic_id: &str, input: &NewResource) -> Result<Resource> {
    let ts = now();
    let resource = Resource {
        id: Uuid::new_v4().to_string(),
        url: input.url.clone(),
        description: input.description.clone(),
        resource_type: input.resource_type,
        created_at: ts.clone(),
        updated_at: ts,
        topic_id: topic_id.to_string(),
    };
    conn.execute(
        r#"
        INSERT INTO resources (
            id, topic_id, url, description, resource_type, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            resource.id,
            resource.topic_id,
            resource.url,
            resource.description,
            resource.resource_type.as_str(),
            resource.created_at,
            resource.updated_at,
        ],
    )?;
    Ok(resource)
}

/// Persist the mutable fields of `resource` and stamp `updated_at`.
pub fn update_resource(conn: &Connection, resource: &mut Resource) -> Result<()> {
    resource.updated_at = now();
    conn.execute(
        "UPDATE resources \
         SET url = ?2, description = ?3, resource_type = ?4, updated_at = ?5 \
         WHERE id = ?1",
        params![
            resource.id,
            resource.url,
            resource.description,
            resource.resource_type.as_str(),
            resource.updated_at,
        ],
    )?;
    Ok(())
}

pub fn delete_resource(conn: &Connection, resource_id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM resources WHERE id = ?1", params![resource_id])?;
    Ok(deleted > 0)
}
