//! Version ledger: topic writes and single-topic reads.
//!
//! Each topic has exactly one version row flagged latest. Writes that touch
//! the flag run inside one `BEGIN IMMEDIATE` transaction, so readers see
//! either the old latest row or the new one, never both or neither.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::db::{store, Db};
use crate::error::{KbError, Result};
use crate::model::{DeletePolicy, NewTopic, Topic, TopicUpdate, TopicVersion, TopicView};

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KbError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

pub(crate) fn require_topic(conn: &Connection, id: &str) -> Result<Topic> {
    store::find_topic(conn, id)?
        .ok_or_else(|| KbError::NotFound(format!("Topic with ID {} not found", id)))
}

/// The single version flagged latest. Zero or several flagged rows is an
/// integrity breach, reported rather than repaired.
pub(crate) fn latest_version(conn: &Connection, topic_id: &str) -> Result<TopicVersion> {
    let mut rows = store::latest_versions(conn, topic_id)?;
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => {
            log::error!("Topic {} has no version flagged latest", topic_id);
            Err(KbError::Integrity(format!("Latest version for topic {} not found", topic_id)))
        }
        n => {
            log::error!("Topic {} has {} versions flagged latest", topic_id, n);
            Err(KbError::Integrity(format!(
                "Topic {} has {} versions flagged latest",
                topic_id, n
            )))
        }
    }
}

/// Latest version when `version` is `None`, otherwise that exact number.
pub(crate) fn resolve_version(
    conn: &Connection,
    topic_id: &str,
    version: Option<u32>,
) -> Result<TopicVersion> {
    match version {
        None => latest_version(conn, topic_id),
        Some(number) => store::find_version(conn, topic_id, number)?.ok_or_else(|| {
            KbError::NotFound(format!("Topic version {} not found for topic {}", number, topic_id))
        }),
    }
}

/// Hydrate a topic id into its view: one version plus current resources.
pub(crate) fn load_view(conn: &Connection, id: &str, version: Option<u32>) -> Result<TopicView> {
    let topic = require_topic(conn, id)?;
    let resolved = resolve_version(conn, &topic.id, version)?;
    let resources = store::list_resources(conn, &topic.id)?;
    Ok(TopicView::compose(&topic, resolved, resources))
}

fn create_in(conn: &Connection, input: &NewTopic) -> Result<TopicView> {
    require_non_empty("name", &input.name)?;
    require_non_empty("content", &input.content)?;

    if let Some(parent_id) = input.parent_id.as_deref() {
        if store::find_topic(conn, parent_id)?.is_none() {
            return Err(KbError::NotFound(format!("Parent topic with ID {} not found", parent_id)));
        }
    }

    let topic = store::insert_topic(conn, input.parent_id.as_deref())?;
    let first = store::insert_version(conn, &topic.id, 1, &input.name, &input.content)?;

    Ok(TopicView::compose(&topic, first, Vec::new()))
}

fn update_in(conn: &Connection, id: &str, update: &TopicUpdate) -> Result<TopicView> {
    if let Some(name) = update.name.as_deref() {
        require_non_empty("name", name)?;
    }
    if let Some(content) = update.content.as_deref() {
        require_non_empty("content", content)?;
    }

    let topic = require_topic(conn, id)?;
    let current = latest_version(conn, &topic.id)?;

    let name = update.name.as_deref().unwrap_or(&current.name);
    let content = update.content.as_deref().unwrap_or(&current.content);

    store::clear_latest(conn, &current.id)?;
    let next = store::insert_version(conn, &topic.id, current.version + 1, name, content)?;
    let resources = store::list_resources(conn, &topic.id)?;

    Ok(TopicView::compose(&topic, next, resources))
}

fn delete_in(conn: &Connection, id: &str, policy: DeletePolicy) -> Result<()> {
    let topic = require_topic(conn, id)?;

    if policy == DeletePolicy::Reparent {
        let moved = store::reparent_children(conn, &topic.id, topic.parent_id.as_deref())?;
        log::debug!("Moved {} children of topic {} before delete", moved, topic.id);
    }

    store::delete_topic(conn, &topic.id)?;
    Ok(())
}

/// Reject `parent_id` when it is `id` itself or sits below `id`.
fn ensure_acyclic(conn: &Connection, id: &str, parent_id: &str) -> Result<()> {
    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id.to_string());

    while let Some(current) = cursor {
        if current == id {
            return Err(KbError::Cycle(format!(
                "Topic {} cannot be moved under its own descendant {}",
                id, parent_id
            )));
        }
        if !seen.insert(current.clone()) {
            return Err(KbError::Integrity(format!("Ancestry of topic {} loops", parent_id)));
        }
        cursor = require_topic(conn, &current)?.parent_id;
    }

    Ok(())
}

fn move_in(conn: &Connection, id: &str, parent_id: Option<&str>) -> Result<TopicView> {
    let topic = require_topic(conn, id)?;

    if let Some(parent_id) = parent_id {
        if store::find_topic(conn, parent_id)?.is_none() {
            return Err(KbError::NotFound(format!("Parent topic with ID {} not found", parent_id)));
        }
        ensure_acyclic(conn, &topic.id, parent_id)?;
    }

    store::set_parent(conn, &topic.id, parent_id)?;
    load_view(conn, &topic.id, None)
}

/// Create a topic with its first version (version 1, latest).
///
/// The topic row and the version row commit together or not at all.
pub async fn create_topic(db: &Db, input: NewTopic) -> Result<TopicView> {
    let view = db.with_transaction(move |conn| create_in(conn, &input)).await?;
    log::info!("Created topic {} (parent: {:?})", view.id, view.parent_id);
    Ok(view)
}

/// All topics without a parent, each at its latest version.
pub async fn list_root_topics(db: &Db) -> Result<Vec<TopicView>> {
    db.with_snapshot(|conn| {
        let roots = store::list_root_topics(conn)?;
        roots
            .iter()
            .map(|topic| load_view(conn, &topic.id, None))
            .collect()
    })
    .await
}

/// Read a topic at its latest version, or at `version` when given.
pub async fn read_topic(db: &Db, id: &str, version: Option<u32>) -> Result<TopicView> {
    let id = id.to_string();
    log::debug!("Reading topic {} at version {:?}", id, version);
    db.with_snapshot(move |conn| load_view(conn, &id, version)).await
}

/// Record an edit as a new version.
///
/// The new row gets `latest + 1` and inherits whatever `update` leaves out.
/// Clearing the old latest flag and inserting the new row share one
/// transaction; the current latest is read inside it so concurrent edits of
/// the same topic serialize.
pub async fn update_topic(db: &Db, id: &str, update: TopicUpdate) -> Result<TopicView> {
    let id = id.to_string();
    let view = db.with_transaction(move |conn| update_in(conn, &id, &update)).await?;
    log::info!("Topic {} now at version {}", view.id, view.version);
    Ok(view)
}

/// Delete a topic together with its versions, resources and descendants.
pub async fn delete_topic(db: &Db, id: &str) -> Result<()> {
    delete_topic_with(db, id, DeletePolicy::Cascade).await
}

/// Delete a topic, choosing what happens to its children.
pub async fn delete_topic_with(db: &Db, id: &str, policy: DeletePolicy) -> Result<()> {
    let id = id.to_string();
    let deleted = id.clone();
    db.with_transaction(move |conn| delete_in(conn, &id, policy)).await?;
    log::info!("Deleted topic {} ({:?})", deleted, policy);
    Ok(())
}

/// Attach a topic to a new parent, or make it a root with `None`.
pub async fn move_topic(db: &Db, id: &str, parent_id: Option<String>) -> Result<TopicView> {
    let id = id.to_string();
    let view = db
        .with_transaction(move |conn| move_in(conn, &id, parent_id.as_deref()))
        .await?;
    log::info!("Moved topic {} under {:?}", view.id, view.parent_id);
    Ok(view)
}

/// Every version of a topic, oldest first.
pub async fn list_versions(db: &Db, id: &str) -> Result<Vec<TopicVersion>> {
    let id = id.to_string();
    db.with_snapshot(move |conn| {
        let topic = require_topic(conn, &id)?;
        store::list_versions(conn, &topic.id)
    })
    .await
}
