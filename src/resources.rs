//! Reference resources attached to topics.

use rusqlite::Connection;
use url::Url;

use crate::db::{store, Db};
use crate::error::{KbError, Result};
use crate::ledger;
use crate::model::{NewResource, Resource, ResourceUpdate};

fn validate_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw)
        .map_err(|e| KbError::InvalidInput(format!("Invalid resource url {}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(KbError::InvalidInput(format!("Unsupported url scheme: {}", other))),
    }
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(KbError::InvalidInput("description must not be empty".to_string()));
    }
    Ok(())
}

fn require_resource(conn: &Connection, topic_id: &str, resource_id: &str) -> Result<Resource> {
    store::find_resource(conn, topic_id, resource_id)?.ok_or_else(|| {
        KbError::NotFound(format!(
            "Resource with ID {} not found for topic {}",
            resource_id, topic_id
        ))
    })
}

pub async fn create_resource(db: &Db, topic_id: &str, input: NewResource) -> Result<Resource> {
    validate_url(&input.url)?;
    validate_description(&input.description)?;

    let topic_id = topic_id.to_string();
    let resource = db
        .with_transaction(move |conn| {
            let topic = ledger::require_topic(conn, &topic_id)?;
            store::insert_resource(conn, &topic.id, &input)
        })
        .await?;
    log::info!(
        "Attached {} resource {} to topic {}",
        resource.resource_type,
        resource.id,
        resource.topic_id
    );
    Ok(resource)
}

pub async fn list_resources(db: &Db, topic_id: &str) -> Result<Vec<Resource>> {
    let topic_id = topic_id.to_string();
    db.with_snapshot(move |conn| {
        let topic = ledger::require_topic(conn, &topic_id)?;
        store::list_resources(conn, &topic.id)
    })
    .await
}

/// Apply the fields present in `update`, keeping the rest.
pub async fn update_resource(
    db: &Db,
    topic_id: &str,
    resource_id: &str,
    update: ResourceUpdate,
) -> Result<Resource> {
    if let Some(url) = update.url.as_deref() {
        validate_url(url)?;
    }
    if let Some(description) = update.description.as_deref() {
        validate_description(description)?;
    }

    let topic_id = topic_id.to_string();
    let resource_id = resource_id.to_string();
    db.with_transaction(move |conn| {
        let mut resource = require_resource(conn, &topic_id, &resource_id)?;
        if let Some(url) = update.url {
            resource.url = url;
        }
        if let Some(description) = update.description {
            resource.description = description;
        }
        if let Some(resource_type) = update.resource_type {
            resource.resource_type = resource_type;
        }
        store::update_resource(conn, &mut resource)?;
        Ok(resource)
    })
    .await
}

/// Delete a resource. It must belong to `topic_id`.
pub async fn delete_resource(db: &Db, topic_id: &str, resource_id: &str) -> Result<()> {
    let topic_id = topic_id.to_string();
    let resource_id = resource_id.to_string();
    let removed = db
        .with_transaction(move |conn| {
            let resource = require_resource(conn, &topic_id, &resource_id)?;
            store::delete_resource(conn, &resource.id)?;
            Ok(resource)
        })
        .await?;
    log::info!("Removed resource {} from topic {}", removed.id, removed.topic_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{new_topic, setup_test_db};
    use crate::ledger::{read_topic, update_topic};
    use crate::model::{ResourceType, TopicUpdate};

    fn article(url: &str) -> NewResource {
        NewResource {
            url: url.to_string(),
            description: "Reading".to_string(),
            resource_type: ResourceType::Article,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (db, _temp) = setup_test_db().await;
        let topic = new_topic(&db, "Rust", None).await;

        let first = create_resource(&db, &topic.id, article("https://a.example/1")).await.unwrap();
        let second = create_resource(&db, &topic.id, article("https://a.example/2")).await.unwrap();
        assert_eq!(first.topic_id, topic.id);

        let listed = list_resources(&db, &topic.id).await.unwrap();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test]
    async fn test_create_on_missing_topic() {
        let (db, _temp) = setup_test_db().await;
        let err = create_resource(&db, "ghost", article("https://a.example")).await.unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_url() {
        let (db, _temp) = setup_test_db().await;
        let topic = new_topic(&db, "Rust", None).await;

        let err = create_resource(&db, &topic.id, article("not a url")).await.unwrap_err();
        assert!(matches!(err, KbError::InvalidInput(_)));
        let err = create_resource(&db, &topic.id, article("ftp://files.example/x")).await.unwrap_err();
        assert!(matches!(err, KbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_resources_survive_version_updates() {
        let (db, _temp) = setup_test_db().await;
        let topic = new_topic(&db, "Rust", None).await;
        create_resource(&db, &topic.id, article("https://a.example")).await.unwrap();

        let updated = update_topic(
            &db,
            &topic.id,
            TopicUpdate {
                name: Some("Rust 2".to_string()),
                content: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.resources.len(), 1);
        assert_eq!(read_topic(&db, &topic.id, Some(1)).await.unwrap().resources.len(), 1);
    }

    #[tokio::test]
    async fn test_update_resource_partial() {
        let (db, _temp) = setup_test_db().await;
        let topic = new_topic(&db, "Rust", None).await;
        let res = create_resource(&db, &topic.id, article("https://a.example")).await.unwrap();

        let updated = update_resource(
            &db,
            &topic.id,
            &res.id,
            ResourceUpdate {
                url: None,
                description: Some("Talk".to_string()),
                resource_type: Some(ResourceType::Video),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.url, "https://a.example");
        assert_eq!(updated.description, "Talk");
        assert_eq!(updated.resource_type, ResourceType::Video);
        assert_eq!(list_resources(&db, &topic.id).await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn test_delete_resource_scoped_to_topic() {
        let (db, _temp) = setup_test_db().await;
        let owner = new_topic(&db, "owner", None).await;
        let other = new_topic(&db, "other", None).await;
        let res = create_resource(&db, &owner.id, article("https://a.example")).await.unwrap();

        let err = delete_resource(&db, &other.id, &res.id).await.unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));

        delete_resource(&db, &owner.id, &res.id).await.unwrap();
        assert!(list_resources(&db, &owner.id).await.unwrap().is_empty());

        let err = delete_resource(&db, &owner.id, &res.id).await.unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));
    }
}
