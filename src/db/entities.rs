//! Database queries for entity rows.

use crate::models::{Entity, EntityKind, Fields};
use sqlx::{Executor, FromRow, Sqlite};

/// Raw `entities` row; `fields` is a JSON object.
#[derive(Debug, Clone, FromRow)]
pub struct EntityRow {
    pub id: String,
    pub fields: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl EntityRow {
    /// Decode the stored JSON field set.
    pub fn into_entity(self) -> Result<Entity, serde_json::Error> {
        let fields: Fields = serde_json::from_str(&self.fields)?;
        Ok(Entity {
            id: self.id,
            fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// All rows of a kind, in insertion order.
pub async fn list_entities<'e, E>(
    executor: E,
    kind: EntityKind,
) -> Result<Vec<EntityRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, EntityRow>(
        "SELECT id, fields, created_at, updated_at FROM entities WHERE kind = ? ORDER BY rowid ASC",
    )
    .bind(kind.as_str())
    .fetch_all(executor)
    .await
}

/// A single row by identity.
pub async fn get_entity<'e, E>(
    executor: E,
    kind: EntityKind,
    id: &str,
) -> Result<Option<EntityRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, EntityRow>(
        "SELECT id, fields, created_at, updated_at FROM entities WHERE kind = ? AND id = ?",
    )
    .bind(kind.as_str())
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Insert or overwrite an entity. An existing row keeps its rowid (and so its position).
pub async fn upsert_entity<'e, E>(
    executor: E,
    kind: EntityKind,
    entity: &Entity,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let fields = serde_json::to_string(&entity.fields)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO entities (kind, id, fields, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(kind, id) DO UPDATE SET
            fields = excluded.fields,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(kind.as_str())
    .bind(&entity.id)
    .bind(fields)
    .bind(entity.created_at)
    .bind(entity.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}
