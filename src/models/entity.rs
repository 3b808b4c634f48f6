//! Synchronized entity model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Mutable field set of an entity; also the shape of a partial-update patch.
pub type Fields = Map<String, Value>;

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Issue,
    Project,
    Cycle,
    Team,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Issue, Self::Project, Self::Cycle, Self::Team];

    /// Value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Project => "project",
            Self::Cycle => "cycle",
            Self::Team => "team",
        }
    }

    /// Key under which the fallback store keeps this kind's collection.
    pub fn collection_key(&self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::Project => "projects",
            Self::Cycle => "cycles",
            Self::Team => "teams",
        }
    }

    /// Whether the tracker API can seed this kind. Cycles and teams only exist locally.
    pub fn is_remote_backed(&self) -> bool {
        matches!(self, Self::Issue | Self::Project)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(Self::Issue),
            "project" => Ok(Self::Project),
            "cycle" => Ok(Self::Cycle),
            "team" => Ok(Self::Team),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// A synchronized record.
///
/// The identifier is the only deduplication key: two entities with the same
/// `id` are the same entity no matter which store produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Globally unique identifier (tracker key for remote entities, UUID for local ones).
    pub id: String,

    /// Kind-specific fields.
    #[serde(default)]
    pub fields: Fields,

    /// Creation timestamp (Unix).
    pub created_at: i64,

    /// Last update timestamp (Unix).
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Entity {
    /// Create an entity that has never been updated.
    pub fn new(id: impl Into<String>, fields: Fields, created_at: i64) -> Self {
        Self {
            id: id.into(),
            fields,
            created_at,
            updated_at: None,
        }
    }

    /// Look up a field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Look up a string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Shallow-merge `patch` over the current fields and stamp `updated_at`.
    ///
    /// Keys absent from the patch are left untouched. An `id` key in the patch
    /// is ignored; identity never changes.
    pub fn apply_patch(&mut self, patch: &Fields, now: i64) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
        self.updated_at = Some(now);
    }
}

/// Insertion-ordered mapping from identifier to entity.
///
/// Serializes as a plain array of entities. Deserializing an array that
/// repeats an identifier keeps the first position and the last value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct EntityCollection {
    entries: IndexMap<String, Entity>,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace an entity. A replaced entity keeps its original position.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entries.insert(entity.id.clone(), entity)
    }

    /// Remove an entity, preserving the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entries.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entries.values()
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.entries.into_values().collect()
    }
}

impl From<Vec<Entity>> for EntityCollection {
    fn from(entities: Vec<Entity>) -> Self {
        entities.into_iter().collect()
    }
}

impl From<EntityCollection> for Vec<Entity> {
    fn from(collection: EntityCollection) -> Self {
        collection.into_vec()
    }
}

impl FromIterator<Entity> for EntityCollection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut collection = Self::new();
        for entity in iter {
            collection.insert(entity);
        }
        collection
    }
}

impl IntoIterator for EntityCollection {
    type Item = Entity;
    type IntoIter = indexmap::map::IntoValues<String, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
