#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cachet_api::ResourceObject;
use cachet_core::{
    Entity, EntityMeta, Extract, Field, MappingError, ModelCache, PathValue, Relationship,
    attribute, entity_fields, relationship_id,
};

// ── Person ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub meta: EntityMeta,
    pub name: String,
    pub age: Option<u32>,
}

impl Person {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            meta: EntityMeta::with_id(id),
            name: name.into(),
            age: None,
        }
    }
}

impl Entity for Person {
    fn type_name() -> &'static str {
        "people"
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn declared_fields() -> Vec<Field<Self>> {
        entity_fields!(Person { name, age })
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(self.name.clone()));
        map
    }

    fn apply_attributes(&mut self, resource: &ResourceObject) -> Result<(), MappingError> {
        self.name = attribute::<Self, String>(resource, "name")?.unwrap_or_default();
        self.age = attribute::<Self, u32>(resource, "age")?;
        Ok(())
    }
}

// ── Article ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub meta: EntityMeta,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author_id: String,
    pub status: Status,
    pub created: PathValue<String>,
}

impl Default for Article {
    fn default() -> Self {
        Self {
            meta: EntityMeta::default(),
            title: None,
            body: None,
            author_id: String::new(),
            status: Status::Draft,
            created: PathValue::bind("attributes.created"),
        }
    }
}

impl Article {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            meta: EntityMeta::with_id(id),
            title: Some(title.into()),
            body: Some(format!("body of {title}")),
            author_id: "42".into(),
            ..Self::default()
        }
    }

    pub fn author(&self) -> Relationship {
        Relationship::to::<Person>(self.author_id.clone())
    }
}

impl Entity for Article {
    fn type_name() -> &'static str {
        "articles"
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn declared_fields() -> Vec<Field<Self>> {
        entity_fields!(Article { title, body, author_id, status, created })
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("title".into(), self.title.clone().map_or(Value::Null, Value::String));
        map.insert("body".into(), self.body.clone().map_or(Value::Null, Value::String));
        map
    }

    fn relationships(&self) -> BTreeMap<String, Relationship> {
        BTreeMap::from([("author".to_owned(), self.author())])
    }

    fn apply_attributes(&mut self, resource: &ResourceObject) -> Result<(), MappingError> {
        self.title = attribute::<Self, String>(resource, "title")?;
        self.body = attribute::<Self, String>(resource, "body")?;
        self.status = attribute::<Self, Status>(resource, "status")?.unwrap_or_default();
        Ok(())
    }

    fn apply_relationships(&mut self, resource: &ResourceObject) -> Result<(), MappingError> {
        self.author_id = relationship_id::<Self>(resource, "author")?;
        Ok(())
    }

    fn path_values_mut(&mut self) -> Vec<&mut dyn Extract> {
        vec![&mut self.created]
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn cache() -> ModelCache {
    let cache = ModelCache::in_memory();
    cache.register(&[Article::descriptor(), Person::descriptor()]);
    cache
}

pub const CANONICAL_LIST: &str = r#"{"data":[{"type":"articles","id":"1","attributes":{"title":"T","body":"B"},"relationships":{"author":{"data":{"id":"42","type":"people"}}}}]}"#;

pub const LIST_WITH_INCLUDED: &str = r#"{
  "data": [{
    "type": "articles",
    "id": "1",
    "attributes": {
      "title": "JSON API paints my bikeshed!",
      "body": "The shortest article. Ever.",
      "created": "2015-05-22T14:56:29.000Z",
      "updated": "2015-05-22T14:56:28.000Z"
    },
    "relationships": {
      "author": {
        "data": {"id": "42", "type": "people"}
      }
    }
  }],
  "included": [
    {
      "type": "people",
      "id": "42",
      "attributes": {
        "name": "John",
        "age": 80,
        "gender": "male"
      }
    }
  ]
}"#;

pub const CREATE_ECHO: &str = r#"{
  "data": {
    "type": "articles",
    "attributes": {
      "title": "test title",
      "body": "test body"
    },
    "relationships": {
      "author": {
        "data": { "type": "people", "id": "test id" }
      }
    }
  }
}"#;

pub fn single(id: &str, title: &str) -> String {
    format!(
        r#"{{"data":{{"type":"articles","id":"{id}","attributes":{{"title":"{title}","body":"b","status":"published"}},"relationships":{{"author":{{"data":{{"id":"42","type":"people"}}}}}}}}}}"#
    )
}
