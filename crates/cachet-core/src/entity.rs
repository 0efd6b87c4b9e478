// ── Entity contract ──
//
// Every cacheable domain type implements `Entity`. Identity lives in an
// embedded `EntityMeta`; persisted state is described by an explicit
// field list built with `entity_fields!`; wire mapping is split into
// attribute and relationship hooks that the default `from_wire_fragment`
// drives.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cachet_api::{ResourceIdentifier, ResourceObject};

use crate::cache::partition::{AnyPartition, Partition};
use crate::codec;
use crate::error::{MappingError, StoreError};
use crate::path_value::Extract;

// ── EntityMeta ──────────────────────────────────────────────────────

/// Base state shared by every entity: wire identity and cache membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: String,
    pub is_cached: bool,
}

impl EntityMeta {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_cached: false,
        }
    }
}

// ── Declared fields ─────────────────────────────────────────────────

/// One persisted field: its name plus a JSON getter and setter.
pub struct Field<E> {
    name: &'static str,
    get: fn(&E) -> Value,
    set: fn(&mut E, Value) -> Result<(), serde_json::Error>,
}

impl<E> Field<E> {
    pub fn new(
        name: &'static str,
        get: fn(&E) -> Value,
        set: fn(&mut E, Value) -> Result<(), serde_json::Error>,
    ) -> Self {
        Self { name, get, set }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    pub fn set(&self, entity: &mut E, value: Value) -> Result<(), serde_json::Error> {
        (self.set)(entity, value)
    }
}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Build the declared field list of an entity from its struct field names.
///
/// Each field must implement `Serialize + DeserializeOwned`; enums are
/// therefore stored by their serde tag.
///
/// ```ignore
/// fn declared_fields() -> Vec<Field<Self>> {
///     entity_fields!(Article { title, body, author_id })
/// }
/// ```
#[macro_export]
macro_rules! entity_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        vec![$(
            $crate::entity::Field::new(
                stringify!($field),
                |entity: &$ty| {
                    $crate::__private::serde_json::to_value(&entity.$field)
                        .unwrap_or($crate::__private::serde_json::Value::Null)
                },
                |entity: &mut $ty, value| {
                    entity.$field = $crate::__private::serde_json::from_value(value)?;
                    Ok(())
                },
            )
        ),*]
    };
}

// ── TypeDescriptor ──────────────────────────────────────────────────

/// Runtime handle for a registered entity type.
///
/// Carries the type name plus the monomorphized partition constructors the
/// cache needs to create, persist and restore a partition without knowing
/// the concrete type.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    name: &'static str,
    type_id: TypeId,
    pub(crate) new_partition: fn() -> Box<dyn AnyPartition>,
    pub(crate) decode_partition: fn(&[u8]) -> Result<Box<dyn AnyPartition>, StoreError>,
}

impl TypeDescriptor {
    pub fn of<E: Entity>() -> Self {
        Self {
            name: E::type_name(),
            type_id: TypeId::of::<E>(),
            new_partition: Partition::<E>::boxed,
            decode_partition: Partition::<E>::decode_boxed,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// `true` if this descriptor describes `E`.
    pub fn is<E: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDescriptor").field(&self.name).finish()
    }
}

// ── Relationship ────────────────────────────────────────────────────

/// A foreign-key style link to another entity's `(type, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: TypeDescriptor,
}

impl Relationship {
    /// Link to the entity of type `E` with identity `id`.
    pub fn to<E: Entity>(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TypeDescriptor::of::<E>(),
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.kind.name(), self.id.clone())
    }
}

// ── Entity ──────────────────────────────────────────────────────────

/// The capability set every cacheable domain type implements.
pub trait Entity: Clone + Default + Send + Sync + 'static {
    /// Stable discriminator, unique across registered types (e.g. `"articles"`).
    fn type_name() -> &'static str;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Fields walked by the byte codec, beyond `id` and `is_cached`.
    fn declared_fields() -> Vec<Field<Self>>;

    /// Attributes sent to the backend on create/update.
    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Relationships sent to the backend on create/update.
    fn relationships(&self) -> BTreeMap<String, Relationship> {
        BTreeMap::new()
    }

    /// Populate attribute fields from a resource object.
    fn apply_attributes(&mut self, _resource: &ResourceObject) -> Result<(), MappingError> {
        Ok(())
    }

    /// Populate relationship fields from a resource object.
    fn apply_relationships(&mut self, _resource: &ResourceObject) -> Result<(), MappingError> {
        Ok(())
    }

    /// `PathValue` fields refreshed against the resource's JSON on mapping.
    fn path_values_mut(&mut self) -> Vec<&mut dyn Extract> {
        Vec::new()
    }

    // ── Provided ─────────────────────────────────────────────────────

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>()
    }

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn set_id(&mut self, id: impl Into<String>) {
        self.meta_mut().id = id.into();
    }

    fn is_cached(&self) -> bool {
        self.meta().is_cached
    }

    /// Build an entity from a single JSON:API resource object.
    fn from_wire_fragment(resource: &ResourceObject) -> Result<Self, MappingError> {
        if resource.kind != Self::type_name() {
            return Err(MappingError::TypeMismatch {
                expected: Self::type_name().to_owned(),
                found: resource.kind.clone(),
            });
        }

        let mut entity = Self::default();
        entity.set_id(resource.id.clone().unwrap_or_default());
        entity.apply_attributes(resource)?;
        entity.apply_relationships(resource)?;

        let paths = entity.path_values_mut();
        if !paths.is_empty() {
            let document = resource.to_value();
            for path in paths {
                path.extract(&document);
            }
        }
        Ok(entity)
    }

    /// The resource object sent to the backend for this entity.
    fn to_wire_fragment(&self) -> ResourceObject {
        let mut resource = ResourceObject::new(Self::type_name()).with_attributes(self.attributes());
        if !self.id().is_empty() {
            resource = resource.with_id(self.id());
        }
        for (key, rel) in self.relationships() {
            resource = resource.with_relationship(key, &rel.identifier());
        }
        resource
    }

    fn to_persisted_bytes(&self) -> Result<Vec<u8>, StoreError> {
        codec::encode_entity(self)
    }

    fn from_persisted_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        codec::decode_entity(bytes)
    }
}

// ── Wire helpers ────────────────────────────────────────────────────

/// Read `relationships.<key>.data.id` from a resource object.
pub fn relationship_id<E: Entity>(resource: &ResourceObject, key: &str) -> Result<String, MappingError> {
    resource
        .relationship(key)
        .map(|linkage| linkage.id)
        .ok_or_else(|| MappingError::MissingRelationship {
            type_name: E::type_name().to_owned(),
            key: key.to_owned(),
        })
}

/// Like [`relationship_id`], but an absent or null linkage is `None`.
pub fn optional_relationship_id(resource: &ResourceObject, key: &str) -> Option<String> {
    resource.relationship(key).map(|linkage| linkage.id)
}

/// Read and convert an attribute. Absent and null attributes are `None`.
pub fn attribute<E, T>(resource: &ResourceObject, key: &str) -> Result<Option<T>, MappingError>
where
    E: Entity,
    T: serde::de::DeserializeOwned,
{
    match resource.attributes.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| MappingError::InvalidAttribute {
                type_name: E::type_name().to_owned(),
                field: key.to_owned(),
                reason: e.to_string(),
            }),
    }
}
