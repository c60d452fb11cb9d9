//! Entities, keys and the schema descriptors the rest of the crate reads them through.
//!
//! An [`Entity`] is a bag of named values of some [`TypeName`]. Which of those
//! values are references, many-valued links or polymorphic references is only
//! known through the type's [`TypeMeta`], handed out by a [`TypeMetadata`]
//! provider. Related entities are fetched from an [`EntitySource`].
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::DumpError;

/// Qualified type name, `group.model` (for example `simpleapp.article`).
///
/// Both halves are stored lowercase so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName {
    group: String,
    model: String,
}

impl TypeName {
    /// Parse `group.model`.
    ///
    /// # Errors
    /// Returns `DumpError::Configuration` when the name has no group part.
    pub fn parse(s: &str) -> Result<Self, DumpError> {
        match s.split_once('.') {
            Some((group, model)) if !group.is_empty() && !model.is_empty() => Ok(Self {
                group: group.to_ascii_lowercase(),
                model: model.to_ascii_lowercase(),
            }),
            _ => Err(DumpError::Configuration(format!(
                "You must specify the type as \"group.model\", got \"{s}\""
            ))),
        }
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.model)
    }
}

impl FromStr for TypeName {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeName {
    type Error = DumpError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TypeName> for String {
    fn from(t: TypeName) -> Self {
        t.to_string()
    }
}

/// Stable identifier of an entity within its type.
///
/// Integer ids order before string ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Read an id out of a stored value. `null` and non-scalar values have no id.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) => Some(EntityId::Str(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(i) => Value::from(*i),
            EntityId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{i}"),
            EntityId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(i: i64) -> Self {
        EntityId::Int(i)
    }
}

impl From<i32> for EntityId {
    fn from(i: i32) -> Self {
        EntityId::Int(i64::from(i))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Str(s.to_string())
    }
}

/// Node identity in the object graph: `(type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub type_name: TypeName,
    pub id: EntityId,
}

impl EntityKey {
    #[must_use]
    pub fn new(type_name: TypeName, id: impl Into<EntityId>) -> Self {
        Self { type_name, id: id.into() }
    }

    /// Display key without the identifier, for type-level diagrams.
    #[must_use]
    pub fn type_label(&self) -> String {
        self.type_name.to_string()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.id)
    }
}

/// A polymorphic reference: target type decided by a discriminator value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRef {
    pub discriminator: TypeName,
    pub target: EntityId,
}

impl GenericRef {
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey { type_name: self.discriminator.clone(), id: self.target.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    /// Points at exactly one entity of `target`. `unique` marks a one-to-one link.
    Reference {
        target: TypeName,
        #[serde(default)]
        unique: bool,
    },
    Many {
        target: TypeName,
    },
    /// Backed by two local fields: the discriminator (qualified type name) and the id.
    Generic {
        type_field: String,
        id_field: String,
    },
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default = "yes")]
    pub serialize: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub fn scalar(name: &str) -> Self {
        Self { name: name.to_string(), kind: FieldKind::Scalar, serialize: true }
    }

    #[must_use]
    pub fn reference(name: &str, target: TypeName) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Reference { target, unique: false },
            serialize: true,
        }
    }

    #[must_use]
    pub fn many(name: &str, target: TypeName) -> Self {
        Self { name: name.to_string(), kind: FieldKind::Many { target }, serialize: true }
    }

    /// Storage name of the field. References are stored with an `_id` suffix.
    #[must_use]
    pub fn attname(&self) -> String {
        match self.kind {
            FieldKind::Reference { .. } => format!("{}_id", self.name),
            _ => self.name.clone(),
        }
    }

    /// Name with any storage suffix removed.
    #[must_use]
    pub fn base_name(&self) -> String {
        let attname = self.attname();
        match self.kind {
            FieldKind::Reference { .. } => {
                attname.strip_suffix("_id").unwrap_or(&attname).to_string()
            }
            _ => attname,
        }
    }

    /// Whether this field is stored on the entity itself (polymorphic references are virtual).
    #[must_use]
    pub fn is_local(&self) -> bool {
        !matches!(self.kind, FieldKind::Generic { .. })
    }
}

/// Inverse accessor exposing every entity whose reference field points at this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseRelation {
    pub accessor: String,
    pub source_type: TypeName,
    pub field: String,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMeta {
    pub name: TypeName,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Set on alias types whose entities are the entities of another type.
    #[serde(default)]
    pub proxy_for: Option<TypeName>,
    #[serde(skip)]
    pub reverse: Vec<ReverseRelation>,
}

impl TypeMeta {
    #[must_use]
    pub fn new(name: TypeName, fields: Vec<FieldDescriptor>) -> Self {
        Self { name, fields, proxy_for: None, reverse: Vec::new() }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn reverse_relation(&self, accessor: &str) -> Option<&ReverseRelation> {
        self.reverse.iter().find(|r| r.accessor == accessor)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| matches!(f.kind, FieldKind::Reference { .. }))
    }

    pub fn many_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| matches!(f.kind, FieldKind::Many { .. }))
    }

    pub fn generic_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| matches!(f.kind, FieldKind::Generic { .. }))
    }
}

/// Schema lookups for the traversal and the serializer.
pub trait TypeMetadata {
    fn type_meta(&self, name: &TypeName) -> Option<&TypeMeta>;

    /// Whether any known type belongs to `group`.
    fn has_group(&self, group: &str) -> bool;

    /// Follow `proxy_for` links to the type that actually stores the entities.
    fn concrete_type(&self, name: &TypeName) -> TypeName {
        let mut current = name.clone();
        // bounded so a malformed proxy loop cannot spin forever
        for _ in 0..16 {
            match self.type_meta(&current).and_then(|m| m.proxy_for.clone()) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }
}

/// Materialized entities, looked up by key or by incoming reference.
pub trait EntitySource {
    /// Entities of `type_name`, restricted to `ids` when given, in stable id order.
    fn roots(&self, type_name: &TypeName, ids: Option<&[EntityId]>) -> Vec<Arc<Entity>>;

    fn get(&self, key: &EntityKey) -> Option<Arc<Entity>>;

    /// Entities of `source_type` whose reference or polymorphic field `field` points at `target`.
    fn referencing(
        &self,
        source_type: &TypeName,
        field: &str,
        target: &EntityKey,
    ) -> Vec<Arc<Entity>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub type_name: TypeName,
    pub id: Option<EntityId>,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new(type_name: TypeName, id: impl Into<EntityId>) -> Self {
        Self { type_name, id: Some(id.into()), values: Map::new() }
    }

    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.values.insert(field.to_string(), value.into());
        self
    }

    /// Graph key of this entity.
    ///
    /// # Errors
    /// Returns `DumpError::MissingIdentifier` when the entity has no id.
    pub fn key(&self) -> Result<EntityKey, DumpError> {
        match &self.id {
            Some(id) => Ok(EntityKey { type_name: self.type_name.clone(), id: id.clone() }),
            None => Err(DumpError::MissingIdentifier { type_name: self.type_name.clone() }),
        }
    }

    /// Stored value of a field, looked up by name and then by storage name.
    #[must_use]
    pub fn value(&self, field: &FieldDescriptor) -> Option<&Value> {
        self.values.get(&field.name).or_else(|| self.values.get(&field.attname()))
    }

    #[must_use]
    pub fn reference(&self, field: &FieldDescriptor) -> Option<EntityKey> {
        let FieldKind::Reference { target, .. } = &field.kind else {
            return None;
        };
        let id = self.value(field).and_then(EntityId::from_value)?;
        Some(EntityKey { type_name: target.clone(), id })
    }

    #[must_use]
    pub fn many(&self, field: &FieldDescriptor) -> Vec<EntityKey> {
        let FieldKind::Many { target } = &field.kind else {
            return Vec::new();
        };
        match self.value(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(EntityId::from_value)
                .map(|id| EntityKey { type_name: target.clone(), id })
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn generic(&self, field: &FieldDescriptor) -> Option<GenericRef> {
        let FieldKind::Generic { type_field, id_field } = &field.kind else {
            return None;
        };
        let discriminator = self.values.get(type_field)?.as_str()?;
        let discriminator = TypeName::parse(discriminator).ok()?;
        let target = self.values.get(id_field).and_then(EntityId::from_value)?;
        Some(GenericRef { discriminator, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tn(s: &str) -> TypeName {
        TypeName::parse(s).unwrap()
    }

    #[test]
    fn type_name_parse_is_case_insensitive() {
        let t = tn("SimpleApp.Article");
        assert_eq!(t.group(), "simpleapp");
        assert_eq!(t.model(), "article");
        assert_eq!(t.to_string(), "simpleapp.article");
        assert!(TypeName::parse("article").is_err());
        assert!(TypeName::parse(".article").is_err());
    }

    #[test]
    fn keys_order_by_type_then_id() {
        let mut keys = vec![
            EntityKey::new(tn("simpleapp.category"), 1),
            EntityKey::new(tn("simpleapp.author"), 2),
            EntityKey::new(tn("simpleapp.author"), 1),
            EntityKey::new(tn("simpleapp.authorprofile"), 1),
        ];
        keys.sort();
        let shown: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            shown,
            vec![
                "simpleapp.author.1",
                "simpleapp.author.2",
                "simpleapp.authorprofile.1",
                "simpleapp.category.1"
            ]
        );
    }

    #[test]
    fn reference_reads_name_or_storage_name() {
        let author = FieldDescriptor::reference("author", tn("simpleapp.author"));
        let a = Entity::new(tn("simpleapp.article"), 1).with("author", 3);
        let b = Entity::new(tn("simpleapp.article"), 2).with("author_id", 4);
        let c = Entity::new(tn("simpleapp.article"), 3).with("author", Value::Null);
        assert_eq!(a.reference(&author), Some(EntityKey::new(tn("simpleapp.author"), 3)));
        assert_eq!(b.reference(&author), Some(EntityKey::new(tn("simpleapp.author"), 4)));
        assert_eq!(c.reference(&author), None);
        assert_eq!(author.attname(), "author_id");
        assert_eq!(author.base_name(), "author");
    }

    #[test]
    fn generic_reads_discriminator_and_id() {
        let field = FieldDescriptor {
            name: "content_object".into(),
            kind: FieldKind::Generic {
                type_field: "content_type".into(),
                id_field: "object_id".into(),
            },
            serialize: true,
        };
        let item = Entity::new(tn("simpleapp.taggeditem"), 1)
            .with("content_type", "simpleapp.taggedarticle")
            .with("object_id", 7);
        let r = item.generic(&field).unwrap();
        assert_eq!(r.key(), EntityKey::new(tn("simpleapp.taggedarticle"), 7));

        let broken = Entity::new(tn("simpleapp.taggeditem"), 2).with("content_type", json!(5));
        assert!(broken.generic(&field).is_none());
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let e = Entity { type_name: tn("simpleapp.tag"), id: None, values: Map::new() };
        assert!(matches!(e.key(), Err(DumpError::MissingIdentifier { .. })));
    }

    #[test]
    fn field_descriptor_deserializes_tagged_kind() {
        let f: FieldDescriptor = serde_json::from_value(json!({
            "name": "author", "kind": "reference", "target": "simpleapp.author", "unique": true
        }))
        .unwrap();
        assert_eq!(
            f.kind,
            FieldKind::Reference { target: tn("simpleapp.author"), unique: true }
        );
        assert!(f.serialize);
    }
}
