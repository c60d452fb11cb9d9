//! In-memory entity store loaded from a JSON file.
//!
//! The file carries a schema and fixture-shaped records:
//!
//! ```json
//! {
//!   "types": [
//!     {"name": "simpleapp.author", "fields": [{"name": "name", "kind": "scalar"}]},
//!     {"name": "simpleapp.article", "fields": [
//!       {"name": "author", "kind": "reference", "target": "simpleapp.author"},
//!       {"name": "categories", "kind": "many", "target": "simpleapp.category"}
//!     ]}
//!   ],
//!   "records": [
//!     {"model": "simpleapp.author", "pk": 1, "fields": {"name": "Obi Wan"}}
//!   ]
//! }
//! ```
//!
//! Reverse accessors are derived from reference fields when the store is built:
//! `<model>_set` for a plain reference, `<model>` for a unique one.
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::errors::DumpError;
use crate::model::{
    Entity, EntityId, EntityKey, EntitySource, FieldKind, ReverseRelation, TypeMeta, TypeMetadata,
    TypeName,
};

#[derive(Debug, Clone, Deserialize)]
pub struct StoredRecord {
    pub model: TypeName,
    #[serde(default)]
    pub pk: Option<EntityId>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoreFile {
    types: Vec<TypeMeta>,
    #[serde(default)]
    records: Vec<StoredRecord>,
}

type BackRefs = HashMap<(TypeName, String), HashMap<EntityKey, Vec<Arc<Entity>>>>;

#[derive(Debug, Default)]
pub struct Store {
    types: BTreeMap<TypeName, TypeMeta>,
    groups: BTreeSet<String>,
    entities: BTreeMap<TypeName, Vec<Arc<Entity>>>,
    by_key: HashMap<EntityKey, Arc<Entity>>,
    back_refs: BackRefs,
}

impl Store {
    /// Build a store from a schema and records.
    ///
    /// # Errors
    /// Returns `DumpError::Configuration` when a field or proxy names a type
    /// missing from the schema, and `DumpError::UnknownType` for a record of
    /// an unknown type.
    pub fn new(types: Vec<TypeMeta>, records: Vec<StoredRecord>) -> Result<Self, DumpError> {
        let mut store = Store::default();
        for meta in types {
            store.groups.insert(meta.name.group().to_string());
            store.types.insert(meta.name.clone(), meta);
        }
        store.check_schema()?;
        store.resolve_proxy_targets();
        store.derive_reverse_relations();

        for rec in records {
            if !store.types.contains_key(&rec.model) {
                return Err(DumpError::UnknownType(rec.model.to_string()));
            }
            let entity = Arc::new(Entity { type_name: rec.model, id: rec.pk, values: rec.fields });
            store.insert(entity);
        }
        for list in store.entities.values_mut() {
            // entities without an id sort last
            list.sort_by(|a, b| match (&a.id, &b.id) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        Ok(store)
    }

    /// Parse a store from its JSON text.
    ///
    /// # Errors
    /// Returns `DumpError::Configuration` if the JSON is malformed, otherwise
    /// whatever [`Store::new`] returns.
    pub fn from_json(data: &str) -> Result<Self, DumpError> {
        let file: StoreFile = serde_json::from_str(data)
            .map_err(|e| DumpError::Configuration(format!("invalid store: {e}")))?;
        Self::new(file.types, file.records)
    }

    /// Load a store from a JSON file.
    ///
    /// # Errors
    /// Returns `DumpError::Store` if reading or parsing the file fails.
    pub fn load(path: &Path) -> Result<Self, DumpError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DumpError::Store { path: path.to_path_buf(), message: e.to_string() })?;
        Self::from_json(&data)
            .map_err(|e| DumpError::Store { path: path.to_path_buf(), message: e.to_string() })
    }

    pub fn type_names(&self) -> impl Iterator<Item = &TypeName> {
        self.types.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_schema(&self) -> Result<(), DumpError> {
        for meta in self.types.values() {
            if let Some(p) = &meta.proxy_for {
                if !self.types.contains_key(p) {
                    return Err(DumpError::Configuration(format!(
                        "{} is a proxy for unknown type {p}",
                        meta.name
                    )));
                }
            }
            for f in &meta.fields {
                let target = match &f.kind {
                    FieldKind::Reference { target, .. } | FieldKind::Many { target } => target,
                    FieldKind::Generic { type_field, id_field } => {
                        for backing in [type_field, id_field] {
                            if meta.field(backing).is_none() {
                                return Err(DumpError::Configuration(format!(
                                    "{}.{} is backed by missing field {backing}",
                                    meta.name, f.name
                                )));
                            }
                        }
                        continue;
                    }
                    FieldKind::Scalar => continue,
                };
                if !self.types.contains_key(target) {
                    return Err(DumpError::Configuration(format!(
                        "{}.{} points at unknown type {target}",
                        meta.name, f.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Point reference and many fields at the type that stores their targets.
    fn resolve_proxy_targets(&mut self) {
        let concrete: HashMap<TypeName, TypeName> = self
            .types
            .keys()
            .map(|t| (t.clone(), self.concrete_type(t)))
            .filter(|(t, c)| t != c)
            .collect();
        if concrete.is_empty() {
            return;
        }
        for meta in self.types.values_mut() {
            for f in &mut meta.fields {
                if let FieldKind::Reference { target, .. } | FieldKind::Many { target } = &mut f.kind {
                    if let Some(c) = concrete.get(target) {
                        *target = c.clone();
                    }
                }
            }
        }
    }

    fn derive_reverse_relations(&mut self) {
        let mut derived: Vec<(TypeName, ReverseRelation)> = Vec::new();
        for meta in self.types.values() {
            for f in meta.reference_fields() {
                let FieldKind::Reference { target, unique } = &f.kind else { continue };
                let accessor = if *unique {
                    meta.name.model().to_string()
                } else {
                    format!("{}_set", meta.name.model())
                };
                derived.push((
                    self.concrete_type(target),
                    ReverseRelation {
                        accessor,
                        source_type: meta.name.clone(),
                        field: f.name.clone(),
                        unique: *unique,
                    },
                ));
            }
        }
        for (target, rel) in derived {
            if let Some(meta) = self.types.get_mut(&target) {
                if meta.reverse_relation(&rel.accessor).is_none() {
                    meta.reverse.push(rel);
                }
            }
        }
    }

    fn insert(&mut self, entity: Arc<Entity>) {
        if let Some(meta) = self.types.get(&entity.type_name) {
            for f in &meta.fields {
                let target = match f.kind {
                    FieldKind::Reference { .. } => entity.reference(f),
                    FieldKind::Generic { .. } => entity
                        .generic(f)
                        .map(|g| EntityKey::new(self.concrete_type(&g.discriminator), g.target)),
                    _ => None,
                };
                if let Some(target) = target {
                    self.back_refs
                        .entry((entity.type_name.clone(), f.name.clone()))
                        .or_default()
                        .entry(target)
                        .or_default()
                        .push(entity.clone());
                }
            }
        }
        if let Ok(key) = entity.key() {
            self.by_key.insert(key, entity.clone());
        }
        self.entities.entry(entity.type_name.clone()).or_default().push(entity);
    }
}

impl TypeMetadata for Store {
    fn type_meta(&self, name: &TypeName) -> Option<&TypeMeta> {
        self.types.get(name)
    }

    fn has_group(&self, group: &str) -> bool {
        self.groups.contains(&group.to_ascii_lowercase())
    }
}

impl EntitySource for Store {
    fn roots(&self, type_name: &TypeName, ids: Option<&[EntityId]>) -> Vec<Arc<Entity>> {
        let Some(list) = self.entities.get(type_name) else {
            return Vec::new();
        };
        match ids {
            None => list.clone(),
            Some(ids) => {
                list.iter().filter(|e| e.id.as_ref().is_some_and(|id| ids.contains(id))).cloned().collect()
            }
        }
    }

    fn get(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.by_key.get(key).cloned()
    }

    fn referencing(
        &self,
        source_type: &TypeName,
        field: &str,
        target: &EntityKey,
    ) -> Vec<Arc<Entity>> {
        self.back_refs
            .get(&(source_type.clone(), field.to_string()))
            .and_then(|by_target| by_target.get(target))
            .map(|v| {
                let mut v = v.clone();
                v.sort_by(|a, b| a.id.cmp(&b.id));
                v
            })
            .unwrap_or_default()
    }
}
