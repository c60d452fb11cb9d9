use log::debug;
use std::sync::Arc;

use crate::errors::RelationError;
use crate::filter::ObjectFilter;
use crate::model::{Entity, EntityKey, EntitySource, FieldDescriptor, FieldKind, TypeMeta, TypeMetadata};
use crate::registry::{Dependency, Toggle, TypeConfigRegistry};

/// A neighbour found by expanding one relation of an entity.
#[derive(Debug, Clone)]
pub struct Related {
    pub key: EntityKey,
    pub entity: Arc<Entity>,
    pub relation: String,
}

/// Enumerates the outbound relations of an entity, one category at a time.
///
/// Every method degrades to "nothing related" on schema mismatches and
/// dangling references; those are logged at debug level.
pub struct RelationExpander<'a> {
    meta: &'a dyn TypeMetadata,
    source: &'a dyn EntitySource,
    configs: &'a TypeConfigRegistry,
    filter: &'a ObjectFilter,
}

impl<'a> RelationExpander<'a> {
    #[must_use]
    pub fn new(
        meta: &'a dyn TypeMetadata,
        source: &'a dyn EntitySource,
        configs: &'a TypeConfigRegistry,
        filter: &'a ObjectFilter,
    ) -> Self {
        Self { meta, source, configs, filter }
    }

    /// Replace an entity of a proxy type by the entity it stands for.
    #[must_use]
    pub fn canonical(&self, entity: Arc<Entity>) -> Arc<Entity> {
        let concrete = self.meta.concrete_type(&entity.type_name);
        if concrete == entity.type_name {
            return entity;
        }
        if let Some(id) = &entity.id {
            if let Some(found) = self.source.get(&EntityKey::new(concrete.clone(), id.clone())) {
                return found;
            }
        }
        let mut aliased = (*entity).clone();
        aliased.type_name = concrete;
        Arc::new(aliased)
    }

    /// Single-valued reference fields holding a related entity.
    #[must_use]
    pub fn forward(&self, entity: &Entity) -> Vec<Related> {
        let Some(meta) = self.type_meta(entity) else { return Vec::new() };
        let toggle = &self.configs.get(&entity.type_name).forward;
        let mut out = Vec::new();
        for field in enabled_fields(meta, toggle, |k| matches!(k, FieldKind::Reference { .. })) {
            let f = match field {
                Ok(f) => f,
                Err(e) => {
                    debug!("{}: {e}", entity.type_name);
                    continue;
                }
            };
            let Some(key) = entity.reference(f) else { continue };
            match self.fetch(&key) {
                Ok(e) => out.extend(self.related(e, &f.name)),
                Err(e) => debug!("{}.{}: {e}", entity.type_name, f.name),
            }
        }
        out
    }

    /// Entities pointing at `entity` through a reverse accessor, at most `limit` per accessor.
    #[must_use]
    pub fn reverse(&self, entity: &Entity, limit: Option<usize>) -> Vec<Related> {
        let Some(meta) = self.type_meta(entity) else { return Vec::new() };
        let Ok(key) = entity.key() else { return Vec::new() };
        let accessors: Vec<Result<_, RelationError>> = match &self.configs.get(&entity.type_name).reverse {
            Toggle::None => Vec::new(),
            Toggle::All => meta.reverse.iter().map(Ok).collect(),
            Toggle::Only(names) => names
                .iter()
                .map(|n| {
                    meta.reverse_relation(n).ok_or_else(|| RelationError::Unresolvable {
                        type_name: meta.name.clone(),
                        relation: n.clone(),
                    })
                })
                .collect(),
        };
        let mut out = Vec::new();
        for accessor in accessors {
            let rel = match accessor {
                Ok(rel) => rel,
                Err(e) => {
                    debug!("{}: {e}", entity.type_name);
                    continue;
                }
            };
            let found = self.source.referencing(&rel.source_type, &rel.field, &key);
            for e in found.into_iter().take(cap(limit)) {
                if let Some(r) = self.related(e, &rel.accessor) {
                    out.push(r);
                }
            }
        }
        out
    }

    /// Members of many-valued link fields, at most `limit` per field.
    #[must_use]
    pub fn many(&self, entity: &Entity, limit: Option<usize>) -> Vec<Related> {
        let Some(meta) = self.type_meta(entity) else { return Vec::new() };
        let toggle = &self.configs.get(&entity.type_name).many;
        let mut out = Vec::new();
        for field in enabled_fields(meta, toggle, |k| matches!(k, FieldKind::Many { .. })) {
            let f = match field {
                Ok(f) => f,
                Err(e) => {
                    debug!("{}: {e}", entity.type_name);
                    continue;
                }
            };
            for key in entity.many(f).into_iter().take(cap(limit)) {
                match self.fetch(&key) {
                    Ok(e) => out.extend(self.related(e, &f.name)),
                    Err(e) => debug!("{}.{}: {e}", entity.type_name, f.name),
                }
            }
        }
        out
    }

    /// Targets of polymorphic references that pass the object filter.
    #[must_use]
    pub fn generic(&self, entity: &Entity) -> Vec<Related> {
        let Some(meta) = self.type_meta(entity) else { return Vec::new() };
        let toggle = &self.configs.get(&entity.type_name).generic;
        let mut out = Vec::new();
        for field in enabled_fields(meta, toggle, |k| matches!(k, FieldKind::Generic { .. })) {
            let f = match field {
                Ok(f) => f,
                Err(e) => {
                    debug!("{}: {e}", entity.type_name);
                    continue;
                }
            };
            let Some(target) = entity.generic(f) else { continue };
            let key = EntityKey::new(self.meta.concrete_type(&target.discriminator), target.target);
            match self.fetch(&key) {
                Ok(e) if self.filter.skip(&e) => debug!("{}.{}: {key} filtered out", entity.type_name, f.name),
                Ok(e) => {
                    if let Some(r) = self.related(e, &f.name) {
                        out.push(r);
                    }
                }
                Err(e) => debug!("{}.{}: {e}", entity.type_name, f.name),
            }
        }
        out
    }

    /// Output of the resolvers registered for the entity's type, with each resolver's dependency flag.
    #[must_use]
    pub fn additional(&self, entity: &Entity) -> Vec<(Related, Dependency)> {
        let mut out = Vec::new();
        for rel in &self.configs.get(&entity.type_name).additional {
            match rel.resolver.resolve(entity, self.source) {
                Ok(found) => {
                    for e in found {
                        if let Some(r) = self.related(e, &rel.name) {
                            out.push((r, rel.dependency));
                        }
                    }
                }
                Err(e) => debug!("{}.{}: {e}", entity.type_name, rel.name),
            }
        }
        out
    }

    fn type_meta(&self, entity: &Entity) -> Option<&'a TypeMeta> {
        let meta = self.meta.type_meta(&entity.type_name);
        if meta.is_none() {
            debug!("{}: no metadata, relations skipped", entity.type_name);
        }
        meta
    }

    fn fetch(&self, key: &EntityKey) -> Result<Arc<Entity>, RelationError> {
        self.source.get(key).ok_or_else(|| RelationError::MissingTarget { key: key.clone() })
    }

    fn related(&self, entity: Arc<Entity>, relation: &str) -> Option<Related> {
        let entity = self.canonical(entity);
        match entity.key() {
            Ok(key) => Some(Related { key, entity, relation: relation.to_string() }),
            Err(e) => {
                debug!("{relation}: {e}");
                None
            }
        }
    }
}

/// Per-relation cap; a limit of 0 counts as no limit.
fn cap(limit: Option<usize>) -> usize {
    match limit {
        Some(n) if n > 0 => n,
        _ => usize::MAX,
    }
}

/// Fields of one kind selected by `toggle`; names in an allow-list that do not
/// exist (or are of another kind) come back as `Unresolvable`.
fn enabled_fields<'m>(
    meta: &'m TypeMeta,
    toggle: &Toggle,
    kind: impl Fn(&FieldKind) -> bool,
) -> Vec<Result<&'m FieldDescriptor, RelationError>> {
    match toggle {
        Toggle::None => Vec::new(),
        Toggle::All => meta.fields.iter().filter(|f| kind(&f.kind)).map(Ok).collect(),
        Toggle::Only(names) => names
            .iter()
            .map(|n| {
                meta.field(n).filter(|f| kind(&f.kind)).ok_or_else(|| {
                    RelationError::Unresolvable { type_name: meta.name.clone(), relation: n.clone() }
                })
            })
            .collect(),
    }
}
