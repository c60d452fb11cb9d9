//! Per-type traversal and serialization settings.
//!
//! A [`TypeConfigRegistry`] is built once before a run (usually from the
//! `[types]` table of the TOML config) and only read afterwards.
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::errors::{DumpError, RelationError};
use crate::model::{Entity, EntitySource, FieldKind, TypeMetadata, TypeName};
use crate::utils::config::TypeSettings;

/// Which relations of one category to follow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Toggle {
    #[default]
    All,
    None,
    Only(Vec<String>),
}

impl Toggle {
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        match self {
            Toggle::All => true,
            Toggle::None => false,
            Toggle::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Names(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Toggle::All,
            Raw::Flag(false) => Toggle::None,
            Raw::Names(names) => Toggle::Only(names),
        })
    }
}

/// Ordering constraint implied by an additional relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dependency {
    /// Expansion only.
    #[default]
    None,
    /// The entity requires the related entity to exist first.
    Requires,
    /// The related entity requires the entity to exist first.
    RequiredBy,
}

/// Produces extra related entities for an entity.
///
/// Resolvers run synchronously during traversal and must not depend on
/// traversal state.
pub trait Resolver: Send + Sync {
    /// # Errors
    /// Returns a `RelationError` when the relation cannot be evaluated for this entity;
    /// the traversal treats that as "no related entities".
    fn resolve(
        &self,
        entity: &Entity,
        source: &dyn EntitySource,
    ) -> Result<Vec<Arc<Entity>>, RelationError>;
}

impl<F> Resolver for F
where
    F: Fn(&Entity, &dyn EntitySource) -> Vec<Arc<Entity>> + Send + Sync,
{
    fn resolve(
        &self,
        entity: &Entity,
        source: &dyn EntitySource,
    ) -> Result<Vec<Arc<Entity>>, RelationError> {
        Ok(self(entity, source))
    }
}

/// Entities of `target_type` whose field `field` points at the entity being expanded.
#[derive(Debug, Clone)]
pub struct LookupResolver {
    pub target_type: TypeName,
    pub field: String,
}

impl Resolver for LookupResolver {
    fn resolve(
        &self,
        entity: &Entity,
        source: &dyn EntitySource,
    ) -> Result<Vec<Arc<Entity>>, RelationError> {
        let Ok(key) = entity.key() else {
            return Ok(Vec::new());
        };
        Ok(source.referencing(&self.target_type, &self.field, &key))
    }
}

#[derive(Clone)]
pub struct AdditionalRelation {
    pub name: String,
    pub dependency: Dependency,
    pub resolver: Arc<dyn Resolver>,
}

impl AdditionalRelation {
    pub fn new(name: &str, dependency: Dependency, resolver: impl Resolver + 'static) -> Self {
        Self { name: name.to_string(), dependency, resolver: Arc::new(resolver) }
    }
}

impl fmt::Debug for AdditionalRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdditionalRelation")
            .field("name", &self.name)
            .field("dependency", &self.dependency)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeConfig {
    pub forward: Toggle,
    pub reverse: Toggle,
    pub many: Toggle,
    pub generic: Toggle,
    pub additional: Vec<AdditionalRelation>,
    /// Serialization include list; `None` means every local field.
    pub fields: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Never dump entities of this type.
    pub ignore: bool,
}

/// Include/exclude field lists keyed by type, as consumed by the field selector.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub include: HashMap<TypeName, Vec<String>>,
    pub exclude: HashMap<TypeName, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TypeConfigRegistry {
    configs: HashMap<TypeName, TypeConfig>,
    fallback: TypeConfig,
}

impl TypeConfigRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: TypeName, config: TypeConfig) {
        self.configs.insert(type_name, config);
    }

    /// Settings for `type_name`; types without an entry follow every relation.
    #[must_use]
    pub fn get(&self, type_name: &TypeName) -> &TypeConfig {
        self.configs.get(type_name).unwrap_or(&self.fallback)
    }

    /// Types flagged `ignore`, as qualified names suitable for an exclude list.
    #[must_use]
    pub fn ignored_types(&self) -> Vec<String> {
        let mut out: Vec<String> =
            self.configs.iter().filter(|(_, c)| c.ignore).map(|(t, _)| t.to_string()).collect();
        out.sort();
        out
    }

    #[must_use]
    pub fn field_rules(&self) -> FieldRules {
        let mut rules = FieldRules::default();
        for (t, c) in &self.configs {
            if let Some(fields) = &c.fields {
                rules.include.insert(t.clone(), fields.clone());
            }
            if let Some(exclude) = &c.exclude {
                rules.exclude.insert(t.clone(), exclude.clone());
            }
        }
        rules
    }

    /// Build a registry from the `[types]` config table.
    ///
    /// # Errors
    /// Returns `DumpError::UnknownType` for a type missing from `meta`, and
    /// `DumpError::Configuration` for a lookup relation on a field that is not a
    /// reference of the looked-up type.
    pub fn from_settings(
        settings: &BTreeMap<String, TypeSettings>,
        meta: &dyn TypeMetadata,
    ) -> Result<Self, DumpError> {
        let mut registry = Self::new();
        for (name, s) in settings {
            let type_name = TypeName::parse(name)?;
            if meta.type_meta(&type_name).is_none() {
                return Err(DumpError::UnknownType(name.clone()));
            }
            let mut additional = Vec::with_capacity(s.additional.len());
            for (i, a) in s.additional.iter().enumerate() {
                let target_type = TypeName::parse(&a.r#type)?;
                let Some(target_meta) = meta.type_meta(&target_type) else {
                    return Err(DumpError::UnknownType(a.r#type.clone()));
                };
                let points_back = target_meta.field(&a.field).is_some_and(|f| {
                    matches!(f.kind, FieldKind::Reference { .. } | FieldKind::Generic { .. })
                });
                if !points_back {
                    return Err(DumpError::Configuration(format!(
                        "additional relation on {name}: {target_type}.{} is not a reference",
                        a.field
                    )));
                }
                let rel_name = a.name.clone().unwrap_or_else(|| format!("additional_{i}"));
                additional.push(AdditionalRelation::new(
                    &rel_name,
                    a.dependency,
                    LookupResolver { target_type, field: a.field.clone() },
                ));
            }
            registry.insert(
                type_name,
                TypeConfig {
                    forward: s.forward.clone(),
                    reverse: s.reverse.clone(),
                    many: s.many.clone(),
                    generic: s.generic.clone(),
                    additional,
                    fields: s.fields.clone(),
                    exclude: s.exclude.clone(),
                    ignore: s.ignore,
                },
            );
        }
        Ok(registry)
    }
}
