use std::collections::BTreeSet;

use crate::errors::DumpError;
use crate::model::{Entity, TypeMetadata, TypeName};

/// Decides which entities are left out of a dump.
///
/// Filter lists hold group names (`simpleapp`) and qualified type names
/// (`simpleapp.article`). Exclusion always wins; when anything is included,
/// entities that are neither included nor of the primary type are skipped.
#[derive(Debug, Clone)]
pub struct ObjectFilter {
    primary: BTreeSet<TypeName>,
    excluded_types: BTreeSet<TypeName>,
    excluded_groups: BTreeSet<String>,
    included_types: BTreeSet<TypeName>,
    included_groups: BTreeSet<String>,
}

impl ObjectFilter {
    /// # Errors
    /// Returns `DumpError::UnknownType` / `DumpError::UnknownGroup` for any name
    /// (including the primary type) that `meta` does not know.
    pub fn new(
        primary: &TypeName,
        exclude: &[String],
        include: &[String],
        meta: &dyn TypeMetadata,
    ) -> Result<Self, DumpError> {
        if meta.type_meta(primary).is_none() {
            return Err(DumpError::UnknownType(primary.to_string()));
        }
        let (excluded_groups, excluded_types) = split_names(exclude, meta)?;
        let (included_groups, included_types) = split_names(include, meta)?;
        let primary = [primary.clone(), meta.concrete_type(primary)].into_iter().collect();
        Ok(Self { primary, excluded_types, excluded_groups, included_types, included_groups })
    }

    /// A filter that keeps everything.
    #[must_use]
    pub fn allow_all(primary: &TypeName) -> Self {
        Self {
            primary: [primary.clone()].into_iter().collect(),
            excluded_types: BTreeSet::new(),
            excluded_groups: BTreeSet::new(),
            included_types: BTreeSet::new(),
            included_groups: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn skip(&self, entity: &Entity) -> bool {
        let t = &entity.type_name;
        if self.excluded_types.contains(t) || self.excluded_groups.contains(t.group()) {
            return true;
        }
        let including = !self.included_types.is_empty() || !self.included_groups.is_empty();
        if including && !self.primary.contains(t) {
            return !(self.included_types.contains(t) || self.included_groups.contains(t.group()));
        }
        false
    }
}

fn split_names(
    names: &[String],
    meta: &dyn TypeMetadata,
) -> Result<(BTreeSet<String>, BTreeSet<TypeName>), DumpError> {
    let mut groups = BTreeSet::new();
    let mut types = BTreeSet::new();
    for item in names {
        if item.contains('.') {
            let t = TypeName::parse(item)?;
            if meta.type_meta(&t).is_none() {
                return Err(DumpError::UnknownType(item.clone()));
            }
            types.insert(t);
        } else {
            let g = item.to_ascii_lowercase();
            if !meta.has_group(&g) {
                return Err(DumpError::UnknownGroup(item.clone()));
            }
            groups.insert(g);
        }
    }
    Ok((groups, types))
}
