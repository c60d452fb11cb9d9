//! Flattening entities into output records and encoding them.
//!
//! Field selection is computed once per type by [`FieldSelector`]; the
//! [`ObjectSerializer`] walks the sorted entities and produces one [`Record`]
//! each; an [`Encoder`] turns the records into bytes.
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use crate::errors::DumpError;
use crate::model::{Entity, EntityId, FieldKind, TypeMetadata, TypeName};
use crate::registry::FieldRules;
use crate::utils::table;

/// The fields of one type that make it into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No rules apply; every field is written.
    All,
    Fields(BTreeSet<String>),
}

impl Selection {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Fields(names) => names.contains(name),
        }
    }
}

/// Per-type field selection, memoized.
pub struct FieldSelector<'a> {
    meta: &'a dyn TypeMetadata,
    rules: FieldRules,
    generic_fields: bool,
    cache: HashMap<TypeName, Selection>,
}

impl<'a> FieldSelector<'a> {
    #[must_use]
    pub fn new(meta: &'a dyn TypeMetadata, rules: FieldRules, generic_fields: bool) -> Self {
        Self { meta, rules, generic_fields, cache: HashMap::new() }
    }

    pub fn selected_fields(&mut self, type_name: &TypeName) -> &Selection {
        if !self.cache.contains_key(type_name) {
            let selection = self.compute(type_name);
            self.cache.insert(type_name.clone(), selection);
        }
        &self.cache[type_name]
    }

    fn compute(&self, type_name: &TypeName) -> Selection {
        let include = self.rules.include.get(type_name);
        let exclude = self.rules.exclude.get(type_name);
        if include.is_none() && exclude.is_none() && !self.generic_fields {
            return Selection::All;
        }
        let meta = self.meta.type_meta(&self.meta.concrete_type(type_name));

        let mut selected: BTreeSet<String> = match include {
            Some(names) => names.iter().cloned().collect(),
            None => meta
                .map(|m| m.fields.iter().filter(|f| f.is_local()).map(|f| f.base_name()).collect())
                .unwrap_or_default(),
        };
        if self.generic_fields {
            for f in meta.into_iter().flat_map(|m| m.generic_fields()) {
                if let FieldKind::Generic { type_field, id_field } = &f.kind {
                    selected.remove(type_field);
                    selected.remove(id_field);
                }
                selected.insert(f.name.clone());
            }
        }
        if let Some(names) = exclude {
            for name in names {
                selected.remove(name);
            }
            assert!(names.iter().all(|n| !selected.contains(n)), "excluded field selected for {type_name}");
        }
        Selection::Fields(selected)
    }
}

/// One serialized entity, shaped like a fixture entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub pk: EntityId,
    pub model: TypeName,
    pub fields: Map<String, Value>,
}

pub struct ObjectSerializer<'a> {
    meta: &'a dyn TypeMetadata,
    selector: FieldSelector<'a>,
    generic_fields: bool,
}

impl<'a> ObjectSerializer<'a> {
    /// `generic_fields` writes polymorphic references as `[type, id]` in
    /// place of their two backing fields.
    #[must_use]
    pub fn new(meta: &'a dyn TypeMetadata, rules: FieldRules, generic_fields: bool) -> Self {
        Self { meta, selector: FieldSelector::new(meta, rules, generic_fields), generic_fields }
    }

    pub fn serialize<'e, I>(&mut self, entities: I) -> Vec<Record>
    where
        I: IntoIterator<Item = &'e Entity>,
    {
        entities.into_iter().filter_map(|e| self.record(e)).collect()
    }

    /// Flatten one entity. Entities without an id are skipped.
    pub fn record(&mut self, entity: &Entity) -> Option<Record> {
        let Some(pk) = entity.id.clone() else {
            debug!("{} without identifier skipped", entity.type_name);
            return None;
        };
        let meta = self.meta;
        let selection = self.selector.selected_fields(&entity.type_name);
        let mut fields = Map::new();
        let Some(type_meta) = meta.type_meta(&meta.concrete_type(&entity.type_name)) else {
            return Some(Record { pk, model: entity.type_name.clone(), fields });
        };

        let written = type_meta.fields.iter().filter(|f| f.serialize);
        let (mut scalars, mut references, mut many) = (Vec::new(), Vec::new(), Vec::new());
        for f in written.clone() {
            match f.kind {
                FieldKind::Scalar => scalars.push(f),
                FieldKind::Reference { .. } => references.push(f),
                FieldKind::Many { .. } => many.push(f),
                FieldKind::Generic { .. } => {}
            }
        }
        for f in scalars {
            if selection.contains(&f.name) {
                fields.insert(f.name.clone(), entity.value(f).cloned().unwrap_or(Value::Null));
            }
        }
        for f in references {
            if selection.contains(&f.base_name()) {
                fields.insert(f.name.clone(), entity.value(f).cloned().unwrap_or(Value::Null));
            }
        }
        for f in many {
            if selection.contains(&f.name) {
                let ids: Vec<Value> = entity.many(f).iter().map(|k| k.id.to_value()).collect();
                fields.insert(f.name.clone(), Value::Array(ids));
            }
        }
        if self.generic_fields {
            for f in written.filter(|f| matches!(f.kind, FieldKind::Generic { .. })) {
                if selection.contains(&f.name) {
                    let value = entity.generic(f).map_or(Value::Null, |g| {
                        Value::Array(vec![Value::from(g.discriminator.to_string()), g.target.to_value()])
                    });
                    fields.insert(f.name.clone(), value);
                }
            }
        }
        Some(Record { pk, model: entity.type_name.clone(), fields })
    }
}

/// Turns records into output bytes. Implementations must not write partial
/// output when encoding fails.
pub trait Encoder {
    /// # Errors
    /// Returns `DumpError::Encoding` if the records cannot be encoded and
    /// `DumpError::Io` if writing fails.
    fn encode(&self, records: &[Record], out: &mut dyn Write) -> Result<(), DumpError>;
}

/// JSON array of fixture entries; `indent` switches to pretty printing.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    pub indent: Option<usize>,
}

impl Encoder for JsonEncoder {
    fn encode(&self, records: &[Record], out: &mut dyn Write) -> Result<(), DumpError> {
        let mut buf = Vec::new();
        let result = match self.indent {
            None => serde_json::to_writer(&mut buf, records),
            Some(n) => {
                let indent = vec![b' '; n];
                let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                records.serialize(&mut ser)
            }
        };
        result.map_err(|e| DumpError::Encoding(e.to_string()))?;
        buf.push(b'\n');
        out.write_all(&buf)?;
        Ok(())
    }
}

/// Human-readable table, one row per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
    fn encode(&self, records: &[Record], out: &mut dyn Write) -> Result<(), DumpError> {
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|r| {
                let fields: Vec<String> = r.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                vec![r.model.to_string(), r.pk.to_string(), fields.join(", ")]
            })
            .collect();
        let text = table::render(&["Model", "PK", "Fields"], &rows);
        writeln!(out, "{text}")?;
        Ok(())
    }
}
