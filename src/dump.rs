//! The `run` entry point: filter, traverse, sort.
use log::{debug, info};
use std::sync::Arc;

use crate::errors::DumpError;
use crate::filter::ObjectFilter;
use crate::graph::{edges_of, toposort, DependencyMap, GraphBuilder, RelationEdge, RelationMap, TraversalOptions};
use crate::model::{Entity, EntityId, EntitySource, TypeMetadata, TypeName};
use crate::registry::TypeConfigRegistry;
use crate::store::Store;

/// What to dump.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub root_type: TypeName,
    /// `None` dumps every entity of the root type.
    pub ids: Option<Vec<EntityId>>,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub max_depth: Option<usize>,
    pub limit: Option<usize>,
}

impl DumpRequest {
    #[must_use]
    pub fn new(root_type: TypeName) -> Self {
        Self { root_type, ids: None, exclude: Vec::new(), include: Vec::new(), max_depth: None, limit: None }
    }
}

#[derive(Debug)]
pub struct DumpResult {
    /// Emitted entities, dependencies first.
    pub sorted: Vec<Arc<Entity>>,
    pub depends_on: DependencyMap,
    pub relations: RelationMap,
}

impl DumpResult {
    #[must_use]
    pub fn edges(&self) -> Vec<RelationEdge> {
        edges_of(&self.relations)
    }
}

pub struct ObjectDump<'a> {
    meta: &'a dyn TypeMetadata,
    source: &'a dyn EntitySource,
    configs: &'a TypeConfigRegistry,
}

impl<'a> ObjectDump<'a> {
    /// Dump from a loaded store.
    #[must_use]
    pub fn new(store: &'a Store, configs: &'a TypeConfigRegistry) -> Self {
        Self::with_parts(store, store, configs)
    }

    #[must_use]
    pub fn with_parts(
        meta: &'a dyn TypeMetadata,
        source: &'a dyn EntitySource,
        configs: &'a TypeConfigRegistry,
    ) -> Self {
        Self { meta, source, configs }
    }

    /// # Errors
    /// Configuration errors (unknown root type, unknown filter names) are
    /// reported before anything is visited. A dependency cycle among the
    /// emitted entities fails the run with `DumpError::Cycle`.
    pub fn run(&self, request: &DumpRequest) -> Result<DumpResult, DumpError> {
        if self.meta.type_meta(&request.root_type).is_none() {
            return Err(DumpError::UnknownType(request.root_type.to_string()));
        }
        let mut exclude = request.exclude.clone();
        exclude.extend(self.configs.ignored_types());
        let filter = ObjectFilter::new(&request.root_type, &exclude, &request.include, self.meta)?;

        let roots = self.source.roots(&request.root_type, request.ids.as_deref());
        info!("{} root object(s) of {}", roots.len(), request.root_type);

        let options = TraversalOptions { max_depth: request.max_depth, limit: request.limit };
        let state = GraphBuilder::new(self.meta, self.source, self.configs, &filter, options).traverse(roots);
        info!("{} object(s) collected", state.to_emit().len());

        let order = toposort::sort(&state.emitted_dependencies())?;
        let mut sorted = Vec::with_capacity(order.len());
        for key in &order {
            match state.entity(key) {
                Some(e) => sorted.push(e.clone()),
                None => debug!("{key} ordered but never emitted"),
            }
        }
        Ok(DumpResult {
            sorted,
            depends_on: state.depends_on().clone(),
            relations: state.relations().clone(),
        })
    }
}
