//! Breadth-first closure over the object graph.
//!
//! [`GraphBuilder::traverse`] walks outward from a set of root entities and
//! accumulates a [`TraversalState`]: the entities to emit (in discovery order),
//! what each emitted entity depends on, and which relation produced each edge.
//! The state is built fresh for every run and handed to the sorter and the
//! serializer afterwards.
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::filter::ObjectFilter;
use crate::model::{Entity, EntityKey, EntitySource, TypeMetadata};
use crate::registry::{Dependency, TypeConfigRegistry};

pub mod expander;
pub mod toposort;

pub use expander::{Related, RelationExpander};

/// Entity key mapped to the keys it must follow in the output.
pub type DependencyMap = BTreeMap<EntityKey, BTreeSet<EntityKey>>;

/// Entity key mapped to relation name mapped to the keys found through it.
pub type RelationMap = BTreeMap<EntityKey, BTreeMap<String, BTreeSet<EntityKey>>>;

/// One labelled edge of the relation map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RelationEdge {
    pub source: EntityKey,
    pub target: EntityKey,
    pub label: String,
}

/// Working set of one traversal.
#[derive(Debug, Default)]
pub struct TraversalState {
    visited: HashSet<EntityKey>,
    depends_on: DependencyMap,
    relations: RelationMap,
    to_emit: Vec<Arc<Entity>>,
    emitted: HashMap<EntityKey, usize>,
}

impl TraversalState {
    #[must_use]
    pub fn is_visited(&self, key: &EntityKey) -> bool {
        self.visited.contains(key)
    }

    /// Emitted entities in discovery order.
    #[must_use]
    pub fn to_emit(&self) -> &[Arc<Entity>] {
        &self.to_emit
    }

    #[must_use]
    pub fn entity(&self, key: &EntityKey) -> Option<&Arc<Entity>> {
        self.emitted.get(key).map(|&i| &self.to_emit[i])
    }

    #[must_use]
    pub fn is_emitted(&self, key: &EntityKey) -> bool {
        self.emitted.contains_key(key)
    }

    /// Every recorded dependency, including edges towards filtered-out entities.
    #[must_use]
    pub fn depends_on(&self) -> &DependencyMap {
        &self.depends_on
    }

    #[must_use]
    pub fn relations(&self) -> &RelationMap {
        &self.relations
    }

    /// Dependencies restricted to emitted entities on both ends. Every emitted
    /// entity has an entry.
    #[must_use]
    pub fn emitted_dependencies(&self) -> DependencyMap {
        self.depends_on
            .iter()
            .filter(|(k, _)| self.is_emitted(k))
            .map(|(k, deps)| {
                (k.clone(), deps.iter().filter(|d| self.is_emitted(d)).cloned().collect())
            })
            .collect()
    }

    /// The relation map flattened to `(source, target, label)` triples, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<RelationEdge> {
        edges_of(&self.relations)
    }

    /// Mark `key` visited; returns false if it already was.
    fn visit(&mut self, key: &EntityKey) -> bool {
        self.visited.insert(key.clone())
    }

    fn emit(&mut self, key: EntityKey, entity: Arc<Entity>) {
        self.depends_on.entry(key.clone()).or_default();
        self.emitted.insert(key, self.to_emit.len());
        self.to_emit.push(entity);
    }

    fn record(&mut self, source: &EntityKey, related: &Related, dependency: Dependency) {
        debug!("{source}.{} -> {}", related.relation, related.key);
        self.relations
            .entry(source.clone())
            .or_default()
            .entry(related.relation.clone())
            .or_default()
            .insert(related.key.clone());
        match dependency {
            Dependency::None => {}
            Dependency::Requires => {
                self.depends_on.entry(source.clone()).or_default().insert(related.key.clone());
            }
            Dependency::RequiredBy => {
                self.depends_on.entry(related.key.clone()).or_default().insert(source.clone());
            }
        }
    }
}

/// Flatten a relation map to sorted labelled edges.
#[must_use]
pub fn edges_of(relations: &RelationMap) -> Vec<RelationEdge> {
    let mut out = Vec::new();
    for (source, by_name) in relations {
        for (label, targets) in by_name {
            for target in targets {
                out.push(RelationEdge {
                    source: source.clone(),
                    target: target.clone(),
                    label: label.clone(),
                });
            }
        }
    }
    out.sort();
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalOptions {
    /// Reverse and many-valued relations are followed only from entities
    /// discovered at a depth below this.
    pub max_depth: Option<usize>,
    /// Per-relation cap on reverse and many-valued results; 0 means no cap.
    pub limit: Option<usize>,
}

pub struct GraphBuilder<'a> {
    expander: RelationExpander<'a>,
    filter: &'a ObjectFilter,
    options: TraversalOptions,
}

impl<'a> GraphBuilder<'a> {
    #[must_use]
    pub fn new(
        meta: &'a dyn TypeMetadata,
        source: &'a dyn EntitySource,
        configs: &'a TypeConfigRegistry,
        filter: &'a ObjectFilter,
        options: TraversalOptions,
    ) -> Self {
        Self { expander: RelationExpander::new(meta, source, configs, filter), filter, options }
    }

    /// Visit everything reachable from `roots`.
    ///
    /// Forward, polymorphic and additional relations are always followed.
    /// Reverse and many-valued relations stop at `max_depth` and are capped by
    /// `limit`. Filtered entities are marked visited but neither emitted nor
    /// expanded.
    pub fn traverse<I>(&self, roots: I) -> TraversalState
    where
        I: IntoIterator<Item = Arc<Entity>>,
    {
        let mut state = TraversalState::default();
        let mut frontier: VecDeque<(Arc<Entity>, usize)> =
            roots.into_iter().map(|e| (e, 0)).collect();

        while let Some((entity, depth)) = frontier.pop_front() {
            let entity = self.expander.canonical(entity);
            let key = match entity.key() {
                Ok(key) => key,
                Err(e) => {
                    debug!("skipping entity: {e}");
                    continue;
                }
            };
            if !state.visit(&key) {
                continue;
            }
            if self.filter.skip(&entity) {
                debug!("{key} filtered out");
                continue;
            }
            state.emit(key.clone(), entity.clone());

            let next = depth + 1;
            let mut found: Vec<(Related, Dependency)> = Vec::new();
            if self.options.max_depth.map_or(true, |max| depth < max) {
                found.extend(
                    self.expander.reverse(&entity, self.options.limit).into_iter().map(|r| (r, Dependency::None)),
                );
                found.extend(
                    self.expander.many(&entity, self.options.limit).into_iter().map(|r| (r, Dependency::Requires)),
                );
            }
            found.extend(self.expander.additional(&entity));
            found.extend(self.expander.forward(&entity).into_iter().map(|r| (r, Dependency::Requires)));
            found.extend(self.expander.generic(&entity).into_iter().map(|r| (r, Dependency::Requires)));

            for (related, dependency) in found {
                state.record(&key, &related, dependency);
                if !state.is_visited(&related.key) {
                    frontier.push_back((related.entity, next));
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeName;
    use crate::registry::{AdditionalRelation, TypeConfig};
    use crate::store::Store;

    const STORE: &str = r#"{
      "types": [
        {"name": "blog.author", "fields": [{"name": "name", "kind": "scalar"}]},
        {"name": "blog.writer", "proxy_for": "blog.author"},
        {"name": "blog.category", "fields": [{"name": "name", "kind": "scalar"}]},
        {"name": "blog.article", "fields": [
          {"name": "title", "kind": "scalar"},
          {"name": "author", "kind": "reference", "target": "blog.author"},
          {"name": "categories", "kind": "many", "target": "blog.category"}
        ]},
        {"name": "blog.comment", "fields": [
          {"name": "article", "kind": "reference", "target": "blog.article"}
        ]}
      ],
      "records": [
        {"model": "blog.author", "pk": 1, "fields": {"name": "Obi Wan"}},
        {"model": "blog.category", "pk": 1, "fields": {"name": "World"}},
        {"model": "blog.article", "pk": 1, "fields": {"title": "a", "author": 1, "categories": [1]}},
        {"model": "blog.article", "pk": 2, "fields": {"title": "b", "author": 1, "categories": [1]}},
        {"model": "blog.comment", "pk": 1, "fields": {"article": 1}}
      ]
    }"#;

    fn tn(s: &str) -> TypeName {
        TypeName::parse(s).unwrap()
    }

    fn key(t: &str, id: i64) -> EntityKey {
        EntityKey::new(tn(t), id)
    }

    fn run(store: &Store, configs: &TypeConfigRegistry, filter: &ObjectFilter, options: TraversalOptions, roots: &[EntityKey]) -> TraversalState {
        let roots: Vec<Arc<Entity>> = roots.iter().filter_map(|k| store.get(k)).collect();
        GraphBuilder::new(store, store, configs, filter, options).traverse(roots)
    }

    fn emitted(state: &TraversalState) -> Vec<String> {
        state.to_emit().iter().map(|e| e.key().unwrap().to_string()).collect()
    }

    #[test]
    fn article_pulls_in_its_dependencies() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let filter = ObjectFilter::allow_all(&tn("blog.article"));
        let state = run(&store, &configs, &filter, TraversalOptions::default(), &[key("blog.article", 1)]);
        assert_eq!(
            emitted(&state),
            vec!["blog.article.1", "blog.comment.1", "blog.category.1", "blog.author.1", "blog.article.2"]
        );
        let deps = state.emitted_dependencies();
        assert_eq!(
            deps[&key("blog.article", 1)],
            [key("blog.author", 1), key("blog.category", 1)].into_iter().collect()
        );
        assert!(deps[&key("blog.author", 1)].is_empty());
        assert_eq!(deps[&key("blog.comment", 1)], [key("blog.article", 1)].into_iter().collect());
    }

    #[test]
    fn zero_depth_keeps_forward_references_only() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let filter = ObjectFilter::allow_all(&tn("blog.article"));
        let options = TraversalOptions { max_depth: Some(0), limit: None };
        let state = run(&store, &configs, &filter, options, &[key("blog.article", 1)]);
        assert_eq!(emitted(&state), vec!["blog.article.1", "blog.author.1"]);
    }

    #[test]
    fn reverse_edges_expand_without_ordering() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let filter = ObjectFilter::allow_all(&tn("blog.author"));
        let options = TraversalOptions { max_depth: Some(1), limit: None };
        let state = run(&store, &configs, &filter, options, &[key("blog.author", 1)]);
        assert!(state.depends_on()[&key("blog.author", 1)].is_empty());
        let rel = &state.relations()[&key("blog.author", 1)];
        assert_eq!(rel["article_set"].len(), 2);
        assert!(state.is_emitted(&key("blog.article", 2)));
        // articles sit at depth 1, so their comments are not reached
        assert!(!state.is_visited(&key("blog.comment", 1)));
    }

    #[test]
    fn shared_targets_are_emitted_once() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let filter = ObjectFilter::allow_all(&tn("blog.article"));
        let options = TraversalOptions { max_depth: Some(0), limit: None };
        let state = run(
            &store,
            &configs,
            &filter,
            options,
            &[key("blog.article", 1), key("blog.article", 2), key("blog.article", 1)],
        );
        assert_eq!(emitted(&state), vec!["blog.article.1", "blog.article.2", "blog.author.1"]);
        let sources: Vec<String> = state
            .edges()
            .iter()
            .filter(|e| e.target == key("blog.author", 1))
            .map(|e| e.source.to_string())
            .collect();
        assert_eq!(sources, vec!["blog.article.1", "blog.article.2"]);
    }

    #[test]
    fn filtered_entities_are_visited_but_not_emitted() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let exclude = vec!["blog.author".to_string()];
        let filter = ObjectFilter::new(&tn("blog.article"), &exclude, &[], &store).unwrap();
        let options = TraversalOptions { max_depth: Some(0), limit: None };
        let state = run(&store, &configs, &filter, options, &[key("blog.article", 1)]);
        assert!(state.is_visited(&key("blog.author", 1)));
        assert!(!state.is_emitted(&key("blog.author", 1)));
        assert!(state.depends_on()[&key("blog.article", 1)].contains(&key("blog.author", 1)));
        assert!(state.emitted_dependencies()[&key("blog.article", 1)].is_empty());
    }

    #[test]
    fn proxy_roots_collapse_onto_their_entity() {
        let store = Store::from_json(STORE).unwrap();
        let configs = TypeConfigRegistry::new();
        let filter = ObjectFilter::allow_all(&tn("blog.writer"));
        let options = TraversalOptions { max_depth: Some(0), limit: None };
        let alias = Arc::new(Entity::new(tn("blog.writer"), 1));
        let real = store.get(&key("blog.author", 1)).unwrap();
        let state = GraphBuilder::new(&store, &store, &configs, &filter, options).traverse(vec![alias, real]);
        assert_eq!(emitted(&state), vec!["blog.author.1"]);
    }

    fn comments_on(entity: &Entity, source: &dyn EntitySource) -> Vec<Arc<Entity>> {
        entity
            .key()
            .map(|k| source.referencing(&TypeName::parse("blog.comment").unwrap(), "article", &k))
            .unwrap_or_default()
    }

    #[test]
    fn additional_relations_follow_their_dependency_flag() {
        let store = Store::from_json(STORE).unwrap();
        let mut configs = TypeConfigRegistry::new();
        configs.insert(
            tn("blog.article"),
            TypeConfig {
                additional: vec![AdditionalRelation::new("comments", Dependency::RequiredBy, comments_on)],
                ..Default::default()
            },
        );
        let filter = ObjectFilter::allow_all(&tn("blog.article"));
        let options = TraversalOptions { max_depth: Some(0), limit: None };
        let state = run(&store, &configs, &filter, options, &[key("blog.article", 1)]);
        assert!(state.is_emitted(&key("blog.comment", 1)));
        assert!(state.depends_on()[&key("blog.comment", 1)].contains(&key("blog.article", 1)));
        assert_eq!(state.relations()[&key("blog.article", 1)]["comments"].len(), 1);
    }
}
