//! object-dump: dump objects together with everything they depend on
//!
//! Starting from a set of root objects, the crate walks references, reverse
//! references, many-valued links, polymorphic references and configured extra
//! relations, then orders the collected objects so that every object comes
//! after the objects it depends on.
//!
//! # Features
//! - Breadth-first traversal bounded by depth (reverse and many-valued relations) and per-relation limits
//! - Include/exclude filtering by group or type
//! - Per-type relation toggles, extra lookup relations and field include/exclude lists from TOML
//! - Layered topological sort with cycle reporting
//! - JSON (fixture-shaped) and text output, DOT diagrams of the relation map
//!
//! # Quickstart (Library)
//! ```no_run
//! use object_dump::dump::{DumpRequest, ObjectDump};
//! use object_dump::model::TypeName;
//! use object_dump::registry::TypeConfigRegistry;
//! use object_dump::store::Store;
//!
//! let store = Store::load(std::path::Path::new("store.json")).expect("load store");
//! let configs = TypeConfigRegistry::new();
//! let request = DumpRequest::new(TypeName::parse("simpleapp.article").expect("type name"));
//! let result = ObjectDump::new(&store, &configs).run(&request).expect("dump");
//! for entity in &result.sorted {
//!     println!("{}", entity.type_name);
//! }
//! ```
//!
//! # Quickstart (CLI)
//! ```text
//! object-dump dump simpleapp.article 1 --store store.json --indent 2
//! object-dump dump simpleapp.author --store store.json --depth 1 --dot graph.dot
//! ```
pub mod app;
pub mod cli;
pub mod dump;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod model;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod utils;
pub mod visualization;
