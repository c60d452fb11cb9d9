use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::{EntityKey, TypeName};

/// Failures while expanding one relation of one entity.
///
/// These never abort a run: the expander logs them and treats the relation
/// as having no related entities.
#[derive(Debug, Error)]
pub enum RelationError {
    #[error("relation '{relation}' is not defined on {type_name}")]
    Unresolvable { type_name: TypeName, relation: String },
    #[error("{key} is referenced but does not exist")]
    MissingTarget { key: EntityKey },
}

/// The dependency relation could not be ordered.
///
/// `residual` is what was left after every orderable entity was removed; each
/// entry still waits on at least one other entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicDependencyError {
    pub residual: BTreeMap<EntityKey, BTreeSet<EntityKey>>,
}

impl CyclicDependencyError {
    #[must_use]
    pub fn keys(&self) -> BTreeSet<&EntityKey> {
        self.residual.keys().collect()
    }
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cyclic dependencies exist among these objects:")?;
        for (key, deps) in &self.residual {
            let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
            write!(f, "\n  {key} -> [{}]", deps.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CyclicDependencyError {}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Unknown type specified: {0}")]
    UnknownType(String),

    #[error("Unknown group specified: {0}")]
    UnknownGroup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{type_name} object has no identifier")]
    MissingIdentifier { type_name: TypeName },

    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),

    #[error("Unable to serialize objects: {0}")]
    Encoding(String),

    #[error("Failed to load store {path}: {message}")]
    Store { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
