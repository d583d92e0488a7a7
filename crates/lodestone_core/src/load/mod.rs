//! Freshness-gated incremental loading.
//!
//! # Responsibility
//! - Group loaders with the sources they depend on.
//! - Reload a group only when one of its sources changed.
//!
//! # Invariants
//! - Groups run sequentially in registration order.
//! - Freshness is written only after every loader of a group succeeded.
//! - A failing group never affects the bookkeeping of other groups.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod loader;
mod orchestrator;
mod source;

pub use loader::Loader;
pub use orchestrator::{GroupOutcome, GroupReport, LoadOrchestrator, RunReport};
pub use source::{LocalFileSource, Source};

/// Error type returned by sources and loaders.
pub type BoxError = Box<dyn Error + Send + Sync>;

pub type LoadResult<T> = Result<T, LoadError>;

/// Failure of one load group.
#[derive(Debug)]
pub enum LoadError {
    Freshness {
        group: usize,
        source_identifier: String,
        source: BoxError,
    },
    Loader {
        group: usize,
        loader: String,
        source: BoxError,
    },
    Store {
        group: usize,
        source: StoreError,
    },
}

impl LoadError {
    pub fn group(&self) -> usize {
        match self {
            Self::Freshness { group, .. } | Self::Loader { group, .. } | Self::Store { group, .. } => {
                *group
            }
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Freshness {
                group,
                source_identifier,
                source,
            } => write!(
                f,
                "group {group}: cannot determine freshness of `{source_identifier}`: {source}"
            ),
            Self::Loader {
                group,
                loader,
                source,
            } => write!(f, "group {group}: loader `{loader}` failed: {source}"),
            Self::Store { group, source } => write!(f, "group {group}: {source}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Freshness { source, .. } | Self::Loader { source, .. } => Some(source.as_ref()),
            Self::Store { source, .. } => Some(source),
        }
    }
}
