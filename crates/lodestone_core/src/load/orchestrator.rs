//! Load group pipeline.
//!
//! # Responsibility
//! - Decide per group whether a reload is required.
//! - Run the group's loaders and commit freshness on success.
//!
//! # Invariants
//! - A group without dependent sources is always stale.
//! - The token observed during the check is the token written back.

use super::loader::Loader;
use super::source::Source;
use super::LoadError;
use crate::store::{FreshnessRecord, Store};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

struct LoadGroup {
    sources: Vec<Arc<dyn Source>>,
    loaders: Vec<Box<dyn Loader>>,
}

/// Result of one group in one run.
#[derive(Debug)]
pub enum GroupOutcome {
    UpToDate,
    Loaded,
    Failed(LoadError),
}

#[derive(Debug)]
pub struct GroupReport {
    pub group: usize,
    pub loaders: Vec<String>,
    pub outcome: GroupOutcome,
}

/// Per-group outcomes of one [`LoadOrchestrator::run_all`] call.
#[derive(Debug, Default)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn loaded(&self) -> usize {
        self.groups
            .iter()
            .filter(|report| matches!(report.outcome, GroupOutcome::Loaded))
            .count()
    }

    pub fn up_to_date(&self) -> usize {
        self.groups
            .iter()
            .filter(|report| matches!(report.outcome, GroupOutcome::UpToDate))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadError> {
        self.groups.iter().filter_map(|report| match &report.outcome {
            GroupOutcome::Failed(err) => Some(err),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Treats any failed group as fatal, returning the first failure.
    pub fn into_result(self) -> Result<Self, LoadError> {
        if self.is_success() {
            return Ok(self);
        }
        let mut groups = self.groups;
        let index = groups
            .iter()
            .position(|report| matches!(report.outcome, GroupOutcome::Failed(_)))
            .unwrap_or_default();
        match groups.swap_remove(index).outcome {
            GroupOutcome::Failed(err) => Err(err),
            _ => Ok(Self { groups }),
        }
    }
}

/// Ordered pipeline of load groups.
#[derive(Default)]
pub struct LoadOrchestrator {
    groups: Vec<LoadGroup>,
}

impl LoadOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loaders` as one group and returns its index.
    ///
    /// The group depends on the union of its loaders' sources, de-duplicated
    /// by identifier in first-seen order.
    pub fn register(&mut self, loaders: Vec<Box<dyn Loader>>) -> usize {
        let mut sources: Vec<Arc<dyn Source>> = Vec::new();
        for source in loaders.iter().flat_map(|loader| loader.dependent_sources()) {
            let identifier = source.identifier();
            if sources.iter().all(|known| known.identifier() != identifier) {
                sources.push(source);
            }
        }

        let index = self.groups.len();
        debug!(
            "event=load_register module=load status=ok group={index} loaders={} sources={}",
            loaders.len(),
            sources.len()
        );
        self.groups.push(LoadGroup { sources, loaders });
        index
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Evaluates every group once, in registration order.
    ///
    /// Group failures are reported, not propagated; see
    /// [`RunReport::into_result`].
    pub fn run_all(&mut self, store: &mut Store) -> RunReport {
        let started_at = Instant::now();
        info!(
            "event=load_run module=load status=start groups={}",
            self.groups.len()
        );

        let mut report = RunReport::default();
        for (index, group) in self.groups.iter_mut().enumerate() {
            let loaders = group
                .loaders
                .iter()
                .map(|loader| loader.name().to_string())
                .collect();
            let outcome = match run_group(index, group, store) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!("event=load_group module=load status=error group={index} error={err}");
                    GroupOutcome::Failed(err)
                }
            };
            report.groups.push(GroupReport {
                group: index,
                loaders,
                outcome,
            });
        }

        info!(
            "event=load_run module=load status=ok groups={} loaded={} up_to_date={} failed={} duration_ms={}",
            report.groups.len(),
            report.loaded(),
            report.up_to_date(),
            report.failures().count(),
            started_at.elapsed().as_millis()
        );
        report
    }
}

fn run_group(index: usize, group: &mut LoadGroup, store: &mut Store) -> Result<GroupOutcome, LoadError> {
    let mut observed = Vec::with_capacity(group.sources.len());
    let mut stale = group.sources.is_empty();
    if stale {
        warn!("event=load_group module=load status=forced group={index} reason=no_dependent_sources");
    }

    for source in &group.sources {
        let identifier = source.identifier();
        let recorded = store
            .freshness(&identifier)
            .map_err(|err| LoadError::Store { group: index, source: err })?;
        let current = source
            .freshness_token()
            .map_err(|err| LoadError::Freshness {
                group: index,
                source_identifier: identifier.clone(),
                source: err,
            })?;

        debug!(
            "event=freshness_check module=load group={index} source={identifier} last_success={} changed={}",
            recorded.last_success.as_deref().unwrap_or("never"),
            !recorded.is_current(&current)
        );
        if !recorded.is_current(&current) {
            stale = true;
        }
        observed.push((identifier, current));
    }

    if !stale {
        info!("event=load_group module=load status=up_to_date group={index}");
        return Ok(GroupOutcome::UpToDate);
    }

    for loader in group.loaders.iter_mut() {
        let started_at = Instant::now();
        let name = loader.name().to_string();
        loader.load(store).map_err(|err| LoadError::Loader {
            group: index,
            loader: name.clone(),
            source: err,
        })?;
        info!(
            "event=loader_run module=load status=ok group={index} loader={name} duration_ms={}",
            started_at.elapsed().as_millis()
        );
    }

    for (identifier, token) in observed {
        store
            .persist_freshness(&FreshnessRecord::loaded(identifier, token))
            .map_err(|err| LoadError::Store { group: index, source: err })?;
    }

    info!("event=load_group module=load status=loaded group={index}");
    Ok(GroupOutcome::Loaded)
}
