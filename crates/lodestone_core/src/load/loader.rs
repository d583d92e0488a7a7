//! Loader collaborator contract.

use super::source::Source;
use super::BoxError;
use crate::store::Store;
use std::sync::Arc;

/// Converts external data into entities and writes them to the store.
///
/// Loaders of a failed group are re-run on the next pass, so `load` must be
/// safe to repeat after a partial run.
pub trait Loader {
    /// Name used in logs and reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Sources whose change requires this loader to run again.
    fn dependent_sources(&self) -> Vec<Arc<dyn Source>>;

    fn load(&mut self, store: &mut Store) -> Result<(), BoxError>;
}
