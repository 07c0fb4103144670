use crate::types::{ArchiveCriteria, UnitKey};
use crate::version::VersionResolver;

/// Turns discovered units into work items for the transaction runner.
pub struct CriteriaBuilder {
    resolver: VersionResolver,
}

impl CriteriaBuilder {
    pub fn new(resolver: VersionResolver) -> Self {
        Self { resolver }
    }

    /// Resolve a version for every unit.
    ///
    /// Returns the work items and the number of units skipped. A unit whose
    /// version cannot be resolved is logged and left out; the rest still build.
    pub async fn build(&self, units: Vec<UnitKey>) -> (Vec<ArchiveCriteria>, usize) {
        let mut items = Vec::with_capacity(units.len());
        let mut skipped = 0;

        for unit in units {
            match self.resolver.resolve_version(&unit.druid).await {
                Ok(version) => items.push(ArchiveCriteria::new(unit, version)),
                Err(e) => {
                    tracing::error!(
                        druid = %unit.druid,
                        datastream = %unit.datastream,
                        repository = ?unit.repository,
                        "Skipping archive of {}: {}",
                        unit,
                        e
                    );
                    skipped += 1;
                }
            }
        }

        (items, skipped)
    }
}
