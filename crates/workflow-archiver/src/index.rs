//! Secondary-index suspension around bulk archiving.
//!
//! Inserting many unit batches into an indexed archive table is slower than
//! inserting into a bare one and rebuilding once. [`IndexSuspender::around`]
//! drops the configured indexes, runs the bulk action, and recreates them on
//! every exit path of the action, a panic included.
use crate::config::IndexSpec;
use crate::store::ArchiveStore;
use futures::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

pub struct IndexSuspender<'a, S: ArchiveStore + ?Sized> {
    store: &'a S,
    table: &'a str,
    indexes: &'a [IndexSpec],
    enabled: bool,
}

impl<'a, S: ArchiveStore + ?Sized> IndexSuspender<'a, S> {
    pub fn new(store: &'a S, table: &'a str, indexes: &'a [IndexSpec], enabled: bool) -> Self {
        Self {
            store,
            table,
            indexes,
            enabled,
        }
    }

    /// Run `action` with the indexes dropped.
    ///
    /// Drop and rebuild failures are logged and never change the action's result.
    pub async fn around<F, T>(&self, action: F) -> T
    where
        F: Future<Output = T>,
    {
        if !self.enabled {
            return action.await;
        }

        self.drop_indexes().await;
        let result = AssertUnwindSafe(action).catch_unwind().await;
        self.create_indexes().await;

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    async fn drop_indexes(&self) {
        for index in self.indexes {
            let sql = format!("DROP INDEX {}", index.name);
            tracing::info!("Dropping index {}", index.name);
            if let Err(e) = self.store.execute_raw(&sql).await {
                tracing::warn!("Unable to drop index {}: {}", index.name, e);
            }
        }
    }

    async fn create_indexes(&self) {
        for index in self.indexes {
            let sql = format!("CREATE INDEX {} ON {} ({})", index.name, self.table, index.column);
            tracing::info!("Recreating index {} on {}({})", index.name, self.table, index.column);
            if let Err(e) = self.store.execute_raw(&sql).await {
                tracing::warn!("Unable to recreate index {}: {}", index.name, e);
            }
        }
    }
}
