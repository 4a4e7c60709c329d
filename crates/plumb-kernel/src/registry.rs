//! Pipe registry: the name → pipe table.
//!
//! The registry lock guards only the table. Callers collect the pipes they
//! need, release it, then take pipe locks one at a time in name order.
//! Lock order is registry then pipe, never the reverse.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use plumb_types::{PipeStatus, PlumbError, PlumbResult};

use crate::namespace;
use crate::pipe::{Pipe, PipeSettings};
use crate::sink::{LogSink, TracingLogSink};

struct RegistryInner {
    pipes: Mutex<BTreeMap<String, Arc<Pipe>>>,
    settings: PipeSettings,
    log_sink: Arc<dyn LogSink>,
}

/// Table of live pipes, keyed by fully qualified name.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("pipes", &self.names())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Registry {
    /// Empty registry with default settings, logging through `tracing`.
    pub fn new() -> Self {
        Self::with_settings(PipeSettings::default(), Arc::new(TracingLogSink))
    }

    pub fn with_settings(settings: PipeSettings, log_sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                pipes: Mutex::new(BTreeMap::new()),
                settings,
                log_sink,
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Pipe>>> {
        self.inner.pipes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> PipeSettings {
        self.inner.settings
    }

    /// The named pipe, created on first reference.
    pub fn get_or_create(&self, name: &str) -> Arc<Pipe> {
        let mut table = self.table();
        if let Some(pipe) = table.get(name) {
            return Arc::clone(pipe);
        }
        let pipe = Arc::new(Pipe::new(
            name,
            self.inner.settings,
            Arc::clone(&self.inner.log_sink),
        ));
        table.insert(name.to_string(), Arc::clone(&pipe));
        tracing::debug!(pipe = name, "pipe created");
        pipe
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipe>> {
        self.table().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table().contains_key(name)
    }

    /// Delete one pipe, detaching every handle and killing its vias.
    pub fn delete(&self, name: &str) -> PlumbResult<()> {
        let pipe = self
            .table()
            .remove(name)
            .ok_or_else(|| PlumbError::NotFound(name.to_string()))?;
        pipe.close();
        tracing::info!(pipe = name, "pipe deleted");
        Ok(())
    }

    /// Delete every pipe. Always succeeds.
    pub fn delete_all(&self) {
        let pipes = std::mem::take(&mut *self.table());
        let n = pipes.len();
        for pipe in pipes.into_values() {
            pipe.close();
        }
        tracing::info!(count = n, "all pipes deleted");
    }

    /// Delete every pipe in `ns`, returning how many were removed.
    pub fn delete_namespace(&self, ns: &str) -> usize {
        let removed: Vec<Arc<Pipe>> = {
            let mut table = self.table();
            let names: Vec<String> = table
                .keys()
                .filter(|name| namespace::in_namespace(ns, name))
                .cloned()
                .collect();
            names.iter().filter_map(|name| table.remove(name)).collect()
        };
        for pipe in &removed {
            pipe.close();
        }
        tracing::info!(namespace = ns, count = removed.len(), "namespace pipes deleted");
        removed.len()
    }

    /// Delete `name` only if nothing is attached to it.
    ///
    /// Returns true if the pipe was deleted.
    pub fn delete_if_unattached(&self, name: &str) -> bool {
        let deleted = {
            let mut table = self.table();
            let closed = table.get(name).is_some_and(|pipe| pipe.close_if_unattached());
            if closed {
                table.remove(name);
            }
            closed
        };
        if deleted {
            tracing::info!(pipe = name, "unattached pipe deleted");
        }
        deleted
    }

    /// Every pipe name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.table().keys().cloned().collect()
    }

    /// Every pipe, in name order.
    pub fn pipes(&self) -> Vec<Arc<Pipe>> {
        self.table().values().cloned().collect()
    }

    /// Status snapshots in name order, optionally limited to one namespace.
    pub fn statuses(&self, ns: Option<&str>) -> Vec<PipeStatus> {
        let pipes: Vec<Arc<Pipe>> = {
            let table = self.table();
            table
                .iter()
                .filter(|(name, _)| ns.is_none_or(|ns| namespace::in_namespace(ns, name)))
                .map(|(_, pipe)| Arc::clone(pipe))
                .collect()
        };
        pipes.iter().map(|pipe| pipe.status()).collect()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}
