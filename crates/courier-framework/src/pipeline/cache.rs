//! Per-type cache of resolved pipelines.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Cache key: message type and its output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    message: TypeId,
    output: TypeId,
}

impl PipelineKey {
    pub(crate) fn of<M: 'static, O: 'static>() -> Self {
        Self {
            message: TypeId::of::<M>(),
            output: TypeId::of::<O>(),
        }
    }
}

/// Thread-safe get-or-create store. Each key is built at most once.
#[derive(Default)]
pub(crate) struct PipelineCache {
    entries: RwLock<HashMap<PipelineKey, Arc<dyn Any + Send + Sync>>>,
}

impl PipelineCache {
    pub(crate) fn get_or_build<P, F>(&self, key: PipelineKey, build: F) -> Arc<P>
    where
        P: Any + Send + Sync,
        F: FnOnce() -> P,
    {
        if let Some(found) = self.lookup(&key) {
            return found;
        }

        let mut entries = self.entries.write();
        // Another caller may have built it while we waited for the lock.
        if let Some(found) = entries
            .get(&key)
            .and_then(|entry| Arc::clone(entry).downcast::<P>().ok())
        {
            return found;
        }

        let built = Arc::new(build());
        entries.insert(key, Arc::clone(&built) as Arc<dyn Any + Send + Sync>);
        built
    }

    fn lookup<P: Any + Send + Sync>(&self, key: &PipelineKey) -> Option<Arc<P>> {
        self.entries
            .read()
            .get(key)
            .and_then(|entry| Arc::clone(entry).downcast::<P>().ok())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
