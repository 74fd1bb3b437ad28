//! Build-scoped state threaded explicitly through one weave pass.
//!
//! Nothing here is ambient: a fresh context per build keeps independent
//! builds from cross-contaminating (handler templates, base-chain tracking).

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use syncweave_ir::{ModuleImage, TypeId, TypeSig};

use crate::model::AccessorPair;

/// Registries with build lifetime, created at the start of each pass.
#[derive(Debug, Default)]
pub struct WeaveContext {
    /// Memoized handler-construct template per data type, shared across all
    /// processed types so fields of the same type reuse one generated class.
    pub handler_templates: HashMap<TypeSig, TypeId>,
    /// Dispatch methods that already received their base-chaining call.
    pub base_chained: HashSet<TypeId>,
    /// Types already woven this build (reprocessing guard).
    pub processed_types: HashSet<TypeId>,
    /// Replicated-field count per processed type, for ordinal continuation.
    replicated_counts: HashMap<TypeId, u32>,
    /// ProcessedSync registry: field identity to its accessor pair (Variable)
    /// or `None` (object kinds, which need no call-site rewriting).
    pub processed_fields: HashMap<(TypeId, String), Option<AccessorPair>>,
}

impl WeaveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// First ordinal available to `tid`: the count accumulated over its
    /// ancestors, base classes first.
    pub fn start_ordinal(&self, image: &ModuleImage, tid: TypeId) -> Result<u32> {
        let mut total = 0;
        for ancestor in image.base_chain(tid)?.into_iter().skip(1) {
            total += self.replicated_counts.get(&ancestor).copied().unwrap_or(0);
        }
        Ok(total)
    }

    pub fn record_count(&mut self, tid: TypeId, count: u32) {
        self.replicated_counts.insert(tid, count);
    }
}
