// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Named extension points. Any number of callbacks can listen on a hook; one
// failing or panicking callback never stops the others.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::plugin::PluginResult;

/// Callback attached to a hook. Receives the hook's positional arguments.
pub type HookFn = Arc<dyn Fn(&[Value]) -> PluginResult<Value> + Send + Sync>;

/// Handle returned by [`HookRegistry::register_hook`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
pub struct HookRegistry {
    next_id: AtomicU64,
    hooks: RwLock<HashMap<String, Vec<(HookId, HookFn)>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook<F>(&self, name: &str, callback: F) -> HookId
    where
        F: Fn(&[Value]) -> PluginResult<Value> + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        debug!(hook = name, "hook callback registered");
        id
    }

    /// Remove a callback. Returns `false` if it was not registered on `name`.
    pub fn unregister_hook(&self, name: &str, id: HookId) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(callbacks) = hooks.get_mut(name) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            hooks.remove(name);
        }
        removed
    }

    /// Run every callback on `name` in registration order and collect the
    /// results of those that succeeded.
    pub fn execute_hook(&self, name: &str, args: &[Value]) -> Vec<Value> {
        // Snapshot so callbacks may register or unregister hooks themselves.
        let callbacks: Vec<HookFn> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|cbs| cbs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        let mut results = Vec::with_capacity(callbacks.len());
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(args))) {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => warn!(hook = name, error = %err, "hook callback failed"),
                Err(_) => warn!(hook = name, "hook callback panicked"),
            }
        }
        results
    }

    pub fn callback_count(&self, name: &str) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = hooks.keys().collect();
        names.sort();
        f.debug_struct("HookRegistry").field("hooks", &names).finish()
    }
}
