//! Shared run state: the variable store steps write into and templates read
//! from. Cloning the store clones the handle, not the map.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::template::PathExpr;

#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    inner: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(initial: BTreeMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.lock().insert(name.into(), value);
    }

    /// Append to a list variable. Creates a one-element list if the variable
    /// is absent; wraps an existing non-list value into a list first. The
    /// whole read-modify-write happens under one lock, so concurrent appends
    /// interleave without losing elements.
    pub fn append(&self, name: &str, value: Value) {
        let mut map = self.lock();
        match map.get_mut(name) {
            None => {
                map.insert(name.to_string(), Value::Array(vec![value]));
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let prior = existing.take();
                *existing = Value::Array(vec![prior, value]);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    /// Point-in-time copy of every variable, for checkpointing.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock().clone()
    }

    /// Replace the contents wholesale, used when resuming from a checkpoint.
    pub fn restore(&self, variables: BTreeMap<String, Value>) {
        *self.lock() = variables;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Read-only view with no loop bindings.
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            store: self,
            locals: BTreeMap::new(),
        }
    }

    /// Read-only view with iteration-local bindings layered on top.
    pub fn scope_with(&self, locals: BTreeMap<String, Value>) -> Scope<'_> {
        Scope {
            store: self,
            locals,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lookup view for template rendering: loop-local bindings shadow stored
/// variables and are never written back to the shared map.
#[derive(Debug)]
pub struct Scope<'a> {
    store: &'a VariableStore,
    locals: BTreeMap<String, Value>,
}

impl Scope<'_> {
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(local) = self.locals.get(name) {
            return Some(local.clone());
        }
        self.store.get(name)
    }

    pub fn lookup_path(&self, path: &PathExpr) -> Option<Value> {
        let root = path.root();
        // `env` is reserved: `env.NAME` reads the process environment and
        // wins over stored variables or loop bindings of the same name.
        if root == "env" {
            return path
                .env_var_name()
                .and_then(|name| std::env::var(name).ok())
                .map(Value::String);
        }
        if let Some(local) = self.locals.get(root) {
            return path.resolve_in(local);
        }
        let stored = self.store.get(root)?;
        path.resolve_in(&stored)
    }
}
