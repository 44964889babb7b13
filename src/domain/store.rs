use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the event raised on every effective `set`, before the scoped ones.
pub const CHANGE: &str = "change";

/// A store listener. Receives the store that raised the event and the event payload.
pub type Listener = Arc<dyn Fn(&Store, &Value) + Send + Sync>;

/// Nested key-value container addressed by dot-separated paths.
///
/// `set` only raises events when the leaf actually changes. It then raises
/// `change` followed by one `change:<prefix>` event per path prefix, shortest
/// first, each carrying the current value at that prefix. Listeners run
/// synchronously in registration order and may call back into the store; no lock
/// is held while they run.
#[derive(Default)]
pub struct Store {
    attributes: Mutex<Value>,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_attributes(Map::new())
    }

    pub fn with_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            attributes: Mutex::new(Value::Object(attributes)),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value at `path`, or `None` as soon as a node along it is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = self.attributes.lock();
        let mut node = &*root;
        for key in path.split('.') {
            node = node.as_object()?.get(key)?;
        }
        Some(node.clone())
    }

    pub fn set(&self, path: &str, value: Value) {
        let keys: Vec<&str> = path.split('.').collect();
        let Some((leaf, parents)) = keys.split_last() else {
            return;
        };

        let changed = {
            let mut root = self.attributes.lock();
            let mut node: &mut Value = &mut root;
            for key in parents {
                node = ensure_object(node)
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            let map = ensure_object(node);
            if map.get(*leaf) == Some(&value) {
                false
            } else {
                map.insert(leaf.to_string(), value);
                true
            }
        };

        if !changed {
            return;
        }

        self.emit(CHANGE, &Value::Null);
        for depth in 1..=keys.len() {
            let prefix = keys[..depth].join(".");
            let current = self.get(&prefix).unwrap_or(Value::Null);
            self.emit(&format!("{CHANGE}:{prefix}"), &current);
        }
    }

    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&Store, &Value) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn emit(&self, event: &str, payload: &Value) {
        // Snapshot so listeners can register further listeners or re-enter `set`.
        let listeners = match self.listeners.lock().get(event) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        for listener in listeners {
            listener(self, payload);
        }
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}
