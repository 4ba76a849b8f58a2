//! Handler trait and registry
//!
//! A handler turns one resolved leaf into zero or more raw task
//! descriptions for an execution engine.

use crate::context::MaterializeContext;
use crate::error::{Error, Result};
use crate::types::{EngineKind, keys};
use frkl::Leaf;
use serde::Serialize;
use serde_json::{Map, Value};

/// What a handler gets to work with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerInput {
    /// The leaf's merged meta aspect.
    pub meta: Map<String, Value>,
    /// Global defaults, then handler defaults, then the leaf's vars.
    pub vars: Map<String, Value>,
    /// Position of the leaf in resolution order.
    pub index: usize,
}

/// Raw output of a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    /// Engine the items are written for.
    pub engine: EngineKind,
    /// Raw task descriptions, each merged onto the leaf's meta.
    pub items: Vec<Value>,
}

impl Expansion {
    /// Items for the default engine.
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            engine: EngineKind::default(),
            items,
        }
    }

    /// A single item for the default engine.
    pub fn single(item: Value) -> Self {
        Self::new(vec![item])
    }

    /// Nothing to do for this leaf.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }
}

/// Core trait for task handlers
///
/// A handler owns a task type name and optionally claims other leaves
/// through [`Handler::can_handle`].
pub trait Handler: Send + Sync {
    /// Fixed task type name this handler owns.
    fn name(&self) -> &str;

    /// Whether this handler accepts a leaf whose name it doesn't own.
    fn can_handle(&self, _meta: &Map<String, Value>) -> bool {
        false
    }

    /// Default vars, overridden by the leaf's vars.
    fn defaults(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Expand one leaf into raw task descriptions.
    fn expand(&self, input: &HandlerInput, ctx: &mut MaterializeContext) -> Result<Expansion>;
}

/// Handlers in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Earlier handlers win predicate ties.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.register(Box::new(handler));
        self
    }

    /// Handler owning a name.
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(AsRef::as_ref)
    }

    /// Registered names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Find the handler for a meta aspect.
    ///
    /// A cached binding wins, then the handler owning the task name, then the
    /// first handler whose predicate accepts the meta.
    pub fn bind(&self, meta: &Map<String, Value>) -> Result<&dyn Handler> {
        if let Some(handler) = meta
            .get(keys::HANDLER)
            .and_then(Value::as_str)
            .and_then(|name| self.get(name))
        {
            return Ok(handler);
        }

        let name = match meta.get(keys::NAME) {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(Error::config(
                    "task name must be a string",
                    keys::NAME,
                    other,
                ));
            }
            None => {
                return Err(Error::config(
                    "task has no name",
                    keys::META,
                    Value::Object(meta.clone()),
                ));
            }
        };

        if let Some(handler) = self.get(name) {
            return Ok(handler);
        }

        self.handlers
            .iter()
            .find(|h| h.can_handle(meta))
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                Error::config(
                    format!("Can't find a handler for task '{name}'"),
                    keys::NAME,
                    name,
                )
            })
    }

    /// Bind a leaf and cache the handler name on its meta aspect.
    ///
    /// Leaves without a meta aspect are left alone.
    pub fn bind_leaf(&self, leaf: &mut Leaf) -> Result<Option<String>> {
        let Some(meta) = leaf.aspect_map_mut(keys::META) else {
            return Ok(None);
        };
        let name = self.bind(meta)?.name().to_string();
        meta.insert(keys::HANDLER.to_string(), Value::String(name.clone()));
        Ok(Some(name))
    }

    /// Bind every leaf; fails on the first unbindable one.
    pub fn bind_all(&self, leaves: &mut [Leaf]) -> Result<()> {
        for leaf in leaves {
            self.bind_leaf(leaf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    impl Handler for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn expand(&self, _input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
            Ok(Expansion::none())
        }
    }

    struct CatchAll;

    impl Handler for CatchAll {
        fn name(&self) -> &str {
            "task"
        }

        fn can_handle(&self, _meta: &Map<String, Value>) -> bool {
            true
        }

        fn expand(&self, _input: &HandlerInput, _ctx: &mut MaterializeContext) -> Result<Expansion> {
            Ok(Expansion::none())
        }
    }

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_bind_by_name() {
        let registry = HandlerRegistry::new().with(Named("install")).with(CatchAll);
        assert_eq!(
            registry.bind(&meta(json!({"name": "install"}))).unwrap().name(),
            "install"
        );
        assert_eq!(
            registry.bind(&meta(json!({"name": "apt"}))).unwrap().name(),
            "task"
        );
        assert_eq!(registry.names(), vec!["install", "task"]);
    }

    #[test]
    fn test_bind_cached() {
        let registry = HandlerRegistry::new().with(Named("install")).with(CatchAll);
        let bound = registry
            .bind(&meta(json!({"name": "apt", "handler": "install"})))
            .unwrap();
        assert_eq!(bound.name(), "install");
    }

    #[test]
    fn test_bind_unknown() {
        let registry = HandlerRegistry::new().with(Named("install"));
        let err = registry.bind(&meta(json!({"name": "frobnicate"}))).err().unwrap();
        assert_eq!(err.context(), Some((Some("name"), Some("frobnicate"))));

        assert!(registry.bind(&meta(json!({"priority": 1}))).is_err());
    }

    #[test]
    fn test_bind_leaf_caches_handler() {
        let registry = HandlerRegistry::new().with(Named("stow"));
        let mut aspects = Map::new();
        aspects.insert("meta".into(), json!({"name": "stow"}));
        let mut leaf = Leaf::from_aspects(aspects);

        assert_eq!(registry.bind_leaf(&mut leaf).unwrap().as_deref(), Some("stow"));
        assert_eq!(leaf.aspect("meta").unwrap()["handler"], json!("stow"));

        let mut defaults_only = Leaf::from_aspects(Map::new());
        assert_eq!(registry.bind_leaf(&mut defaults_only).unwrap(), None);
    }
}
