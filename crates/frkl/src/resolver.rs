//! Depth-first expansion of configuration sources into leaves

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::leaf::{AspectLayer, Leaf, Node};
use crate::merge::{deep_merge, merge_maps};
use crate::source::{Abbreviations, ConfigSource};
use crate::template::{Templater, template_context};
use serde_json::{Map, Value};

/// Parameters of one resolver instance.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Key whose value lists child sources.
    pub stem_key: String,
    /// Valid aspect names.
    pub aspect_keys: Vec<String>,
    /// Aspect that receives the shorthand name.
    pub default_aspect: String,
    /// Key inside the default aspect that receives the shorthand name.
    pub default_name_key: String,
    /// Aspect that receives a shorthand value.
    pub default_value_aspect: String,
    /// Key used when a shorthand value is not a mapping.
    pub default_marker: String,
    /// Key naming extra top-level sources to include first.
    pub load_key: String,
    /// Location abbreviations.
    pub abbreviations: Abbreviations,
    /// Render fetched text before parsing.
    pub templating: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stem_key: "frecks".to_string(),
            aspect_keys: vec!["meta".to_string(), "vars".to_string()],
            default_aspect: "meta".to_string(),
            default_name_key: "name".to_string(),
            default_value_aspect: "vars".to_string(),
            default_marker: "frkl_default".to_string(),
            load_key: "load".to_string(),
            abbreviations: Abbreviations::default(),
            templating: true,
        }
    }
}

impl ResolverConfig {
    fn validate(&self) -> Result<()> {
        for aspect in [&self.default_aspect, &self.default_value_aspect] {
            if !self.aspect_keys.contains(aspect) {
                return Err(Error::Bug(format!(
                    "default aspect '{aspect}' is not one of {:?}",
                    self.aspect_keys
                )));
            }
        }
        if self.aspect_keys.contains(&self.stem_key) {
            return Err(Error::Bug(format!(
                "stem key '{}' can't be an aspect",
                self.stem_key
            )));
        }
        Ok(())
    }

    fn is_reserved(&self, key: &str) -> bool {
        key == self.stem_key || self.aspect_keys.iter().any(|a| a == key)
    }
}

/// Mutable state of one resolution pass.
#[derive(Default)]
struct Walk {
    leaves: Vec<Leaf>,
    /// Locations of the sources currently being expanded, outermost first.
    chain: Vec<String>,
    /// Aspects declared by top-level sources so far.
    carry: Map<String, Value>,
}

/// Expands an ordered list of sources into an ordered list of leaves.
pub struct Resolver<F: Fetcher> {
    config: ResolverConfig,
    fetcher: F,
    templater: Templater,
}

impl<F: Fetcher> Resolver<F> {
    /// Create a resolver.
    pub fn new(config: ResolverConfig, fetcher: F) -> Result<Self> {
        config.validate()?;
        let templater = Templater::new(config.templating);
        Ok(Self {
            config,
            fetcher,
            templater,
        })
    }

    /// Resolver parameters.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Classify user-provided strings into sources.
    pub fn sources<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<ConfigSource>> {
        raw.iter()
            .map(|s| ConfigSource::classify(s.as_ref(), &self.config.abbreviations))
            .collect()
    }

    /// Resolve sources into leaves, in depth-first pre-order.
    pub fn resolve(&self, sources: &[ConfigSource]) -> Result<Vec<Leaf>> {
        let mut walk = Walk::default();
        self.walk(&mut walk, sources, &Node::default(), 0)?;
        log::debug!("Resolved {} leaves", walk.leaves.len());
        Ok(walk.leaves)
    }

    fn walk(
        &self,
        walk: &mut Walk,
        sources: &[ConfigSource],
        parent: &Node,
        level: usize,
    ) -> Result<()> {
        for source in sources {
            self.walk_source(walk, source, parent, level)?;
        }
        Ok(())
    }

    fn walk_source(
        &self,
        walk: &mut Walk,
        source: &ConfigSource,
        parent: &Node,
        level: usize,
    ) -> Result<()> {
        let location = source.location();
        if let Some(location) = &location
            && walk.chain.contains(location)
        {
            let mut chain = walk.chain.clone();
            chain.push(location.clone());
            return Err(Error::Cycle { chain });
        }

        let mut tree = self.load(walk, source)?;

        if let Some(location) = &location {
            walk.chain.push(location.clone());
        }

        if let Value::Object(map) = &mut tree
            && let Some(load) = map.remove(&self.config.load_key)
        {
            let includes = self.includes(&load)?;
            log::debug!("Loading {} included source(s) from {source}", includes.len());
            self.walk(walk, &includes, parent, level)?;
        }

        self.expand(walk, tree, parent, level)?;

        if location.is_some() {
            walk.chain.pop();
        }
        Ok(())
    }

    /// Fetch, render and parse a source.
    fn load(&self, walk: &Walk, source: &ConfigSource) -> Result<Value> {
        let (label, text) = match source {
            ConfigSource::Tree(value) => return Ok(value.clone()),
            ConfigSource::Path(path) => (
                path.display().to_string(),
                self.fetcher.fetch_path(path)?,
            ),
            ConfigSource::Url(url) => (url.clone(), self.fetcher.fetch_url(url)?),
            ConfigSource::Inline(text) => ("inline source".to_string(), text.clone()),
        };

        let text = if self.templater.needs_render(&text) {
            let context = template_context(&walk.leaves);
            self.templater.render(&label, &text, &context)?
        } else {
            text
        };

        serde_yaml::from_str::<Value>(&text).map_err(|e| {
            Error::config(format!("can't parse {label}: {e}"), label.clone(), &text)
        })
    }

    fn includes(&self, load: &Value) -> Result<Vec<ConfigSource>> {
        let items = match load {
            Value::Null => return Ok(Vec::new()),
            Value::String(_) => std::slice::from_ref(load),
            Value::Array(items) => items.as_slice(),
            other => {
                return Err(Error::config(
                    "value of load must be a string or a list of strings",
                    self.config.load_key.clone(),
                    other,
                ));
            }
        };

        items
            .iter()
            .map(|item| match item {
                Value::String(s) => ConfigSource::classify(s, &self.config.abbreviations),
                other => Err(Error::config(
                    "load entries must be strings",
                    self.config.load_key.clone(),
                    other,
                )),
            })
            .collect()
    }

    /// Bring a parsed tree into canonical `{aspect: mapping, stem: list}` form.
    ///
    /// Returns `None` for trees that contribute nothing (empty documents).
    fn normalize(&self, tree: Value) -> Result<Option<Map<String, Value>>> {
        let config = &self.config;
        match tree {
            Value::Null => Ok(None),
            Value::String(name) => Ok(Some(self.named(name, Map::new()))),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(map) => {
                if map.keys().any(|k| config.is_reserved(k)) {
                    return Ok(Some(map));
                }
                if map.len() != 1 {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    return Err(Error::config(
                        "If not using the full config format, leaf nodes are only allowed to have one key",
                        keys.join(", "),
                        Value::Object(map),
                    ));
                }

                let Some((name, value)) = map.into_iter().next() else {
                    return Ok(None);
                };
                let value = match value {
                    Value::Object(inner) => inner,
                    Value::Null => Map::new(),
                    other => {
                        let mut inner = Map::new();
                        inner.insert(config.default_marker.clone(), other);
                        inner
                    }
                };

                if value.keys().any(|k| config.is_reserved(k)) {
                    let mut node = value;
                    let existing = node
                        .remove(&config.default_aspect)
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    let mut name_map = Map::new();
                    name_map.insert(config.default_name_key.clone(), Value::String(name));
                    node.insert(
                        config.default_aspect.clone(),
                        deep_merge(&existing, &Value::Object(name_map)),
                    );
                    Ok(Some(node))
                } else {
                    Ok(Some(self.named(name, value)))
                }
            }
            other => Err(Error::config(
                "can't use value as a configuration source",
                "",
                other,
            )),
        }
    }

    /// `{default_aspect: {name_key: name}, default_value_aspect: vars}`
    fn named(&self, name: String, vars: Map<String, Value>) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert(self.config.default_name_key.clone(), Value::String(name));

        let mut node = Map::new();
        node.insert(self.config.default_aspect.clone(), Value::Object(meta));
        if !vars.is_empty() {
            node.insert(self.config.default_value_aspect.clone(), Value::Object(vars));
        }
        node
    }

    fn expand(&self, walk: &mut Walk, tree: Value, parent: &Node, level: usize) -> Result<()> {
        let Some(mut map) = self.normalize(tree)? else {
            return Ok(());
        };
        let stem = map.remove(&self.config.stem_key);

        // Top-level aspects carry into later top-level sources, unless the
        // source is itself a single task.
        if level == 0 {
            let task_leaf = stem.is_none() && map.contains_key(&self.config.default_aspect);
            if task_leaf {
                map = merge_maps(&walk.carry, &map);
            } else {
                walk.carry = merge_maps(&walk.carry, &map);
                map = walk.carry.clone();
            }
        }

        let mut node = parent.clone();
        for (key, value) in map {
            if !self.config.aspect_keys.contains(&key) {
                return Err(Error::config(
                    format!("Key '{key}' not allowed"),
                    key,
                    value,
                ));
            }
            let value = match value {
                Value::Null => Value::Object(Map::new()),
                Value::Object(_) => value,
                other => {
                    return Err(Error::config(
                        format!("Value of aspect '{key}' must be a mapping"),
                        key,
                        other,
                    ));
                }
            };
            node.push(&key, AspectLayer { level, value });
        }

        match stem {
            None => {
                walk.leaves.push(Leaf::from_node(&node));
                Ok(())
            }
            Some(Value::Null | Value::Bool(false)) => Ok(()),
            Some(Value::Array(children)) => {
                let sources = children
                    .iter()
                    .map(|child| ConfigSource::from_value(child, &self.config.abbreviations))
                    .collect::<Result<Vec<_>>>()?;
                self.walk(walk, &sources, &node, level + 1)
            }
            Some(other) => Err(Error::config(
                format!("Value of '{}' must be a list", self.config.stem_key),
                self.config.stem_key.clone(),
                other,
            )),
        }
    }
}
