//! Leaf records produced by resolution

use crate::merge::merge_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One override contributed to an aspect at a given depth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AspectLayer {
    /// Depth of the contributing node (0 = top-level source).
    pub level: usize,
    /// The override mapping as written.
    pub value: Value,
}

/// Per-aspect override lists accumulated along one root-to-node path.
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    aspects: Vec<(String, Vec<AspectLayer>)>,
}

impl Node {
    pub(crate) fn push(&mut self, aspect: &str, layer: AspectLayer) {
        match self.aspects.iter_mut().find(|(name, _)| name == aspect) {
            Some((_, layers)) => layers.push(layer),
            None => self.aspects.push((aspect.to_string(), vec![layer])),
        }
    }
}

/// A fully resolved, terminal configuration node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaf {
    /// Each aspect deep-merged from root to leaf.
    pub aspects: Map<String, Value>,
    /// The un-merged layers per aspect, for introspection.
    pub layers: BTreeMap<String, Vec<AspectLayer>>,
}

impl Leaf {
    pub(crate) fn from_node(node: &Node) -> Self {
        let mut aspects = Map::new();
        let mut layers = BTreeMap::new();
        for (name, contributed) in &node.aspects {
            aspects.insert(
                name.clone(),
                merge_all(contributed.iter().map(|layer| &layer.value)),
            );
            layers.insert(name.clone(), contributed.clone());
        }
        Self { aspects, layers }
    }

    /// Build a leaf directly from merged aspects (no layer history).
    pub fn from_aspects(aspects: Map<String, Value>) -> Self {
        let layers = aspects
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    vec![AspectLayer {
                        level: 0,
                        value: value.clone(),
                    }],
                )
            })
            .collect();
        Self { aspects, layers }
    }

    /// Merged value of an aspect.
    pub fn aspect(&self, name: &str) -> Option<&Value> {
        self.aspects.get(name)
    }

    /// Merged value of an aspect, if it is a mapping.
    pub fn aspect_map(&self, name: &str) -> Option<&Map<String, Value>> {
        self.aspects.get(name).and_then(Value::as_object)
    }

    /// Mutable access to a mapping aspect.
    pub fn aspect_map_mut(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        self.aspects.get_mut(name).and_then(Value::as_object_mut)
    }

    /// Raw layers contributed to an aspect.
    pub fn layers(&self, name: &str) -> &[AspectLayer] {
        self.layers.get(name).map_or(&[], Vec::as_slice)
    }

    /// The merged aspects as a single mapping value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.aspects.clone())
    }
}
